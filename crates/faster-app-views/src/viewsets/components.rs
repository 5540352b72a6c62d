//! Process-wide cache of stateless pipeline components.
//!
//! Authenticators, permissions and filter backends carry no per-request state,
//! so one instance per type is shared by every ViewSet that names it. The
//! cache only ever grows; two tasks racing to populate the same type both
//! build an equivalent instance and the first insert wins.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

static COMPONENTS: Lazy<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = Lazy::new(DashMap::new);

/// Returns the shared instance of `T`, creating it with `Default` on first use.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use faster_app_views::viewsets::components::shared;
///
/// #[derive(Default)]
/// struct Counter;
///
/// let a = shared::<Counter>();
/// let b = shared::<Counter>();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub fn shared<T>() -> Arc<T>
where
    T: Default + Send + Sync + 'static,
{
    let id = TypeId::of::<T>();
    if let Some(existing) = COMPONENTS.get(&id) {
        if let Ok(typed) = Arc::clone(existing.value()).downcast::<T>() {
            return typed;
        }
    }
    // Built outside the shard lock: a component's Default may itself call `shared`.
    let fresh: Arc<dyn Any + Send + Sync> = Arc::new(T::default());
    let stored = Arc::clone(COMPONENTS.entry(id).or_insert(fresh).value());
    match stored.downcast::<T>() {
        Ok(typed) => typed,
        // TypeId keys make a mismatch impossible; fall back to a private instance.
        Err(_) => Arc::new(T::default()),
    }
}

/// Number of cached component types.
pub fn cached_types() -> usize {
    COMPONENTS.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;

    impl Default for Tracked {
        fn default() -> Self {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Self
        }
    }

    #[derive(Default)]
    struct Other(u8);

    #[test]
    fn test_one_instance_per_type() {
        let a = shared::<Tracked>();
        let b = shared::<Tracked>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(shared::<Other>().0, 0);
        assert!(cached_types() >= 2);
    }

    #[tokio::test]
    async fn test_concurrent_population_is_idempotent() {
        #[derive(Default)]
        struct Racy;

        let handles: Vec<_> = (0..16)
            .map(|_| tokio::spawn(async { shared::<Racy>() }))
            .collect();
        let mut instances = Vec::new();
        for h in handles {
            instances.push(h.await.unwrap());
        }
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
