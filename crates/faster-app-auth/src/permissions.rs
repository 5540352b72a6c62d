//! The permission chain.
//!
//! Permissions answer two questions: may this request perform `action` at all
//! ([`Permission::has_permission`]), and may it perform `action` on this
//! particular record ([`Permission::has_object_permission`], which defaults to
//! `true`). Every permission in a chain must agree; the first refusal aborts
//! the request with `Forbidden`.

use std::sync::Arc;

use async_trait::async_trait;
use faster_app_core::{AppError, AppResult};
use faster_app_db::value::json_text;
use faster_app_db::Record;
use faster_app_http::RequestContext;
use serde_json::json;

use crate::authentication::short_type_name;

/// Message carried by permission failures.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// A single access rule.
#[async_trait]
pub trait Permission: Send + Sync + 'static {
    /// Short name used in logs and error data.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Collection-level check, before any record is loaded.
    async fn has_permission(&self, ctx: &RequestContext, action: &str) -> bool;

    /// Object-level check for operations that target one record.
    async fn has_object_permission(
        &self,
        _ctx: &RequestContext,
        _action: &str,
        _obj: &Record,
    ) -> bool {
        true
    }
}

/// Runs the collection-level checks of a chain.
pub async fn check_permissions(
    chain: &[Arc<dyn Permission>],
    ctx: &RequestContext,
    action: &str,
) -> AppResult<()> {
    for permission in chain {
        if !permission.has_permission(ctx, action).await {
            return Err(denied(permission.name(), action, ctx));
        }
    }
    Ok(())
}

/// Runs the object-level checks of a chain.
pub async fn check_object_permissions(
    chain: &[Arc<dyn Permission>],
    ctx: &RequestContext,
    action: &str,
    obj: &Record,
) -> AppResult<()> {
    for permission in chain {
        if !permission.has_object_permission(ctx, action, obj).await {
            return Err(denied(permission.name(), action, ctx));
        }
    }
    Ok(())
}

fn denied(permission: &str, action: &str, ctx: &RequestContext) -> AppError {
    tracing::info!(
        permission,
        action,
        identity = ctx.identity.as_ref().map(|i| i.id.as_str()),
        "permission denied"
    );
    AppError::forbidden(PERMISSION_DENIED).with_data(json!({
        "action": action,
        "permission": permission,
    }))
}

/// Returns the owner reference of a record.
///
/// Looks at `owner_id`, `user_id`, then nested `owner.id` and `user.id`.
pub fn owner_of(obj: &Record) -> Option<String> {
    ["owner_id", "user_id", "owner__id", "user__id"]
        .iter()
        .find_map(|path| obj.get_path(path).filter(|v| !v.is_null()).and_then(json_text))
}

fn is_owner(ctx: &RequestContext, obj: &Record) -> bool {
    match (&ctx.identity, owner_of(obj)) {
        (Some(identity), Some(owner)) => identity.id == owner,
        _ => false,
    }
}

// ── Built-in permissions ────────────────────────────────────────────

/// Allows every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAny;

#[async_trait]
impl Permission for AllowAny {
    async fn has_permission(&self, _ctx: &RequestContext, _action: &str) -> bool {
        true
    }
}

/// Requires a resolved identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

#[async_trait]
impl Permission for IsAuthenticated {
    async fn has_permission(&self, ctx: &RequestContext, _action: &str) -> bool {
        ctx.is_authenticated()
    }
}

/// Requires an identity with admin rights.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAdminUser;

#[async_trait]
impl Permission for IsAdminUser {
    async fn has_permission(&self, ctx: &RequestContext, _action: &str) -> bool {
        ctx.identity
            .as_ref()
            .is_some_and(faster_app_http::Identity::has_admin_rights)
    }
}

/// Requires an identity, and for single-record operations, ownership.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsOwner;

#[async_trait]
impl Permission for IsOwner {
    async fn has_permission(&self, ctx: &RequestContext, _action: &str) -> bool {
        ctx.is_authenticated()
    }

    async fn has_object_permission(&self, ctx: &RequestContext, _action: &str, obj: &Record) -> bool {
        is_owner(ctx, obj)
    }
}

/// Anyone may read; only the owner may write.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsOwnerOrReadOnly;

#[async_trait]
impl Permission for IsOwnerOrReadOnly {
    async fn has_permission(&self, _ctx: &RequestContext, _action: &str) -> bool {
        true
    }

    async fn has_object_permission(&self, ctx: &RequestContext, _action: &str, obj: &Record) -> bool {
        ctx.is_read_method() || is_owner(ctx, obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faster_app_http::Identity;
    use http::Method;
    use serde_json::Value;

    fn ctx(method: Method, identity: Option<Identity>) -> RequestContext {
        let mut builder = RequestContext::builder().method(method);
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        builder.build()
    }

    fn note(owner: Value) -> Record {
        Record::from_json(json!({"id": "n1", "owner_id": owner})).unwrap()
    }

    #[tokio::test]
    async fn test_allow_any_and_is_authenticated() {
        let anon = ctx(Method::GET, None);
        let user = ctx(Method::GET, Some(Identity::new("1")));
        assert!(AllowAny.has_permission(&anon, "list").await);
        assert!(!IsAuthenticated.has_permission(&anon, "list").await);
        assert!(IsAuthenticated.has_permission(&user, "list").await);
    }

    #[tokio::test]
    async fn test_is_admin_user() {
        let plain = ctx(Method::GET, Some(Identity::new("1")));
        let admin = ctx(Method::GET, Some(Identity::new("1").with_admin(true)));
        let role = ctx(Method::GET, Some(Identity::new("1").with_role("admin")));
        assert!(!IsAdminUser.has_permission(&plain, "list").await);
        assert!(IsAdminUser.has_permission(&admin, "list").await);
        assert!(IsAdminUser.has_permission(&role, "list").await);
        assert!(!IsAdminUser.has_permission(&ctx(Method::GET, None), "list").await);
    }

    #[tokio::test]
    async fn test_is_owner() {
        let owner = ctx(Method::PUT, Some(Identity::new("7")));
        let other = ctx(Method::PUT, Some(Identity::new("8")));
        let anon = ctx(Method::GET, None);
        assert!(!IsOwner.has_permission(&anon, "retrieve").await);
        assert!(IsOwner.has_object_permission(&owner, "update", &note(json!(7))).await);
        assert!(!IsOwner.has_object_permission(&other, "update", &note(json!(7))).await);
        assert!(!IsOwner.has_object_permission(&owner, "update", &note(Value::Null)).await);
    }

    #[tokio::test]
    async fn test_owner_or_read_only() {
        let obj = note(json!("7"));
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(IsOwnerOrReadOnly.has_object_permission(&ctx(method, None), "retrieve", &obj).await);
        }
        for method in [Method::PUT, Method::PATCH, Method::DELETE] {
            let owner = ctx(method.clone(), Some(Identity::new("7")));
            let other = ctx(method.clone(), Some(Identity::new("9")));
            let anon = ctx(method, None);
            assert!(IsOwnerOrReadOnly.has_object_permission(&owner, "update", &obj).await);
            assert!(!IsOwnerOrReadOnly.has_object_permission(&other, "update", &obj).await);
            assert!(!IsOwnerOrReadOnly.has_object_permission(&anon, "update", &obj).await);
        }
    }

    #[test]
    fn test_owner_of_nested_and_user_id() {
        let by_user = Record::from_json(json!({"user_id": "u1"})).unwrap();
        let nested = Record::from_json(json!({"owner": {"id": 3}})).unwrap();
        assert_eq!(owner_of(&by_user).as_deref(), Some("u1"));
        assert_eq!(owner_of(&nested).as_deref(), Some("3"));
        assert_eq!(owner_of(&Record::default()), None);
    }

    #[tokio::test]
    async fn test_chain_reports_first_refusal() {
        let chain: Vec<Arc<dyn Permission>> = vec![Arc::new(AllowAny), Arc::new(IsAuthenticated)];
        let err = check_permissions(&chain, &ctx(Method::GET, None), "list")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.data().unwrap()["permission"], json!("IsAuthenticated"));

        let user = ctx(Method::DELETE, Some(Identity::new("2")));
        assert!(check_permissions(&chain, &user, "destroy").await.is_ok());

        let owners: Vec<Arc<dyn Permission>> = vec![Arc::new(IsOwnerOrReadOnly)];
        let err = check_object_permissions(&owners, &user, "destroy", &note(json!("1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
