//! Application lifecycle registry.
//!
//! Pluggable sub-applications implement [`AppLifecycle`] and are added to an
//! [`AppRegistry`]. The registry orders them by their declared dependencies
//! (Kahn's algorithm), starts them one at a time under a timeout, promotes the
//! survivors to [`AppState::Ready`], and shuts them down in reverse order.
//! A failing or slow entry is marked [`AppState::Stopped`] and never takes the
//! others down with it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::AppError;

/// The lifecycle state of a registered application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// Registered, startup not attempted yet.
    Uninitialized,
    /// `on_startup` succeeded (or is running); waiting for `on_ready`.
    Starting,
    /// Fully started.
    Ready,
    /// `on_shutdown` is running.
    ShuttingDown,
    /// Terminal: shut down, or failed to start.
    Stopped,
}

impl AppState {
    /// Returns the wire name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sub-application that takes part in startup and shutdown.
///
/// Every hook has a no-op default, so an implementation only needs a name.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use faster_app_core::apps::AppLifecycle;
///
/// struct Cache;
///
/// #[async_trait]
/// impl AppLifecycle for Cache {
///     fn name(&self) -> &str { "cache" }
///     fn dependencies(&self) -> Vec<String> { vec!["database".into()] }
/// }
/// ```
#[async_trait]
pub trait AppLifecycle: Send + Sync {
    /// Unique name of the application.
    fn name(&self) -> &str;

    /// Names of the applications that must start before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Acquires resources. Runs under the startup timeout.
    async fn on_startup(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Called once every application has attempted startup.
    async fn on_ready(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Releases resources. Runs under the shutdown timeout.
    async fn on_shutdown(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Reports a health payload for the readiness probe.
    async fn health_check(&self) -> Result<Value, AppError> {
        Ok(json!({"status": "healthy", "app": self.name()}))
    }
}

/// Summary of one registered application, as returned by [`AppRegistry::list_apps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    /// Application name.
    pub name: String,
    /// Current state.
    pub state: AppState,
    /// Declared dependencies (self-dependencies removed).
    pub dependencies: Vec<String>,
}

/// Health of one registered application, as returned by [`AppRegistry::health_report`].
#[derive(Debug, Clone, Serialize)]
pub struct AppHealth {
    /// Application name.
    pub name: String,
    /// Current state.
    pub state: AppState,
    /// Payload returned by the health hook, or `{status: "unhealthy", error}`.
    pub health: Value,
}

/// The central registry of lifecycle-managed applications.
///
/// Registration happens before the registry is shared; startup, shutdown and
/// the read accessors all take `&self`, so an `Arc<AppRegistry>` can be handed
/// to the readiness endpoint while the server drives the lifecycle.
#[derive(Default)]
pub struct AppRegistry {
    apps: HashMap<String, Arc<dyn AppLifecycle>>,
    registration_order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    states: RwLock<HashMap<String, AppState>>,
    startup_order: RwLock<Vec<String>>,
}

impl AppRegistry {
    /// Creates a new, empty `AppRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application.
    ///
    /// Dependencies do not need to be registered yet; they are checked when
    /// [`startup_all`](Self::startup_all) runs. A dependency on itself is ignored.
    pub fn register(&mut self, app: Arc<dyn AppLifecycle>) -> Result<(), AppError> {
        let name = app.name().to_string();
        if self.apps.contains_key(&name) {
            return Err(AppError::improperly_configured(format!(
                "Application '{name}' is already registered"
            )));
        }

        let mut deps = Vec::new();
        for dep in app.dependencies() {
            if dep == name {
                tracing::warn!(app = %name, "ignoring self-dependency");
                continue;
            }
            if deps.contains(&dep) {
                continue;
            }
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(name.clone());
            deps.push(dep);
        }

        self.dependencies.insert(name.clone(), deps);
        self.states
            .get_mut()
            .insert(name.clone(), AppState::Uninitialized);
        self.registration_order.push(name.clone());
        self.apps.insert(name, app);
        Ok(())
    }

    /// Computes the startup order.
    ///
    /// Fails when a dependency names an unregistered application, or when the
    /// graph has a cycle; in the latter case every entry that could not be
    /// ordered is reported.
    pub fn topological_order(&self) -> Result<Vec<String>, AppError> {
        let mut missing = Vec::new();
        for name in &self.registration_order {
            for dep in &self.dependencies[name] {
                if !self.apps.contains_key(dep) {
                    missing.push(format!("{name} -> {dep}"));
                }
            }
        }
        if !missing.is_empty() {
            return Err(AppError::improperly_configured(format!(
                "Applications depend on unregistered applications: {}",
                missing.join(", ")
            ))
            .with_data(json!({ "missing": missing })));
        }

        let mut in_degree: HashMap<&str, usize> = self
            .registration_order
            .iter()
            .map(|name| (name.as_str(), self.dependencies[name].len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .registration_order
            .iter()
            .map(String::as_str)
            .filter(|name| in_degree[name] == 0)
            .collect();

        let mut result = Vec::with_capacity(self.apps.len());
        while let Some(name) = queue.pop_front() {
            result.push(name.to_string());
            if let Some(dependents) = self.dependents.get(name) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.apps.len() {
            let ordered: HashSet<&str> = result.iter().map(String::as_str).collect();
            let mut unresolved: Vec<String> = self
                .registration_order
                .iter()
                .filter(|name| !ordered.contains(name.as_str()))
                .cloned()
                .collect();
            unresolved.sort();
            return Err(AppError::improperly_configured(format!(
                "Circular dependency detected among applications: {}",
                unresolved.join(", ")
            ))
            .with_data(json!({ "unresolved": unresolved })));
        }

        Ok(result)
    }

    /// Starts every application in dependency order.
    ///
    /// Only ordering failures are returned as errors. A hook that fails or
    /// exceeds `timeout` marks its application [`AppState::Stopped`] and
    /// startup moves on to the next one.
    pub async fn startup_all(&self, timeout: Duration) -> Result<(), AppError> {
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(error = %err, "cannot determine application startup order");
                return Err(err);
            }
        };
        tracing::debug!(order = %order.join(" -> "), "application startup order");
        (*self.startup_order.write().await).clone_from(&order);

        for name in &order {
            let app = Arc::clone(&self.apps[name]);
            self.set_state(name, AppState::Starting).await;

            let stopped_deps: Vec<&String> = {
                let states = self.states.read().await;
                self.dependencies[name]
                    .iter()
                    .filter(|dep| states.get(*dep) == Some(&AppState::Stopped))
                    .collect()
            };
            if !stopped_deps.is_empty() {
                tracing::warn!(app = %name, deps = ?stopped_deps, "starting with stopped dependencies");
            }

            tracing::debug!(app = %name, "starting application");
            let outcome = run_hook(timeout, async move { app.on_startup().await }).await;
            match outcome {
                HookOutcome::Completed => {
                    tracing::debug!(app = %name, "application started");
                }
                HookOutcome::Failed(reason) => {
                    tracing::error!(app = %name, error = %reason, "application failed to start");
                    self.set_state(name, AppState::Stopped).await;
                }
                HookOutcome::TimedOut => {
                    tracing::error!(app = %name, timeout_secs = timeout.as_secs_f64(), "application startup timed out");
                    self.set_state(name, AppState::Stopped).await;
                }
            }
        }

        for name in &order {
            if self.get_state(name).await != Some(AppState::Starting) {
                continue;
            }
            let app = Arc::clone(&self.apps[name]);
            match app.on_ready().await {
                Ok(()) => {
                    self.set_state(name, AppState::Ready).await;
                    tracing::info!(app = %name, "application ready");
                }
                Err(err) => {
                    tracing::error!(app = %name, error = %err, "application ready hook failed");
                }
            }
        }

        Ok(())
    }

    /// Shuts every running application down in reverse startup order.
    ///
    /// Errors and timeouts are logged, never returned; the application is
    /// marked [`AppState::Stopped`] whatever its hook did.
    pub async fn shutdown_all(&self, timeout: Duration) {
        let order = self.startup_order.read().await.clone();
        for name in order.iter().rev() {
            let state = self.get_state(name).await;
            if !matches!(state, Some(AppState::Ready | AppState::Starting)) {
                continue;
            }

            let app = Arc::clone(&self.apps[name]);
            self.set_state(name, AppState::ShuttingDown).await;
            tracing::debug!(app = %name, "shutting down application");

            match run_hook(timeout, async move { app.on_shutdown().await }).await {
                HookOutcome::Completed => tracing::debug!(app = %name, "application stopped"),
                HookOutcome::Failed(reason) => {
                    tracing::error!(app = %name, error = %reason, "application shutdown failed");
                }
                HookOutcome::TimedOut => {
                    tracing::warn!(app = %name, timeout_secs = timeout.as_secs_f64(), "application shutdown timed out");
                }
            }
            self.set_state(name, AppState::Stopped).await;
        }
    }

    /// Returns the application with the given name.
    pub fn get_app(&self, name: &str) -> Option<Arc<dyn AppLifecycle>> {
        self.apps.get(name).cloned()
    }

    /// Returns the current state of an application.
    pub async fn get_state(&self, name: &str) -> Option<AppState> {
        self.states.read().await.get(name).copied()
    }

    /// Returns the order computed by the last [`startup_all`](Self::startup_all).
    pub async fn startup_order(&self) -> Vec<String> {
        self.startup_order.read().await.clone()
    }

    /// Lists every application with its state and dependencies.
    ///
    /// Uses the startup order once it is known, registration order before.
    pub async fn list_apps(&self) -> Vec<AppInfo> {
        let startup_order = self.startup_order.read().await;
        let names = if startup_order.is_empty() {
            &self.registration_order
        } else {
            &*startup_order
        };
        let states = self.states.read().await;
        names
            .iter()
            .map(|name| AppInfo {
                name: name.clone(),
                state: states
                    .get(name)
                    .copied()
                    .unwrap_or(AppState::Uninitialized),
                dependencies: self.dependencies[name].clone(),
            })
            .collect()
    }

    /// Collects state plus health hook output for every application.
    pub async fn health_report(&self) -> Vec<AppHealth> {
        let mut report = Vec::with_capacity(self.apps.len());
        for info in self.list_apps().await {
            let app = &self.apps[&info.name];
            let health = match app.health_check().await {
                Ok(value) => value,
                Err(err) => json!({"status": "unhealthy", "error": err.message()}),
            };
            report.push(AppHealth {
                name: info.name,
                state: info.state,
                health,
            });
        }
        report
    }

    /// Returns `true` when every registered application is [`AppState::Ready`].
    pub async fn all_ready(&self) -> bool {
        self.states
            .read()
            .await
            .values()
            .all(|state| *state == AppState::Ready)
    }

    /// Returns `true` if an application with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(name)
    }

    /// Returns the number of registered applications.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` if no application is registered.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    async fn set_state(&self, name: &str, state: AppState) {
        self.states.write().await.insert(name.to_string(), state);
    }
}

enum HookOutcome {
    Completed,
    Failed(String),
    TimedOut,
}

/// Runs a lifecycle hook on its own task so that a panic or a timeout only
/// affects that one application.
async fn run_hook<F>(timeout: Duration, hook: F) -> HookOutcome
where
    F: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
{
    let mut handle = tokio::spawn(hook);
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(()))) => HookOutcome::Completed,
        Ok(Ok(Err(err))) => HookOutcome::Failed(err.to_string()),
        Ok(Err(join_err)) => HookOutcome::Failed(format!("hook panicked: {join_err}")),
        Err(_) => {
            handle.abort();
            HookOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct Behaviour {
        fail_startup: bool,
        hang_startup: bool,
        fail_ready: bool,
        fail_shutdown: bool,
        unhealthy: bool,
    }

    struct TestApp {
        name: String,
        deps: Vec<String>,
        journal: Journal,
        behaviour: Behaviour,
    }

    impl TestApp {
        fn new(name: &str, deps: &[&str], journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                deps: deps.iter().map(ToString::to_string).collect(),
                journal: Arc::clone(journal),
                behaviour: Behaviour::default(),
            }
        }

        fn with(mut self, behaviour: Behaviour) -> Arc<dyn AppLifecycle> {
            self.behaviour = behaviour;
            Arc::new(self)
        }

        fn arc(self) -> Arc<dyn AppLifecycle> {
            Arc::new(self)
        }

        fn log(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{event}:{}", self.name));
        }
    }

    #[async_trait]
    impl AppLifecycle for TestApp {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }

        async fn on_startup(&self) -> Result<(), AppError> {
            self.log("start");
            if self.behaviour.hang_startup {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.behaviour.fail_startup {
                return Err(AppError::internal("boom"));
            }
            Ok(())
        }

        async fn on_ready(&self) -> Result<(), AppError> {
            self.log("ready");
            if self.behaviour.fail_ready {
                return Err(AppError::internal("not ready"));
            }
            Ok(())
        }

        async fn on_shutdown(&self) -> Result<(), AppError> {
            self.log("stop");
            if self.behaviour.fail_shutdown {
                return Err(AppError::internal("stuck"));
            }
            Ok(())
        }

        async fn health_check(&self) -> Result<Value, AppError> {
            if self.behaviour.unhealthy {
                return Err(AppError::internal("db down"));
            }
            Ok(json!({"status": "healthy", "app": self.name}))
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn events(journal: &Journal, prefix: &str) -> Vec<String> {
        journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(ToString::to_string))
            .collect()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    // ── Registration ────────────────────────────────────────────────

    #[test]
    fn test_register_rejects_duplicates() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("a", &[], &j).arc()).unwrap();
        let err = registry.register(TestApp::new("a", &[], &j).arc()).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_ignores_self_dependency() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("a", &["a"], &j).arc()).unwrap();
        assert_eq!(registry.topological_order().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_default_registry_is_empty() {
        let registry = AppRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.list_apps().await.is_empty());
        assert!(registry.all_ready().await);
    }

    // ── Ordering ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_startup_and_shutdown_order() {
        let j = journal();
        let mut registry = AppRegistry::new();
        // Registered out of order on purpose.
        registry.register(TestApp::new("c", &["b"], &j).arc()).unwrap();
        registry.register(TestApp::new("a", &[], &j).arc()).unwrap();
        registry.register(TestApp::new("b", &["a"], &j).arc()).unwrap();

        registry.startup_all(TIMEOUT).await.unwrap();
        assert_eq!(events(&j, "start:"), vec!["a", "b", "c"]);
        assert_eq!(events(&j, "ready:"), vec!["a", "b", "c"]);
        assert!(registry.all_ready().await);
        assert_eq!(registry.startup_order().await, vec!["a", "b", "c"]);

        registry.shutdown_all(TIMEOUT).await;
        assert_eq!(events(&j, "stop:"), vec!["c", "b", "a"]);
        for name in ["a", "b", "c"] {
            assert_eq!(registry.get_state(name).await, Some(AppState::Stopped));
        }
    }

    #[tokio::test]
    async fn test_cycle_reports_all_members() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("a", &["c"], &j).arc()).unwrap();
        registry.register(TestApp::new("b", &["a"], &j).arc()).unwrap();
        registry.register(TestApp::new("c", &["b"], &j).arc()).unwrap();
        registry.register(TestApp::new("free", &[], &j).arc()).unwrap();

        let err = registry.startup_all(TIMEOUT).await.unwrap_err();
        assert_eq!(err.data(), Some(&json!({"unresolved": ["a", "b", "c"]})));
        assert!(err.to_string().contains("a, b, c"));
        // Nothing was started.
        assert!(events(&j, "start:").is_empty());
        assert_eq!(registry.get_state("free").await, Some(AppState::Uninitialized));
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_rejected() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("api", &["db"], &j).arc()).unwrap();
        let err = registry.startup_all(TIMEOUT).await.unwrap_err();
        assert!(err.to_string().contains("api -> db"));
    }

    // ── Failure isolation ───────────────────────────────────────────

    #[tokio::test]
    async fn test_failed_startup_does_not_abort_others() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry
            .register(TestApp::new("a", &[], &j).with(Behaviour {
                fail_startup: true,
                ..Behaviour::default()
            }))
            .unwrap();
        registry.register(TestApp::new("b", &[], &j).arc()).unwrap();

        registry.startup_all(TIMEOUT).await.unwrap();
        assert_eq!(registry.get_state("a").await, Some(AppState::Stopped));
        assert_eq!(registry.get_state("b").await, Some(AppState::Ready));
        assert_eq!(events(&j, "ready:"), vec!["b"]);
        assert!(!registry.all_ready().await);

        registry.shutdown_all(TIMEOUT).await;
        // The failed app is skipped on shutdown.
        assert_eq!(events(&j, "stop:"), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout_marks_stopped() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry
            .register(TestApp::new("slow", &[], &j).with(Behaviour {
                hang_startup: true,
                ..Behaviour::default()
            }))
            .unwrap();
        registry.register(TestApp::new("fast", &["slow"], &j).arc()).unwrap();

        registry
            .startup_all(Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(registry.get_state("slow").await, Some(AppState::Stopped));
        assert_eq!(registry.get_state("fast").await, Some(AppState::Ready));
    }

    #[tokio::test]
    async fn test_ready_failure_keeps_starting_state() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry
            .register(TestApp::new("a", &[], &j).with(Behaviour {
                fail_ready: true,
                ..Behaviour::default()
            }))
            .unwrap();

        registry.startup_all(TIMEOUT).await.unwrap();
        assert_eq!(registry.get_state("a").await, Some(AppState::Starting));

        // Starting entries are still shut down.
        registry.shutdown_all(TIMEOUT).await;
        assert_eq!(events(&j, "stop:"), vec!["a"]);
        assert_eq!(registry.get_state("a").await, Some(AppState::Stopped));
    }

    #[tokio::test]
    async fn test_shutdown_failure_still_stops() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry
            .register(TestApp::new("a", &[], &j).with(Behaviour {
                fail_shutdown: true,
                ..Behaviour::default()
            }))
            .unwrap();
        registry.startup_all(TIMEOUT).await.unwrap();
        registry.shutdown_all(TIMEOUT).await;
        assert_eq!(registry.get_state("a").await, Some(AppState::Stopped));
    }

    #[tokio::test]
    async fn test_shutdown_before_startup_is_noop() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("a", &[], &j).arc()).unwrap();
        registry.shutdown_all(TIMEOUT).await;
        assert!(events(&j, "stop:").is_empty());
        assert_eq!(registry.get_state("a").await, Some(AppState::Uninitialized));
    }

    // ── Introspection ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_apps_and_health_report() {
        let j = journal();
        let mut registry = AppRegistry::new();
        registry.register(TestApp::new("db", &[], &j).arc()).unwrap();
        registry
            .register(TestApp::new("api", &["db"], &j).with(Behaviour {
                unhealthy: true,
                ..Behaviour::default()
            }))
            .unwrap();

        let apps = registry.list_apps().await;
        assert_eq!(apps[1].name, "api");
        assert_eq!(apps[1].dependencies, vec!["db"]);
        assert_eq!(apps[1].state, AppState::Uninitialized);

        registry.startup_all(TIMEOUT).await.unwrap();
        let report = registry.health_report().await;
        assert_eq!(report[0].health["status"], "healthy");
        assert_eq!(report[1].health, json!({"status": "unhealthy", "error": "db down"}));
        assert_eq!(report[1].state, AppState::Ready);
        assert!(registry.get_app("db").is_some());
        assert!(registry.contains("api"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(AppState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(
            serde_json::to_value(AppState::Ready).unwrap(),
            json!("ready")
        );
    }
}
