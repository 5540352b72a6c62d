//! Root, liveness and readiness endpoints.

use std::sync::Arc;

use faster_app_core::{AppRegistry, AppResult, Settings};
use faster_app_http::{handler, ApiResponse, RouteEntry, RoutePattern, RouteTable};
use http::{Method, StatusCode};
use serde_json::json;

const SOURCE: &str = "builtin";

/// `GET /`, `GET /health` and `GET /ready`.
///
/// `/ready` answers 503 until every registered application is Ready, and
/// always when no registry is attached.
pub fn builtin_routes(settings: &Settings, registry: Option<Arc<AppRegistry>>) -> AppResult<RouteTable> {
    let mut table = RouteTable::new();

    let (p, v) = (settings.project_name.clone(), settings.version.clone());
    table.push(
        RouteEntry::new(
            vec![Method::GET],
            RoutePattern::parse("/")?,
            SOURCE,
            handler(move |_ctx| {
                let data = json!({ "project": p, "version": v });
                async move { Ok(ApiResponse::success(data)) }
            }),
        )
        .named("root"),
    );

    let v = settings.version.clone();
    table.push(
        RouteEntry::new(
            vec![Method::GET],
            RoutePattern::parse("/health")?,
            SOURCE,
            handler(move |_ctx| {
                let data = json!({ "status": "healthy", "version": v });
                async move { Ok(ApiResponse::success(data)) }
            }),
        )
        .named("health"),
    );

    table.push(
        RouteEntry::new(
            vec![Method::GET],
            RoutePattern::parse("/ready")?,
            SOURCE,
            handler(move |_ctx| {
                let registry = registry.clone();
                async move { Ok(readiness(registry.as_deref()).await) }
            }),
        )
        .named("ready"),
    );
    Ok(table)
}

/// Builds the readiness response for `registry`.
pub async fn readiness(registry: Option<&AppRegistry>) -> ApiResponse {
    let Some(registry) = registry else {
        return not_ready(json!({ "ready": false, "apps": [] }), "No application registry attached");
    };
    let ready = registry.all_ready().await;
    let apps = registry.health_report().await;
    let data = json!({ "ready": ready, "apps": apps });
    if ready {
        ApiResponse::success(data)
    } else {
        not_ready(data, "Service not ready")
    }
}

fn not_ready(data: serde_json::Value, message: &str) -> ApiResponse {
    let status = StatusCode::SERVICE_UNAVAILABLE;
    ApiResponse::error(message, status.as_u16(), status).with_data(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use faster_app_core::{AppError, AppLifecycle, AppState};
    use faster_app_http::RequestContext;
    use std::time::Duration;

    struct Probe {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl AppLifecycle for Probe {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_startup(&self) -> Result<(), AppError> {
            if self.fail {
                Err(AppError::internal("boom"))
            } else {
                Ok(())
            }
        }
    }

    async fn get(table: &RouteTable, path: &str) -> ApiResponse {
        let (h, _) = table.resolve(&Method::GET, path).into_match(&Method::GET, path).unwrap();
        h(RequestContext::builder().path(path).build()).await.unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let settings = Settings::default();
        let table = builtin_routes(&settings, None).unwrap();
        let root = get(&table, "/").await;
        assert_eq!(root.data()["project"], "faster-app");
        let health = get(&table, "/health").await;
        assert_eq!(health.data()["status"], "healthy");
        assert_eq!(health.data()["version"], settings.version.as_str());
    }

    #[tokio::test]
    async fn test_ready_without_registry_is_unavailable() {
        let table = builtin_routes(&Settings::default(), None).unwrap();
        let resp = get(&table, "/ready").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!resp.envelope().success);
    }

    #[tokio::test]
    async fn test_ready_tracks_registry() {
        let mut registry = AppRegistry::new();
        registry.register(Arc::new(Probe { name: "cache", fail: false })).unwrap();
        let registry = Arc::new(registry);
        let table = builtin_routes(&Settings::default(), Some(Arc::clone(&registry))).unwrap();

        assert_eq!(get(&table, "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
        registry.startup_all(Duration::from_secs(1)).await.unwrap();
        let resp = get(&table, "/ready").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.data()["apps"][0]["name"], "cache");

        let mut broken = AppRegistry::new();
        broken.register(Arc::new(Probe { name: "db", fail: true })).unwrap();
        broken.startup_all(Duration::from_secs(1)).await.unwrap();
        assert_eq!(broken.get_state("db").await, Some(AppState::Stopped));
        let resp = readiness(Some(&broken)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.data()["ready"], false);
    }
}
