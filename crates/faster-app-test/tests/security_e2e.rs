//! End-to-end tests for the throttle, authentication and permission chains.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use faster_app_auth::{
    IsAuthenticated, IsOwnerOrReadOnly, MemoryTokenStore, TokenAuthentication,
};
use faster_app_core::{AppError, AppResult, Settings};
use faster_app_db::{Fields, MemoryCollection};
use faster_app_http::request::Identity;
use faster_app_http::RequestContext;
use faster_app_test::TestClient;
use faster_app_views::viewsets::{SimpleRateThrottle, ThrottleStore};
use faster_app_views::{FasterApp, JsonRecord, Resource, ViewSet};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

static TOKENS: Lazy<Arc<MemoryTokenStore>> = Lazy::new(|| Arc::new(MemoryTokenStore::new()));

async fn login(id: &str) -> String {
    let token = format!("token-{id}");
    TOKENS.insert(token.clone(), Identity::new(id)).await;
    token
}

fn token_auth() -> Arc<TokenAuthentication> {
    Arc::new(TokenAuthentication::new(Arc::<MemoryTokenStore>::clone(&TOKENS)))
}

fn addr(ip: &str) -> SocketAddr {
    format!("{ip}:5000").parse().unwrap()
}

// ============================================================================
// Throttling
// ============================================================================

#[derive(Default)]
struct Burst;

impl ViewSet for Burst {
    type Read = JsonRecord;
    type Create = JsonRecord;
    type Update = JsonRecord;

    fn resource() -> Resource {
        let throttle = SimpleRateThrottle::new("3/minute", "burst")
            .unwrap()
            .with_store(Arc::new(ThrottleStore::new()));
        Resource::new(Arc::new(MemoryCollection::new("burst"))).throttle(Arc::new(throttle))
    }
}

#[tokio::test]
async fn test_throttle_refuses_after_limit() {
    let router = FasterApp::new(Settings::default())
        .router(Burst::router("/burst"))
        .build()
        .unwrap();
    let client = TestClient::new(router.clone()).with_client_addr(addr("10.1.1.1"));

    for _ in 0..3 {
        assert_eq!(client.get("/burst").await.status_code(), 200);
    }
    let resp = client.get("/burst").await;
    assert_eq!(resp.status_code(), 429);
    let envelope = resp.envelope();
    assert!(!envelope.success);
    assert_eq!(envelope.data["scope"], "burst");
    let wait = envelope.data["wait"].as_u64().unwrap();
    assert!((1..=60).contains(&wait));

    // Buckets are per client.
    let other = TestClient::new(router).with_client_addr(addr("10.1.1.2"));
    assert_eq!(other.get("/burst").await.status_code(), 200);
}

#[tokio::test]
async fn test_throttle_runs_before_authentication_and_permissions() {
    #[derive(Default)]
    struct Guarded;

    impl ViewSet for Guarded {
        type Read = JsonRecord;
        type Create = JsonRecord;
        type Update = JsonRecord;

        fn resource() -> Resource {
            let throttle = SimpleRateThrottle::new("1/minute", "guarded")
                .unwrap()
                .with_store(Arc::new(ThrottleStore::new()));
            Resource::new(Arc::new(MemoryCollection::new("guarded")))
                .throttle(Arc::new(throttle))
                .permission::<IsAuthenticated>()
        }
    }

    let router = FasterApp::new(Settings::default())
        .router(Guarded::router("/guarded"))
        .build()
        .unwrap();
    let client = TestClient::new(router).with_client_addr(addr("10.2.2.2"));
    assert_eq!(client.get("/guarded").await.status_code(), 403);
    assert_eq!(client.get("/guarded").await.status_code(), 429);
}

// ============================================================================
// Ownership
// ============================================================================

#[derive(Default)]
struct Posts;

#[async_trait]
impl ViewSet for Posts {
    type Read = JsonRecord;
    type Create = JsonRecord;
    type Update = JsonRecord;

    fn resource() -> Resource {
        Resource::new(Arc::new(MemoryCollection::new("posts")))
            .authenticator(token_auth())
            .permission::<IsOwnerOrReadOnly>()
    }

    async fn perform_create_hook(&self, ctx: &RequestContext, mut fields: Fields) -> AppResult<Fields> {
        let identity = ctx
            .identity
            .as_ref()
            .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided."))?;
        fields.insert("owner_id".to_string(), Value::String(identity.id.clone()));
        Ok(fields)
    }
}

fn posts() -> axum::Router {
    FasterApp::new(Settings::default())
        .router(Posts::router("/posts"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_owner_or_read_only() {
    let router = posts();
    let alice = TestClient::new(router.clone()).with_token(&login("alice").await);
    let bob = TestClient::new(router.clone()).with_token(&login("bob").await);
    let anonymous = TestClient::new(router);

    let resp = alice.post_json("/posts", &json!({ "title": "hello" })).await;
    assert_eq!(resp.status_code(), 201);
    assert_eq!(resp.data()["owner_id"], "alice");
    let path = format!("/posts/{}", resp.data()["id"].as_str().unwrap());

    // Anyone may read.
    assert_eq!(anonymous.get(&path).await.status_code(), 200);
    assert_eq!(bob.get(&path).await.status_code(), 200);

    // Only the owner may write.
    let resp = bob.patch_json(&path, &json!({ "title": "mine now" })).await;
    assert_eq!(resp.status_code(), 403);
    assert_eq!(resp.data()["permission"], "IsOwnerOrReadOnly");
    assert_eq!(bob.delete(&path).await.status_code(), 403);
    assert_eq!(anonymous.delete(&path).await.status_code(), 403);

    let resp = alice.patch_json(&path, &json!({ "title": "edited" })).await;
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.data()["title"], "edited");
    assert_eq!(alice.delete(&path).await.status_code(), 200);
}

#[tokio::test]
async fn test_anonymous_create_is_rejected_by_hook() {
    let resp = TestClient::new(posts())
        .post_json("/posts", &json!({ "title": "spam" }))
        .await;
    assert_eq!(resp.status_code(), 401);
}

#[tokio::test]
async fn test_unknown_token_is_anonymous() {
    let client = TestClient::new(posts()).with_token("never-issued");
    let resp = client.post_json("/posts", &json!({ "title": "x" })).await;
    assert_eq!(resp.status_code(), 401);
    assert_eq!(client.get("/posts").await.status_code(), 200);
}

// ============================================================================
// Authentication required
// ============================================================================

#[derive(Default)]
struct Private;

impl ViewSet for Private {
    type Read = JsonRecord;
    type Create = JsonRecord;
    type Update = JsonRecord;

    fn resource() -> Resource {
        Resource::new(Arc::new(MemoryCollection::new("private")))
            .authenticator(token_auth())
            .permission::<IsAuthenticated>()
    }
}

#[tokio::test]
async fn test_is_authenticated() {
    let router = FasterApp::new(Settings::default())
        .router(Private::router("/private"))
        .build()
        .unwrap();

    let resp = TestClient::new(router.clone()).get("/private").await;
    assert_eq!(resp.status_code(), 403);
    assert_eq!(resp.data()["action"], "list");

    let client = TestClient::new(router).with_token(&login("carol").await);
    assert_eq!(client.get("/private").await.status_code(), 200);
    // Retrieve checks collection permissions before the lookup.
    assert_eq!(client.get("/private/nope").await.status_code(), 404);
}
