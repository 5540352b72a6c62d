//! The authentication chain.
//!
//! Each [`Authentication`] tries to resolve an [`Identity`] from the request
//! and returns `None` when the request does not carry its scheme or the
//! credential is invalid. [`authenticate`] walks a chain in order and the
//! first success wins. Failing to authenticate is never an error here; the
//! permission chain decides what anonymous requests may do.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use faster_app_core::settings::{Settings, SETTINGS};
use faster_app_http::{Identity, RequestContext};
use rand::RngCore;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::jwt::{Algorithm, Claims, JwtCodec};

/// Resolves an identity from a request.
#[async_trait]
pub trait Authentication: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Returns the identity and the credential it came from, or `None`.
    async fn authenticate(&self, ctx: &RequestContext) -> Option<(Identity, String)>;
}

/// Runs the chain and attaches the first resolved identity to `ctx`.
///
/// Returns `true` when an identity was attached.
pub async fn authenticate(chain: &[Arc<dyn Authentication>], ctx: &mut RequestContext) -> bool {
    for authenticator in chain {
        if let Some((identity, token)) = authenticator.authenticate(ctx).await {
            tracing::debug!(
                authenticator = authenticator.name(),
                identity = %identity.id,
                "request authenticated"
            );
            ctx.authenticate(identity, Some(token));
            return true;
        }
    }
    false
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ── NoAuthentication ────────────────────────────────────────────────

/// Never resolves an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

#[async_trait]
impl Authentication for NoAuthentication {
    async fn authenticate(&self, _ctx: &RequestContext) -> Option<(Identity, String)> {
        None
    }
}

// ── JwtAuthentication ───────────────────────────────────────────────

/// `Authorization: Bearer <jwt>` authentication.
///
/// The identity id comes from the `user_id` claim, falling back to `sub`.
/// Without an explicit secret the codec is built from the global settings at
/// request time.
#[derive(Debug, Clone, Default)]
pub struct JwtAuthentication {
    codec: Option<JwtCodec>,
}

impl JwtAuthentication {
    /// Uses an explicit secret and algorithm.
    pub fn new(secret: impl AsRef<[u8]>, algorithm: Algorithm) -> Self {
        Self {
            codec: Some(JwtCodec::new(secret, algorithm)),
        }
    }

    /// Uses an existing codec.
    pub const fn with_codec(codec: JwtCodec) -> Self {
        Self { codec: Some(codec) }
    }

    /// Builds the codec from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_codec(codec_from_settings(settings))
    }

    fn codec(&self) -> JwtCodec {
        self.codec
            .clone()
            .unwrap_or_else(|| codec_from_settings(SETTINGS.get()))
    }
}

/// Builds a codec from the `jwt` settings section.
pub fn codec_from_settings(settings: &Settings) -> JwtCodec {
    let algorithm = settings.jwt.algorithm.parse().unwrap_or_else(|_| {
        tracing::warn!(algorithm = %settings.jwt.algorithm, "unsupported JWT algorithm, using HS256");
        Algorithm::HS256
    });
    JwtCodec::new(settings.jwt_secret(), algorithm).with_leeway(settings.jwt.leeway_secs)
}

/// Maps verified claims to an identity.
pub fn identity_from_claims(claims: Claims) -> Option<Identity> {
    let id = claims
        .get("user_id")
        .or_else(|| claims.get("sub"))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })?;
    let flag = |key: &str| claims.get(key).and_then(Value::as_bool).unwrap_or(false);
    let text = |key: &str| claims.get(key).and_then(Value::as_str).map(String::from);

    Some(Identity {
        id,
        username: text("username"),
        is_admin: flag("is_admin"),
        is_superuser: flag("is_superuser"),
        role: text("role"),
        claims: Value::Object(claims),
    })
}

#[async_trait]
impl Authentication for JwtAuthentication {
    async fn authenticate(&self, ctx: &RequestContext) -> Option<(Identity, String)> {
        let token = ctx.header("authorization")?.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        match self.codec().decode(token) {
            Ok(claims) => identity_from_claims(claims).map(|identity| (identity, token.to_string())),
            Err(err) => {
                tracing::debug!(error = %err, "JWT rejected");
                None
            }
        }
    }
}

// ── TokenAuthentication ─────────────────────────────────────────────

/// Looks up opaque tokens.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Returns the identity bound to `token`, if it is active.
    async fn lookup(&self, token: &str) -> Option<Identity>;
}

/// A process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `token` to `identity`.
    pub async fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().await.insert(token.into(), identity);
    }

    /// Generates a random token for `identity` and stores it.
    pub async fn issue(&self, identity: Identity) -> String {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.insert(token.clone(), identity).await;
        token
    }

    /// Revokes a token; returns `true` if it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn lookup(&self, token: &str) -> Option<Identity> {
        self.tokens.read().await.get(token).cloned()
    }
}

/// `Authorization: Token <key>` or `?token=<key>` authentication.
#[derive(Clone)]
pub struct TokenAuthentication {
    store: Arc<dyn TokenStore>,
    header: String,
    keyword: String,
    query_param: String,
}

impl std::fmt::Debug for TokenAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthentication")
            .field("header", &self.header)
            .field("keyword", &self.keyword)
            .field("query_param", &self.query_param)
            .finish_non_exhaustive()
    }
}

impl Default for TokenAuthentication {
    fn default() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }
}

impl TokenAuthentication {
    /// Creates an authenticator over `store`.
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            header: "authorization".to_string(),
            keyword: "Token".to_string(),
            query_param: "token".to_string(),
        }
    }

    /// Reads the token from a different header.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into().to_ascii_lowercase();
        self
    }

    /// Reads the token from a different query parameter.
    #[must_use]
    pub fn with_query_param(mut self, param: impl Into<String>) -> Self {
        self.query_param = param.into();
        self
    }

    fn extract(&self, ctx: &RequestContext) -> Option<String> {
        let from_header = ctx.header(&self.header).and_then(|value| {
            value
                .strip_prefix(self.keyword.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
                .map(str::trim)
                .filter(|t| !t.is_empty())
        });
        from_header
            .or_else(|| ctx.query().get_trimmed(&self.query_param))
            .map(String::from)
    }
}

#[async_trait]
impl Authentication for TokenAuthentication {
    async fn authenticate(&self, ctx: &RequestContext) -> Option<(Identity, String)> {
        let token = self.extract(ctx)?;
        let identity = self.store.lookup(&token).await;
        if identity.is_none() {
            tracing::debug!("unknown or revoked token");
        }
        identity.map(|identity| (identity, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bearer(token: &str) -> RequestContext {
        RequestContext::builder()
            .header("Authorization", &format!("Bearer {token}"))
            .build()
    }

    #[tokio::test]
    async fn test_no_authentication() {
        let ctx = bearer("x");
        assert!(NoAuthentication.authenticate(&ctx).await.is_none());
        assert_eq!(NoAuthentication.name(), "NoAuthentication");
    }

    #[tokio::test]
    async fn test_jwt_resolves_identity() {
        let auth = JwtAuthentication::new("s3cret", Algorithm::HS256);
        let token = JwtCodec::new("s3cret", Algorithm::HS256)
            .encode(&json!({"user_id": 5, "username": "ann", "is_admin": true}))
            .unwrap();
        let (identity, raw) = auth.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(identity.id, "5");
        assert_eq!(identity.username.as_deref(), Some("ann"));
        assert!(identity.is_admin);
        assert_eq!(raw, token);
    }

    #[tokio::test]
    async fn test_jwt_falls_back_to_sub() {
        let codec = JwtCodec::new("k", Algorithm::HS384);
        let auth = JwtAuthentication::with_codec(codec.clone());
        let token = codec.issue("abc", Value::Null, 5).unwrap();
        let (identity, _) = auth.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(identity.id, "abc");
    }

    #[tokio::test]
    async fn test_jwt_invalid_tokens_resolve_to_none() {
        let auth = JwtAuthentication::new("k", Algorithm::HS256);
        let expired = JwtCodec::new("k", Algorithm::HS256)
            .encode(&json!({"sub": "1", "exp": 1}))
            .unwrap();
        let no_subject = JwtCodec::new("k", Algorithm::HS256)
            .encode(&json!({"name": "x"}))
            .unwrap();
        assert!(auth.authenticate(&bearer(&expired)).await.is_none());
        assert!(auth.authenticate(&bearer(&no_subject)).await.is_none());
        assert!(auth.authenticate(&bearer("garbage")).await.is_none());

        let basic = RequestContext::builder().header("Authorization", "Basic abc").build();
        assert!(auth.authenticate(&basic).await.is_none());
    }

    #[tokio::test]
    async fn test_token_header_and_query() {
        let store = Arc::new(MemoryTokenStore::new());
        store.insert("t1", Identity::new("7")).await;
        let auth = TokenAuthentication::new(store.clone());

        let via_header = RequestContext::builder().header("Authorization", "Token t1").build();
        assert_eq!(auth.authenticate(&via_header).await.unwrap().0.id, "7");

        let via_query = RequestContext::builder().query_string("token=t1").build();
        assert_eq!(auth.authenticate(&via_query).await.unwrap().1, "t1");

        assert!(store.revoke("t1").await);
        assert!(auth.authenticate(&via_header).await.is_none());
    }

    #[tokio::test]
    async fn test_issued_tokens_are_unique() {
        let store = MemoryTokenStore::new();
        let a = store.issue(Identity::new("1")).await;
        let b = store.issue(Identity::new("1")).await;
        assert_ne!(a, b);
        assert_eq!(store.lookup(&a).await.unwrap().id, "1");
    }

    #[tokio::test]
    async fn test_chain_first_success_wins() {
        let store = Arc::new(MemoryTokenStore::new());
        store.insert("t", Identity::new("from-token")).await;
        let chain: Vec<Arc<dyn Authentication>> = vec![
            Arc::new(NoAuthentication),
            Arc::new(TokenAuthentication::new(store)),
            Arc::new(JwtAuthentication::new("k", Algorithm::HS256)),
        ];

        let mut ctx = RequestContext::builder().query_string("token=t").build();
        assert!(authenticate(&chain, &mut ctx).await);
        assert_eq!(ctx.identity.as_ref().unwrap().id, "from-token");
        assert_eq!(ctx.auth_token.as_deref(), Some("t"));

        let mut anon = RequestContext::builder().build();
        assert!(!authenticate(&chain, &mut anon).await);
        assert!(anon.identity.is_none());
    }
}
