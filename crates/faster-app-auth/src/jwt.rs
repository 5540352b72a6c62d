//! HMAC-signed JSON Web Tokens.
//!
//! Supports the `HS256`, `HS384` and `HS512` algorithms. Decoding checks, in
//! order: token shape, header algorithm (must equal the configured one),
//! signature, `nbf`, and `exp`. Both time claims honor a configurable leeway.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

/// Decoded claim set.
pub type Claims = Map<String, Value>;

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwtError {
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("algorithm mismatch: expected {expected}, got {found}")]
    AlgorithmMismatch { expected: String, found: String },
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("invalid signing key")]
    InvalidKey,
}

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl Algorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            _ => Err(JwtError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

macro_rules! hmac_digest {
    ($digest:ty, $key:expr, $msg:expr) => {{
        let mut mac = Hmac::<$digest>::new_from_slice($key).map_err(|_| JwtError::InvalidKey)?;
        mac.update($msg);
        mac.finalize().into_bytes().to_vec()
    }};
}

/// Encodes and verifies tokens with one secret and algorithm.
///
/// # Examples
///
/// ```
/// use faster_app_auth::jwt::{Algorithm, JwtCodec};
/// use serde_json::json;
///
/// let codec = JwtCodec::new("secret", Algorithm::HS256);
/// let token = codec.encode(&json!({"sub": "42"})).unwrap();
/// let claims = codec.decode(&token).unwrap();
/// assert_eq!(claims["sub"], "42");
/// ```
#[derive(Clone)]
pub struct JwtCodec {
    secret: Vec<u8>,
    algorithm: Algorithm,
    leeway_secs: i64,
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl JwtCodec {
    /// Creates a codec.
    pub fn new(secret: impl AsRef<[u8]>, algorithm: Algorithm) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            algorithm,
            leeway_secs: 0,
        }
    }

    /// Allows `exp`/`nbf` to be off by this many seconds.
    #[must_use]
    pub const fn with_leeway(mut self, secs: i64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// The configured algorithm.
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Signs a claim object.
    pub fn encode(&self, claims: &Value) -> Result<String, JwtError> {
        if !claims.is_object() {
            return Err(JwtError::Malformed("claims must be a JSON object".into()));
        }
        let header = json!({"alg": self.algorithm.as_str(), "typ": "JWT"});
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature = self.sign(signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verifies a token and returns its claims.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode_at(token, chrono::Utc::now().timestamp())
    }

    /// Like [`decode`](Self::decode) with an explicit clock.
    pub fn decode_at(&self, token: &str, now: i64) -> Result<Claims, JwtError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(JwtError::Malformed("expected three segments".into()));
        };

        let header: Value = decode_segment(header_b64)?;
        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| JwtError::Malformed("header has no alg".into()))?;
        let alg = Algorithm::from_str(alg)?;
        if alg != self.algorithm {
            return Err(JwtError::AlgorithmMismatch {
                expected: self.algorithm.to_string(),
                found: alg.to_string(),
            });
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|e| JwtError::Malformed(format!("signature: {e}")))?;
        let expected = self.sign(format!("{header_b64}.{claims_b64}").as_bytes())?;
        if !constant_time_eq(&signature, &expected) {
            return Err(JwtError::InvalidSignature);
        }

        let claims: Value = decode_segment(claims_b64)?;
        let Value::Object(claims) = claims else {
            return Err(JwtError::Malformed("claims must be a JSON object".into()));
        };

        if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
            if now + self.leeway_secs < nbf {
                return Err(JwtError::NotYetValid);
            }
        }
        if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
            if now - self.leeway_secs >= exp {
                return Err(JwtError::Expired);
            }
        }
        Ok(claims)
    }

    /// Issues an access token for `subject` valid for `expire_minutes`.
    ///
    /// `extra` must be an object (or null); its members are merged into the claims.
    pub fn issue(&self, subject: &str, extra: Value, expire_minutes: i64) -> Result<String, JwtError> {
        let now = chrono::Utc::now().timestamp();
        let mut claims = match extra {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(JwtError::Malformed("extra claims must be an object".into())),
        };
        claims.insert("sub".into(), Value::String(subject.to_string()));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + expire_minutes * 60));
        self.encode(&Value::Object(claims))
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, JwtError> {
        Ok(match self.algorithm {
            Algorithm::HS256 => hmac_digest!(Sha256, &self.secret, msg),
            Algorithm::HS384 => hmac_digest!(Sha384, &self.secret, msg),
            Algorithm::HS512 => hmac_digest!(Sha512, &self.secret, msg),
        })
    }
}

fn decode_segment(segment: &str) -> Result<Value, JwtError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JwtError::Malformed(format!("base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| JwtError::Malformed(format!("json: {e}")))
}

/// Compares two byte strings without short-circuiting on the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> JwtCodec {
        JwtCodec::new("test-secret", Algorithm::HS256)
    }

    #[test]
    fn test_known_vector() {
        // jwt.io HS256 example with secret "your-256-bit-secret".
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
                     eyJzdWIiOiIxMjM0NTY3ODkwIiwibmFtZSI6IkpvaG4gRG9lIiwiaWF0IjoxNTE2MjM5MDIyfQ.\
                     SflKxwRJSMeKKF2QT4fwpMeJf36POk6yJV_adQssw5c";
        let claims = JwtCodec::new("your-256-bit-secret", Algorithm::HS256)
            .decode(token)
            .unwrap();
        assert_eq!(claims["name"], "John Doe");
    }

    #[test]
    fn test_all_algorithms_roundtrip() {
        for alg in [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512] {
            let c = JwtCodec::new("k", alg);
            let token = c.encode(&json!({"user_id": 7})).unwrap();
            assert_eq!(c.decode(&token).unwrap()["user_id"], 7);
        }
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = codec().encode(&json!({"sub": "1"})).unwrap();
        let other = JwtCodec::new("other", Algorithm::HS256);
        assert_eq!(other.decode(&token), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let token = JwtCodec::new("test-secret", Algorithm::HS512)
            .encode(&json!({"sub": "1"}))
            .unwrap();
        assert!(matches!(
            codec().decode(&token),
            Err(JwtError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_expiry_and_leeway() {
        let token = codec().encode(&json!({"sub": "1", "exp": 1000})).unwrap();
        assert!(codec().decode_at(&token, 999).is_ok());
        assert_eq!(codec().decode_at(&token, 1000), Err(JwtError::Expired));
        assert!(codec().with_leeway(5).decode_at(&token, 1004).is_ok());
    }

    #[test]
    fn test_not_before() {
        let token = codec().encode(&json!({"sub": "1", "nbf": 2000})).unwrap();
        assert_eq!(codec().decode_at(&token, 1999), Err(JwtError::NotYetValid));
        assert!(codec().decode_at(&token, 2000).is_ok());
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(codec().decode("abc"), Err(JwtError::Malformed(_))));
        assert!(matches!(codec().decode("a.b.c.d"), Err(JwtError::Malformed(_))));
        assert!(matches!(codec().decode("!!.e30.xx"), Err(JwtError::Malformed(_))));
        assert!(codec().encode(&json!([1])).is_err());
    }

    #[test]
    fn test_issue_sets_registered_claims() {
        let token = codec().issue("42", json!({"role": "admin"}), 30).unwrap();
        let claims = codec().decode(&token).unwrap();
        assert_eq!(claims["sub"], "42");
        assert_eq!(claims["role"], "admin");
        let ttl = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
        assert_eq!(ttl, 1800);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("hs384".parse::<Algorithm>(), Ok(Algorithm::HS384));
        assert!("RS256".parse::<Algorithm>().is_err());
    }
}
