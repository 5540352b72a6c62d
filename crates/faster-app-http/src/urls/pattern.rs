//! Route path patterns.
//!
//! Patterns use `{name}` placeholders, optionally typed as `{name:int}`,
//! `{name:uuid}`, `{name:slug}` or `{name:str}`. Each placeholder matches one
//! non-empty path segment; trailing slashes are ignored on both sides.

use std::collections::HashMap;
use std::fmt;

use faster_app_core::{AppError, AppResult};

/// Token that replaces parameter names in a normalized path.
pub const PARAM_TOKEN: &str = "{}";

/// The type constraint of a path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// Any non-empty segment.
    Str,
    /// Decimal digits.
    Int,
    /// Letters, digits, `-` and `_`.
    Slug,
    /// Hyphenated UUID.
    Uuid,
}

impl Converter {
    fn parse(name: &str) -> AppResult<Self> {
        match name {
            "" | "str" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "slug" => Ok(Self::Slug),
            "uuid" => Ok(Self::Uuid),
            other => Err(AppError::improperly_configured(format!(
                "Unknown path converter '{other}'"
            ))),
        }
    }

    fn accepts(self, segment: &str) -> bool {
        match self {
            Self::Str => !segment.is_empty(),
            Self::Int => !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()),
            Self::Slug => {
                !segment.is_empty()
                    && segment
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            }
            Self::Uuid => segment.len() == 36 && uuid::Uuid::parse_str(segment).is_ok(),
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::Str => "",
            Self::Int => ":int",
            Self::Slug => ":slug",
            Self::Uuid => ":uuid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, converter: Converter },
}

/// A parsed route pattern.
///
/// # Examples
///
/// ```
/// use faster_app_http::RoutePattern;
///
/// let pattern = RoutePattern::parse("/notes/{id:int}/pin").unwrap();
/// let params = pattern.match_path("/notes/7/pin/").unwrap();
/// assert_eq!(params["id"], "7");
/// assert!(pattern.match_path("/notes/abc/pin").is_none());
/// assert_eq!(pattern.normalized(), "/notes/{}/pin");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    route: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parses a route such as `/items/{id}`.
    pub fn parse(route: &str) -> AppResult<Self> {
        let mut segments = Vec::new();
        for raw in route.split('/').filter(|s| !s.is_empty()) {
            if let Some(inner) = raw.strip_prefix('{') {
                let inner = inner.strip_suffix('}').ok_or_else(|| {
                    AppError::improperly_configured(format!("Unclosed brace in route '{route}'"))
                })?;
                let (name, converter) = inner.split_once(':').unwrap_or((inner, ""));
                if name.is_empty() {
                    return Err(AppError::improperly_configured(format!(
                        "Empty parameter name in route '{route}'"
                    )));
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param { name: n, .. } if n == name))
                {
                    return Err(AppError::improperly_configured(format!(
                        "Duplicate parameter '{name}' in route '{route}'"
                    )));
                }
                segments.push(Segment::Param {
                    name: name.to_string(),
                    converter: Converter::parse(converter)?,
                });
            } else if raw.contains('{') || raw.contains('}') {
                return Err(AppError::improperly_configured(format!(
                    "Parameters must span a whole segment in route '{route}'"
                )));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }
        Ok(Self {
            route: canonical(&segments),
            segments,
        })
    }

    /// The canonical route string (leading slash, no trailing slash).
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Parameter names in positional order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// The route with every parameter replaced by [`PARAM_TOKEN`].
    pub fn normalized(&self) -> String {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => lit.as_str(),
                Segment::Param { .. } => PARAM_TOKEN,
            })
            .collect();
        format!("/{}", parts.join("/"))
    }

    /// Matches a request path, returning the captured parameters.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param { name, converter } => {
                    let decoded = percent_encoding::percent_decode_str(part)
                        .decode_utf8_lossy()
                        .into_owned();
                    if !converter.accepts(&decoded) {
                        return None;
                    }
                    params.insert(name.clone(), decoded);
                }
            }
        }
        Some(params)
    }

    /// Prepends `prefix` to this pattern.
    pub fn with_prefix(&self, prefix: &str) -> AppResult<Self> {
        Self::parse(&join(prefix, &self.route))
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.route)
    }
}

/// Joins two route fragments with exactly one slash between them.
pub fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => ensure_leading(prefix),
        (false, false) => format!("{}/{path}", ensure_leading(prefix)),
    }
}

fn ensure_leading(s: &str) -> String {
    if s.starts_with('/') {
        s.to_string()
    } else {
        format!("/{s}")
    }
}

fn canonical(segments: &[Segment]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .map(|s| match s {
            Segment::Literal(lit) => lit.clone(),
            Segment::Param { name, converter } => format!("{{{name}{}}}", converter.suffix()),
        })
        .collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let p = RoutePattern::parse("/").unwrap();
        assert_eq!(p.route(), "/");
        assert!(p.match_path("/").is_some());
        assert!(p.match_path("").is_some());
        assert!(p.match_path("/x").is_none());
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let p = RoutePattern::parse("/notes/").unwrap();
        assert_eq!(p.route(), "/notes");
        assert!(p.match_path("/notes").is_some());
        assert!(p.match_path("/notes/").is_some());
    }

    #[test]
    fn test_param_capture_and_decoding() {
        let p = RoutePattern::parse("/users/{name}").unwrap();
        let params = p.match_path("/users/ann%20lee").unwrap();
        assert_eq!(params["name"], "ann lee");
        assert_eq!(p.param_names(), vec!["name"]);
    }

    #[test]
    fn test_converters() {
        let p = RoutePattern::parse("/items/{id:uuid}").unwrap();
        assert!(p
            .match_path("/items/67e55044-10b1-426f-9247-bb680e5fe0c8")
            .is_some());
        assert!(p.match_path("/items/42").is_none());

        let slug = RoutePattern::parse("/tags/{tag:slug}").unwrap();
        assert!(slug.match_path("/tags/rust-lang").is_some());
        assert!(slug.match_path("/tags/rust%20lang").is_none());
        assert_eq!(slug.route(), "/tags/{tag:slug}");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(RoutePattern::parse("/items/{id").is_err());
        assert!(RoutePattern::parse("/items/{}").is_err());
        assert!(RoutePattern::parse("/items/{id:float}").is_err());
        assert!(RoutePattern::parse("/items/x{id}").is_err());
        assert!(RoutePattern::parse("/a/{id}/b/{id}").is_err());
    }

    #[test]
    fn test_normalized_erases_names() {
        let a = RoutePattern::parse("/items/{id}").unwrap();
        let b = RoutePattern::parse("/items/{name:int}").unwrap();
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/api/", "/notes"), "/api/notes");
        assert_eq!(join("", "notes"), "/notes");
        assert_eq!(join("api", ""), "/api");
        assert_eq!(join("", "/"), "/");
        let p = RoutePattern::parse("/{id}").unwrap().with_prefix("/notes").unwrap();
        assert_eq!(p.route(), "/notes/{id}");
    }
}
