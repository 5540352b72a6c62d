//! Route conflict detection.
//!
//! The validator runs once before the server accepts traffic. Routes are
//! grouped by method and normalized path (parameter names erased). Inside a
//! group, routes that also agree on parameter names are a full conflict, and
//! routes that bind the same positions under different names are a
//! parameter-name conflict.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use faster_app_core::{AppError, AppResult, RouteValidationMode};
use http::Method;
use serde::Serialize;

use super::pattern::RoutePattern;

/// How conflicts are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Conflicts abort startup.
    #[default]
    Strict,
    /// Conflicts are logged and startup continues.
    Permissive,
    /// No validation.
    Disabled,
}

impl ValidationMode {
    /// Derives the mode from the `validate_routes` switch and configured mode.
    pub const fn from_settings(validate_routes: bool, mode: RouteValidationMode) -> Self {
        match (validate_routes, mode) {
            (false, _) => Self::Disabled,
            (true, RouteValidationMode::Strict) => Self::Strict,
            (true, RouteValidationMode::Permissive) => Self::Permissive,
        }
    }
}

/// A route as seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub path: String,
    pub normalized_path: String,
    pub params: Vec<String>,
    pub source: String,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl RouteRecord {
    /// Builds a record from a parsed pattern.
    pub fn new(method: Method, pattern: &RoutePattern, source: &str) -> Self {
        Self {
            method,
            path: pattern.route().to_string(),
            normalized_path: pattern.normalized(),
            params: pattern.param_names().into_iter().map(String::from).collect(),
            source: source.to_string(),
        }
    }
}

/// The kind of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same method and identical path.
    Full,
    /// Same method and path shape, different parameter names.
    ParamName,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full conflict"),
            Self::ParamName => f.write_str("path parameter name conflict"),
        }
    }
}

/// One conflict and every route involved in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteConflict {
    pub kind: ConflictKind,
    pub message: String,
    pub routes: Vec<RouteRecord>,
}

impl fmt::Display for RouteConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for route in &self.routes {
            write!(f, "\n   - {} {} (source: {})", route.method, route.path, route.source)?;
        }
        Ok(())
    }
}

/// Route statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub total_routes: usize,
    pub methods: BTreeMap<String, usize>,
    pub unique_paths: usize,
    pub paths: Vec<String>,
}

/// Collects routes from every router and checks them for collisions.
///
/// # Examples
///
/// ```
/// use faster_app_http::{RoutePattern, RouteRecord, RouteValidator, ValidationMode};
/// use http::Method;
///
/// let mut validator = RouteValidator::new(ValidationMode::Strict);
/// validator.add(RouteRecord::new(Method::GET, &RoutePattern::parse("/items/{id}").unwrap(), "a"));
/// validator.add(RouteRecord::new(Method::GET, &RoutePattern::parse("/items/{name}").unwrap(), "b"));
/// assert!(validator.validate().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteValidator {
    mode: ValidationMode,
    routes: Vec<RouteRecord>,
}

impl RouteValidator {
    /// Creates an empty validator.
    pub const fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            routes: Vec::new(),
        }
    }

    /// The configured mode.
    pub const fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Adds one route.
    pub fn add(&mut self, record: RouteRecord) {
        self.routes.push(record);
    }

    /// Adds many routes.
    pub fn collect(&mut self, records: impl IntoIterator<Item = RouteRecord>) {
        self.routes.extend(records);
    }

    /// Every collected route.
    pub fn routes(&self) -> &[RouteRecord] {
        &self.routes
    }

    /// Detects conflicts without applying the mode.
    pub fn conflicts(&self) -> Vec<RouteConflict> {
        let mut groups: BTreeMap<(String, String), Vec<&RouteRecord>> = BTreeMap::new();
        for route in &self.routes {
            groups
                .entry((route.method.to_string(), route.normalized_path.clone()))
                .or_default()
                .push(route);
        }

        let mut conflicts = Vec::new();
        for ((method, normalized), routes) in groups {
            if routes.len() < 2 {
                continue;
            }

            let mut by_params: Vec<(&[String], Vec<&RouteRecord>)> = Vec::new();
            for &route in &routes {
                match by_params.iter_mut().find(|(p, _)| *p == route.params.as_slice()) {
                    Some((_, members)) => members.push(route),
                    None => by_params.push((route.params.as_slice(), vec![route])),
                }
            }

            for (_, members) in by_params.iter().filter(|(_, m)| m.len() > 1) {
                conflicts.push(RouteConflict {
                    kind: ConflictKind::Full,
                    message: format!(
                        "{method} {} is defined {} times",
                        members[0].path,
                        members.len()
                    ),
                    routes: members.iter().map(|r| (*r).clone()).collect(),
                });
            }

            if by_params.len() > 1 {
                let names: Vec<String> = by_params
                    .iter()
                    .map(|(p, _)| format!("[{}]", p.join(", ")))
                    .collect();
                conflicts.push(RouteConflict {
                    kind: ConflictKind::ParamName,
                    message: format!(
                        "{method} {normalized} binds different parameter names {}",
                        names.join(" vs ")
                    ),
                    routes: routes.iter().map(|r| (*r).clone()).collect(),
                });
            }
        }
        conflicts
    }

    /// Validates according to the mode.
    ///
    /// Strict mode fails on any conflict, permissive mode logs and returns the
    /// conflicts, disabled mode returns nothing.
    pub fn validate(&self) -> AppResult<Vec<RouteConflict>> {
        if self.mode == ValidationMode::Disabled {
            tracing::debug!("route validation disabled");
            return Ok(Vec::new());
        }

        let conflicts = self.conflicts();
        if conflicts.is_empty() {
            tracing::info!(routes = self.routes.len(), "route validation passed");
            return Ok(conflicts);
        }

        for conflict in &conflicts {
            tracing::warn!(kind = %conflict.kind, "route conflict: {conflict}");
        }

        match self.mode {
            ValidationMode::Strict => {
                let report: Vec<String> = conflicts
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{}. {c}", i + 1))
                    .collect();
                Err(AppError::improperly_configured(format!(
                    "Route validation found {} conflict(s)",
                    conflicts.len()
                ))
                .with_detail(report.join("\n"))
                .with_data(serde_json::to_value(&conflicts).unwrap_or_default()))
            }
            ValidationMode::Permissive | ValidationMode::Disabled => Ok(conflicts),
        }
    }

    /// Counts routes by method and path.
    pub fn summary(&self) -> RouteSummary {
        let mut methods: BTreeMap<String, usize> = BTreeMap::new();
        let mut paths: HashMap<&str, usize> = HashMap::new();
        for route in &self.routes {
            *methods.entry(route.method.to_string()).or_default() += 1;
            *paths.entry(route.normalized_path.as_str()).or_default() += 1;
        }
        let mut sorted: Vec<String> = paths.keys().map(|p| (*p).to_string()).collect();
        sorted.sort();
        RouteSummary {
            total_routes: self.routes.len(),
            methods,
            unique_paths: sorted.len(),
            paths: sorted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(method: Method, path: &str, source: &str) -> RouteRecord {
        RouteRecord::new(method, &RoutePattern::parse(path).unwrap(), source)
    }

    #[test]
    fn test_no_conflicts() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items", "a"));
        v.add(record(Method::POST, "/items", "a"));
        v.add(record(Method::GET, "/items/{id}", "a"));
        v.add(record(Method::GET, "/items/stats", "a"));
        assert!(v.validate().unwrap().is_empty());
    }

    #[test]
    fn test_full_conflict() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items/{id}", "first"));
        v.add(record(Method::GET, "/items/{id}/", "second"));
        let conflicts = v.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Full);
        let sources: Vec<&str> = conflicts[0].routes.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "second"]);

        let err = v.validate().unwrap_err();
        assert!(matches!(err, AppError::ImproperlyConfigured(_)));
        assert!(err.detail().unwrap().contains("second"));
    }

    #[test]
    fn test_param_name_conflict() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items/{id}", "a"));
        v.add(record(Method::GET, "/items/{name}", "b"));
        let conflicts = v.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::ParamName);
        assert_eq!(conflicts[0].routes.len(), 2);
    }

    #[test]
    fn test_different_methods_do_not_conflict() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items/{id}", "a"));
        v.add(record(Method::DELETE, "/items/{name}", "b"));
        assert!(v.conflicts().is_empty());
    }

    #[test]
    fn test_mixed_group_reports_both_kinds() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items/{id}", "a"));
        v.add(record(Method::GET, "/items/{id}", "b"));
        v.add(record(Method::GET, "/items/{slug}", "c"));
        let kinds: Vec<ConflictKind> = v.conflicts().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ConflictKind::Full, ConflictKind::ParamName]);
    }

    #[test]
    fn test_permissive_and_disabled() {
        let mut permissive = RouteValidator::new(ValidationMode::Permissive);
        permissive.add(record(Method::GET, "/items/{id}", "a"));
        permissive.add(record(Method::GET, "/items/{name}", "b"));
        permissive.add(record(Method::GET, "/items/{name}", "c"));
        assert_eq!(permissive.validate().unwrap().len(), 2);

        let mut disabled = RouteValidator::new(ValidationMode::Disabled);
        disabled.collect(permissive.routes().to_vec());
        assert!(disabled.validate().unwrap().is_empty());
    }

    #[test]
    fn test_mode_from_settings() {
        assert_eq!(
            ValidationMode::from_settings(false, RouteValidationMode::Strict),
            ValidationMode::Disabled
        );
        assert_eq!(
            ValidationMode::from_settings(true, RouteValidationMode::Permissive),
            ValidationMode::Permissive
        );
    }

    #[test]
    fn test_summary() {
        let mut v = RouteValidator::new(ValidationMode::Strict);
        v.add(record(Method::GET, "/items", "a"));
        v.add(record(Method::POST, "/items", "a"));
        v.add(record(Method::GET, "/items/{id}", "a"));
        let summary = v.summary();
        assert_eq!(summary.total_routes, 3);
        assert_eq!(summary.methods["GET"], 2);
        assert_eq!(summary.unique_paths, 2);
        assert_eq!(summary.paths, vec!["/items", "/items/{}"]);
    }
}
