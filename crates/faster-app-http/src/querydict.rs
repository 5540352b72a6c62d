//! Query string parameters.
//!
//! [`QueryDict`] keeps every `key=value` pair in arrival order so that
//! repeated keys are preserved. [`QueryDict::get`] returns the last value for a
//! key, which is what filter backends read.

use std::fmt;

/// An ordered multi-value dictionary parsed from a URL query string.
///
/// # Examples
///
/// ```
/// use faster_app_http::QueryDict;
///
/// let qd = QueryDict::parse("ordering=-age&search=ann&ordering=name");
/// assert_eq!(qd.get("ordering"), Some("name"));
/// assert_eq!(qd.get_list("ordering"), vec!["-age", "name"]);
/// assert_eq!(qd.get("missing"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    pairs: Vec<(String, String)>,
}

impl QueryDict {
    /// Creates an empty dictionary.
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Parses a query string such as `"a=1&b=2"`.
    ///
    /// `+` decodes to a space and percent sequences are decoded lossily.
    pub fn parse(query_string: &str) -> Self {
        let pairs = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(key), percent_decode(value))
            })
            .collect();
        Self { pairs }
    }

    /// Returns the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the last non-blank value for `key`, trimmed.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Returns every value for `key`, in arrival order.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Appends a value.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replaces every value of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.push((key, value.into()));
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Distinct keys in first-seen order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !keys.contains(&k.as_str()) {
                keys.push(k);
            }
        }
        keys
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns `true` if no pairs were parsed.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over all pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the pairs back into a query string.
    pub fn urlencode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for QueryDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urlencode())
    }
}

fn percent_decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_string() {
        let qd = QueryDict::parse("");
        assert!(qd.is_empty());
        assert_eq!(qd.len(), 0);
    }

    #[test]
    fn test_last_value_wins() {
        let qd = QueryDict::parse("color=red&color=blue&size=l");
        assert_eq!(qd.get("color"), Some("blue"));
        assert_eq!(qd.get_list("color"), vec!["red", "blue"]);
        assert_eq!(qd.len(), 2);
        assert_eq!(qd.keys(), vec!["color", "size"]);
    }

    #[test]
    fn test_decoding() {
        let qd = QueryDict::parse("q=hello+world&name=caf%C3%A9&flag");
        assert_eq!(qd.get("q"), Some("hello world"));
        assert_eq!(qd.get("name"), Some("café"));
        assert_eq!(qd.get("flag"), Some(""));
        assert!(qd.contains_key("flag"));
    }

    #[test]
    fn test_get_trimmed_skips_blank() {
        let qd = QueryDict::parse("search=+&ordering=+name+");
        assert_eq!(qd.get_trimmed("search"), None);
        assert_eq!(qd.get_trimmed("ordering"), Some("name"));
    }

    #[test]
    fn test_set_and_urlencode() {
        let mut qd = QueryDict::parse("page=1&page=2");
        qd.set("page", "3");
        qd.append("size", "a b");
        assert_eq!(qd.get_list("page"), vec!["3"]);
        assert_eq!(qd.urlencode(), "page=3&size=a%20b");
    }
}
