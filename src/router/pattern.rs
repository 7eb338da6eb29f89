//! Route pattern compilation and matching.
//!
//! Two parameter styles are supported:
//! - brace style: `/users/{id}/{limit?}/{offset?}`, compiled to anchored
//!   regexes. Trailing `?` marks an optional segment; a shorter path still
//!   matches by progressively dropping optional segments off the tail.
//! - legacy style: `/users/$id/$limit?`, matched positionally segment by
//!   segment. Captured legacy values are trimmed and XSS-filtered before
//!   they reach a handler.
//!
//! Matched parameters land in an ordered `name -> Option<String>` map;
//! optionals missing from the path are `None`.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::security::xss_remove;

/// Extracted route parameters, in declaration order.
pub type Params = IndexMap<String, Option<String>>;

lazy_static! {
    static ref BRACE_TOKEN: Regex = Regex::new(r"\{([a-zA-Z0-9_]+)(\?)?\}").unwrap();
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// No parameters, plain string equality.
    Exact(String),
    /// `{name}` / `{name?}` segments.
    Braced(BracedPattern),
    /// `$name` / `$name?` positional segments.
    Legacy(LegacyPattern),
}

impl RoutePattern {
    /// Pick the pattern style from the URI shape.
    pub fn compile(uri: &str) -> RoutePattern {
        if uri.contains('{') {
            RoutePattern::Braced(BracedPattern::compile(uri))
        } else if uri.split('/').any(|seg| seg.starts_with('$')) {
            RoutePattern::Legacy(LegacyPattern::compile(uri))
        } else {
            RoutePattern::Exact(uri.to_string())
        }
    }

    /// Match a normalized path. `Some` carries the extracted parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        match self {
            RoutePattern::Exact(uri) => (uri == path).then(Params::new),
            RoutePattern::Braced(p) => p.matches(path),
            RoutePattern::Legacy(p) => p.matches(path),
        }
    }
}

/// Brace-style pattern: one anchored regex per optional-suffix length, tried
/// from all-optionals-present down to all-absent.
#[derive(Debug, Clone)]
pub struct BracedPattern {
    /// All parameter names in declaration order.
    names: Vec<String>,
    /// (regex, number of captured params), longest variant first.
    variants: Vec<(Regex, usize)>,
}

impl BracedPattern {
    fn compile(uri: &str) -> BracedPattern {
        let mut names = Vec::new();
        let mut optional_count = 0;
        for caps in BRACE_TOKEN.captures_iter(uri) {
            names.push(caps[1].to_string());
            if caps.get(2).is_some() {
                optional_count += 1;
            } else {
                // Required params reset the droppable tail
                optional_count = 0;
            }
        }

        let required = names.len() - optional_count;
        let mut variants = Vec::new();
        for kept in (required..=names.len()).rev() {
            let stripped = strip_optional_tail(uri, names.len() - kept);
            variants.push((to_regex(&stripped), kept));
        }

        BracedPattern { names, variants }
    }

    fn matches(&self, path: &str) -> Option<Params> {
        for (regex, kept) in &self.variants {
            if let Some(caps) = regex.captures(path) {
                let mut params = Params::new();
                for (i, name) in self.names.iter().enumerate() {
                    let value = if i < *kept {
                        caps.get(i + 1).map(|m| m.as_str().to_string())
                    } else {
                        None
                    };
                    params.insert(name.clone(), value);
                }
                return Some(params);
            }
        }
        None
    }
}

/// Drop the last `count` optional `{name?}` tokens (and their slashes) from
/// the pattern tail.
fn strip_optional_tail(uri: &str, count: usize) -> String {
    let mut out = uri.to_string();
    for _ in 0..count {
        if let Some(pos) = out.rfind('{') {
            out.truncate(pos);
            while out.ends_with('/') {
                out.pop();
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Replace brace tokens with capture groups, escaping the literal parts.
fn to_regex(uri: &str) -> Regex {
    let mut pattern = String::from("^");
    let mut last = 0;
    for caps in BRACE_TOKEN.captures_iter(uri) {
        let m = caps.get(0).unwrap();
        pattern.push_str(&regex::escape(&uri[last..m.start()]));
        pattern.push_str("([a-zA-Z0-9_]+)");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&uri[last..]));
    pattern.push('$');
    Regex::new(&pattern).unwrap()
}

/// Legacy positional pattern.
#[derive(Debug, Clone)]
pub struct LegacyPattern {
    segments: Vec<LegacySegment>,
}

#[derive(Debug, Clone)]
enum LegacySegment {
    Literal(String),
    Param { name: String, optional: bool },
}

impl LegacyPattern {
    fn compile(uri: &str) -> LegacyPattern {
        let segments = uri
            .split('/')
            .map(|seg| {
                if let Some(rest) = seg.strip_prefix('$') {
                    let (name, optional) = match rest.strip_suffix('?') {
                        Some(name) => (name, true),
                        None => (rest, false),
                    };
                    LegacySegment::Param {
                        name: name.to_string(),
                        optional,
                    }
                } else {
                    LegacySegment::Literal(seg.to_string())
                }
            })
            .collect();
        LegacyPattern { segments }
    }

    fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() > self.segments.len() {
            return None;
        }
        // A shorter path is fine only if everything past it is optional
        if self.segments[parts.len()..].iter().any(|seg| {
            !matches!(seg, LegacySegment::Param { optional: true, .. })
        }) {
            return None;
        }

        let mut params = Params::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                LegacySegment::Literal(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                LegacySegment::Param { name, .. } => {
                    let value = parts
                        .get(i)
                        .map(|v| xss_remove(v.trim()));
                    params.insert(name.clone(), value);
                }
            }
        }
        Some(params)
    }
}

/// Normalize an incoming path for matching: drop the query string and any
/// trailing slashes; the bare root stays `/`.
pub fn normalize_path(raw: &str) -> String {
    let mut path = match raw.split_once('?') {
        Some((before, _)) => before.to_string(),
        None => raw.to_string(),
    };
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params_of(pairs: &[(&str, Option<&str>)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_exact_pattern() {
        let p = RoutePattern::compile("/health");
        assert_eq!(p.matches("/health"), Some(Params::new()));
        assert_eq!(p.matches("/healthz"), None);
    }

    #[test]
    fn test_braced_required_param() {
        let p = RoutePattern::compile("/users/{id}");
        assert_eq!(
            p.matches("/users/42"),
            Some(params_of(&[("id", Some("42"))]))
        );
        assert_eq!(p.matches("/users"), None);
        assert_eq!(p.matches("/users/42/extra"), None);
    }

    #[test]
    fn test_braced_optionals_all_present() {
        let p = RoutePattern::compile("/users/{id}/{limit?}/{offset?}");
        assert_eq!(
            p.matches("/users/5/10/2"),
            Some(params_of(&[
                ("id", Some("5")),
                ("limit", Some("10")),
                ("offset", Some("2")),
            ]))
        );
    }

    #[test]
    fn test_braced_optionals_absent_are_none() {
        let p = RoutePattern::compile("/users/{id}/{limit?}/{offset?}");
        assert_eq!(
            p.matches("/users/5"),
            Some(params_of(&[
                ("id", Some("5")),
                ("limit", None),
                ("offset", None),
            ]))
        );
        assert_eq!(
            p.matches("/users/5/10"),
            Some(params_of(&[
                ("id", Some("5")),
                ("limit", Some("10")),
                ("offset", None),
            ]))
        );
    }

    #[test]
    fn test_braced_param_charset() {
        let p = RoutePattern::compile("/files/{name}");
        assert!(p.matches("/files/report_2").is_some());
        assert_eq!(p.matches("/files/report.pdf"), None);
    }

    #[test]
    fn test_legacy_positional_params() {
        let p = RoutePattern::compile("/orders/$id/$page?");
        assert_eq!(
            p.matches("/orders/9/2"),
            Some(params_of(&[("id", Some("9")), ("page", Some("2"))]))
        );
        assert_eq!(
            p.matches("/orders/9"),
            Some(params_of(&[("id", Some("9")), ("page", None)]))
        );
        assert_eq!(p.matches("/orders"), None);
        assert_eq!(p.matches("/orders/9/2/3"), None);
    }

    #[test]
    fn test_legacy_literal_mismatch() {
        let p = RoutePattern::compile("/orders/$id");
        assert_eq!(p.matches("/invoices/9"), None);
    }

    #[test]
    fn test_legacy_values_are_filtered() {
        let p = RoutePattern::compile("/search/$term");
        let params = p.matches("/search/<script>x").unwrap();
        let term = params["term"].as_deref().unwrap();
        assert!(!term.contains("<script>"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/users/5?limit=10"), "/users/5");
        assert_eq!(normalize_path("/users/5///"), "/users/5");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }
}
