// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Route pattern compilation and path matching.
//!
//! Patterns use the familiar `:param` syntax:
//!
//! - `/about` → literal segments, matched case-sensitively
//! - `/users/:id` → a named parameter, exactly one non-empty segment
//! - `/files/*` → a trailing wildcard, the rest of the path under [`WILDCARD_PARAM`]
//!
//! Internally each pattern is translated to matchit syntax (`{id}`, `{*wild}`)
//! and matched by its own single-entry `matchit::Router`, so a compiled pattern
//! is a pure function of its source text.

use std::collections::BTreeMap;

use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::error::{QuireError, Result};

/// Parameter name under which a trailing wildcard is captured.
pub const WILDCARD_PARAM: &str = "wild";

/// Parameters extracted from a matched path, keyed by name.
pub type Params = BTreeMap<String, String>;

/// Segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal segment (e.g., "users")
    Static(String),
    /// Named parameter (e.g., ":id")
    Param(String),
    /// Trailing wildcard (`*`)
    Wildcard,
}

impl Segment {
    fn parse(pattern: &str, raw: &str) -> Result<Self> {
        if raw == "*" {
            return Ok(Segment::Wildcard);
        }

        if let Some(name) = raw.strip_prefix(':') {
            if name.is_empty() {
                return Err(QuireError::invalid_pattern(pattern, "empty parameter name"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(QuireError::invalid_pattern(
                    pattern,
                    format!("parameter name {name:?} may only contain [A-Za-z0-9_]"),
                ));
            }
            return Ok(Segment::Param(name.to_string()));
        }

        Ok(Segment::Static(raw.to_string()))
    }

    /// Convert to matchit pattern syntax.
    fn to_matchit(&self) -> String {
        match self {
            Segment::Static(s) => s.replace('{', "{{").replace('}', "}}"),
            Segment::Param(name) => format!("{{{name}}}"),
            Segment::Wildcard => format!("{{*{WILDCARD_PARAM}}}"),
        }
    }
}

/// A compiled route pattern.
pub struct PathMatcher {
    pattern: String,
    segments: Vec<Segment>,
    router: MatchitRouter<()>,
    /// Pattern without its trailing wildcard (`/files` for `/files/*`).
    wildcard_prefix: Option<Box<PathMatcher>>,
}

impl PathMatcher {
    /// Compiles a pattern such as `/posts/:slug` or `/assets/*`.
    pub fn compile(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(QuireError::invalid_pattern(pattern, "must start with '/'"));
        }

        let trimmed = pattern.trim_start_matches('/');
        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split('/')
                .map(|raw| Segment::parse(pattern, raw))
                .collect::<Result<Vec<_>>>()?
        };

        let mut seen = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Param(name) => {
                    if seen.contains(&name.as_str()) {
                        return Err(QuireError::invalid_pattern(
                            pattern,
                            format!("duplicate parameter {name:?}"),
                        ));
                    }
                    seen.push(name.as_str());
                }
                Segment::Wildcard if index + 1 != segments.len() => {
                    return Err(QuireError::invalid_pattern(pattern, "'*' must be the last segment"));
                }
                Segment::Static(s) if s.is_empty() && index + 1 != segments.len() => {
                    return Err(QuireError::invalid_pattern(pattern, "empty segment"));
                }
                _ => {}
            }
        }

        let matchit_pattern = if segments.is_empty() {
            "/".to_string()
        } else {
            let parts: Vec<String> = segments.iter().map(Segment::to_matchit).collect();
            format!("/{}", parts.join("/"))
        };
        let matchit_pattern = match matchit_pattern.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            _ => matchit_pattern,
        };

        let mut router = MatchitRouter::new();
        router
            .insert(matchit_pattern, ())
            .map_err(|e| QuireError::invalid_pattern(pattern, e.to_string()))?;

        let wildcard_prefix = match segments.last() {
            Some(Segment::Wildcard) => {
                let head: Vec<String> = segments[..segments.len() - 1]
                    .iter()
                    .map(|s| match s {
                        Segment::Static(s) => s.clone(),
                        Segment::Param(name) => format!(":{name}"),
                        Segment::Wildcard => String::new(),
                    })
                    .collect();
                Some(Box::new(PathMatcher::compile(&format!("/{}", head.join("/")))?))
            }
            _ => None,
        };

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            router,
            wildcard_prefix,
        })
    }

    /// Matches a request path, returning the decoded parameters.
    ///
    /// Returns `None` when the pattern does not cover the whole path or when a
    /// parameter does not decode to valid UTF-8.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let path = normalize_path(path);

        if let Some(params) = self.match_empty_wildcard(path) {
            return Some(params);
        }

        let matched = self.router.at(path).ok()?;
        let mut params = Params::new();
        for (name, raw) in matched.params.iter() {
            let value = percent_decode_str(raw).decode_utf8().ok()?;
            params.insert(name.to_string(), value.into_owned());
        }
        Some(params)
    }

    /// `/files/*` also matches `/files` itself with an empty wildcard.
    fn match_empty_wildcard(&self, path: &str) -> Option<Params> {
        let prefix = self.wildcard_prefix.as_deref()?;
        let mut params = prefix.matches(path)?;
        params.insert(WILDCARD_PARAM.to_string(), String::new());
        Some(params)
    }

    /// The source pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Names of the parameters this pattern captures, in order.
    pub fn param_names(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.clone()),
                Segment::Wildcard => Some(WILDCARD_PARAM.to_string()),
                Segment::Static(_) => None,
            })
            .collect()
    }
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("pattern", &self.pattern)
            .field("segments", &self.segments)
            .finish()
    }
}

/// Normalizes a request path: empty becomes `/`, one trailing slash is dropped.
fn normalize_path(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        "/"
    } else {
        path.strip_suffix('/').unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_pattern() {
        let m = PathMatcher::compile("/about").unwrap();
        assert_eq!(m.matches("/about"), Some(Params::new()));
        assert_eq!(m.matches("/about/"), Some(Params::new()));
        assert!(m.matches("/About").is_none());
        assert!(m.matches("/about/team").is_none());
        assert!(m.matches("/").is_none());
        assert!(m.param_names().is_empty());
    }

    #[test]
    fn test_root_pattern() {
        let m = PathMatcher::compile("/").unwrap();
        assert!(m.matches("/").is_some());
        assert!(m.matches("").is_some());
        assert!(m.matches("/index").is_none());
    }

    #[test]
    fn test_named_param() {
        let m = PathMatcher::compile("/users/:id").unwrap();
        let params = m.matches("/users/42").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        assert!(m.matches("/users").is_none());
        assert!(m.matches("/users/").is_none());
        assert!(m.matches("/users/42/posts").is_none());
        assert_eq!(m.param_names(), vec!["id".to_string()]);
    }

    #[test]
    fn test_param_is_decoded() {
        let m = PathMatcher::compile("/tags/:tag").unwrap();
        let params = m.matches("/tags/hello%20world").unwrap();
        assert_eq!(params["tag"], "hello world");

        let params = m.matches("/tags/caf%C3%A9").unwrap();
        assert_eq!(params["tag"], "café");

        // Invalid UTF-8 after decoding never matches
        assert!(m.matches("/tags/%FF").is_none());
    }

    #[test]
    fn test_multiple_params() {
        let m = PathMatcher::compile("/blog/:year/:slug").unwrap();
        let params = m.matches("/blog/2024/hello").unwrap();
        assert_eq!(params["year"], "2024");
        assert_eq!(params["slug"], "hello");
        assert_eq!(m.param_names(), vec!["year".to_string(), "slug".to_string()]);
    }

    #[test]
    fn test_wildcard() {
        let m = PathMatcher::compile("/files/*").unwrap();
        let params = m.matches("/files/a/b/c.txt").unwrap();
        assert_eq!(params[WILDCARD_PARAM], "a/b/c.txt");

        let params = m.matches("/files").unwrap();
        assert_eq!(params[WILDCARD_PARAM], "");

        assert!(m.matches("/filesystem").is_none());
        assert_eq!(m.param_names(), vec![WILDCARD_PARAM.to_string()]);
    }

    #[test]
    fn test_wildcard_after_param() {
        let m = PathMatcher::compile("/repo/:name/*").unwrap();
        let params = m.matches("/repo/quire/src/lib.rs").unwrap();
        assert_eq!(params["name"], "quire");
        assert_eq!(params[WILDCARD_PARAM], "src/lib.rs");

        let params = m.matches("/repo/quire").unwrap();
        assert_eq!(params["name"], "quire");
        assert_eq!(params[WILDCARD_PARAM], "");
    }

    #[test]
    fn test_root_wildcard() {
        let m = PathMatcher::compile("/*").unwrap();
        assert_eq!(m.matches("/anything/here").unwrap()[WILDCARD_PARAM], "anything/here");
        assert_eq!(m.matches("/").unwrap()[WILDCARD_PARAM], "");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathMatcher::compile("users").is_err());
        assert!(PathMatcher::compile("/users/:").is_err());
        assert!(PathMatcher::compile("/files/*/more").is_err());
        assert!(PathMatcher::compile("/a/:id/b/:id").is_err());
        assert!(PathMatcher::compile("/a/:id-x").is_err());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = PathMatcher::compile("/posts/:slug/*").unwrap();
        let b = PathMatcher::compile("/posts/:slug/*").unwrap();
        for path in ["/posts/x", "/posts/x/y/z", "/posts", "/other/x", "/posts/%20/q"] {
            assert_eq!(a.matches(path), b.matches(path), "diverged on {path}");
        }
    }
}
