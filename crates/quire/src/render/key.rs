// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Cache keys for rendered pages.

use std::fmt;

use crate::body::Query;
use crate::context::Context;

/// Identity of a rendered page: path, route params and query.
///
/// Params and query are sorted independently, so the order they arrive in
/// never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    params: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl CacheKey {
    /// Builds a key. Query pairs with the same name keep their relative order.
    pub fn new<P, Q, K1, V1, K2, V2>(path: impl Into<String>, params: P, query: Q) -> Self
    where
        P: IntoIterator<Item = (K1, V1)>,
        Q: IntoIterator<Item = (K2, V2)>,
        K1: Into<String>,
        V1: Into<String>,
        K2: Into<String>,
        V2: Into<String>,
    {
        let mut params: Vec<(String, String)> = params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        params.sort();

        let mut query: Vec<(String, String)> = query.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        query.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            path: path.into(),
            params,
            query,
        }
    }

    /// Builds the key for a matched request.
    pub fn from_context(ctx: &Context) -> Self {
        Self::new(ctx.path.clone(), ctx.params.clone(), flatten_query(&ctx.query))
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sorted route params.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Sorted query pairs.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Canonical `a=1&b=2` form of the query, empty when there is none.
    pub fn query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.query {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query_string())
        }
    }
}

fn flatten_query(query: &Query) -> Vec<(String, String)> {
    query
        .iter()
        .flat_map(|(k, v)| v.values().into_iter().map(move |value| (k.clone(), value.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_input_order() {
        let a = CacheKey::new("/blog/x", [("year", "2024"), ("slug", "x")], [("page", "2"), ("sort", "asc")]);
        let b = CacheKey::new("/blog/x", [("slug", "x"), ("year", "2024")], [("sort", "asc"), ("page", "2")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "/blog/x?page=2&sort=asc");
    }

    #[test]
    fn test_key_distinguishes_values() {
        let a = CacheKey::new("/p", Vec::<(String, String)>::new(), [("page", "1")]);
        let b = CacheKey::new("/p", Vec::<(String, String)>::new(), [("page", "2")]);
        let c = CacheKey::new("/p", Vec::<(String, String)>::new(), Vec::<(String, String)>::new());
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.query_string(), "");
        assert_eq!(c.to_string(), "/p");
    }

    #[test]
    fn test_key_from_context() {
        let mut ctx = Context::new("GET", "/users/42").with_query_string("tag=b&active=true&tag=a");
        ctx.params.insert("id".into(), "42".into());

        let key = CacheKey::from_context(&ctx);
        assert_eq!(key.params(), &[("id".to_string(), "42".to_string())]);
        assert_eq!(key.query_string(), "active=true&tag=b&tag=a");
    }
}
