// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Query string and request body parsing shared by every adapter.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A query or form value: a single string, or a list for repeated keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// Key appeared once without a list suffix.
    Single(String),
    /// Key was repeated or used a `key[]` / `key[n]` suffix.
    List(Vec<String>),
}

impl QueryValue {
    /// Returns the first value.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(v) => Some(v.as_str()),
            QueryValue::List(values) => values.first().map(String::as_str),
        }
    }

    /// Returns all values in order of appearance.
    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(v) => vec![v.as_str()],
            QueryValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = QueryValue::List(vec![first, value]);
            }
            QueryValue::List(values) => values.push(value),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

/// Parsed query parameters, sorted by key.
pub type Query = BTreeMap<String, QueryValue>;

/// A parsed request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/json`
    Json(JsonValue),
    /// `application/x-www-form-urlencoded`
    Form(Query),
    /// Anything else, passed through untouched
    Raw(Bytes),
}

impl RequestBody {
    /// Returns the JSON value for JSON bodies.
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the form fields for form bodies.
    pub fn as_form(&self) -> Option<&Query> {
        match self {
            RequestBody::Form(form) => Some(form),
            _ => None,
        }
    }

    /// Returns the raw bytes for passthrough bodies.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RequestBody::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Parses a query string (without the leading `?`).
///
/// - `a=1&b=2` → two single values
/// - `a=1&a=2` → `a` becomes a list
/// - `tags[]=x` / `tags[0]=x` → `tags` is a list even with one entry
pub fn parse_query(query: &str) -> Query {
    parse_pairs(query.as_bytes())
}

fn parse_pairs(bytes: &[u8]) -> Query {
    let mut query = Query::new();

    for (key, value) in form_urlencoded::parse(bytes) {
        let (name, forced_list) = split_list_suffix(&key);
        if name.is_empty() {
            continue;
        }

        match query.get_mut(name) {
            Some(existing) => existing.push(value.into_owned()),
            None => {
                let entry = if forced_list {
                    QueryValue::List(vec![value.into_owned()])
                } else {
                    QueryValue::Single(value.into_owned())
                };
                query.insert(name.to_string(), entry);
            }
        }
    }

    query
}

/// Splits `key[]` and `key[3]` into (`key`, true).
fn split_list_suffix(key: &str) -> (&str, bool) {
    if let Some(name) = key.strip_suffix("[]") {
        return (name, true);
    }

    if let Some(open) = key.rfind('[') {
        let inner = &key[open + 1..];
        if let Some(index) = inner.strip_suffix(']') {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                return (&key[..open], true);
            }
        }
    }

    (key, false)
}

/// Parses a request body according to its declared content type.
///
/// Returns `None` for empty bodies. Malformed JSON degrades to a raw body.
pub fn parse_request_body(body: Bytes, content_type: Option<&str>) -> Option<RequestBody> {
    if body.is_empty() {
        return None;
    }

    let content_type = content_type.unwrap_or("").to_ascii_lowercase();

    if content_type.contains("application/json") || content_type.contains("+json") {
        return match serde_json::from_slice(&body) {
            Ok(value) => Some(RequestBody::Json(value)),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed JSON body, passing through raw");
                Some(RequestBody::Raw(body))
            }
        };
    }

    if content_type.contains("application/x-www-form-urlencoded") {
        return Some(RequestBody::Form(parse_pairs(&body)));
    }

    Some(RequestBody::Raw(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_single() {
        let query = parse_query("active=true&page=2");
        assert_eq!(query.get("active"), Some(&QueryValue::from("true")));
        assert_eq!(query.get("page"), Some(&QueryValue::from("2")));
    }

    #[test]
    fn test_parse_query_repeated_key() {
        let query = parse_query("tag=a&tag=b&tag=c");
        assert_eq!(
            query.get("tag"),
            Some(&QueryValue::List(vec!["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn test_parse_query_list_suffix() {
        let query = parse_query("ids[]=1&names[0]=x&names[1]=y");
        assert_eq!(query.get("ids"), Some(&QueryValue::List(vec!["1".into()])));
        assert_eq!(
            query.get("names"),
            Some(&QueryValue::List(vec!["x".into(), "y".into()]))
        );
        assert!(!query.contains_key("ids[]"));
    }

    #[test]
    fn test_parse_query_decodes() {
        let query = parse_query("q=hello+world&email=john%40example.com&flag");
        assert_eq!(query["q"].first(), Some("hello world"));
        assert_eq!(query["email"].first(), Some("john@example.com"));
        assert_eq!(query["flag"].first(), Some(""));
    }

    #[test]
    fn test_split_list_suffix() {
        assert_eq!(split_list_suffix("a[]"), ("a", true));
        assert_eq!(split_list_suffix("a[12]"), ("a", true));
        assert_eq!(split_list_suffix("a[x]"), ("a[x]", false));
        assert_eq!(split_list_suffix("a"), ("a", false));
    }

    #[test]
    fn test_parse_json_body() {
        let body = parse_request_body(
            Bytes::from_static(br#"{"name": "John", "age": 30}"#),
            Some("application/json; charset=utf-8"),
        )
        .unwrap();
        let json = body.as_json().unwrap();
        assert_eq!(json["name"], "John");
        assert_eq!(json["age"], 30);
    }

    #[test]
    fn test_parse_malformed_json_is_raw() {
        let body = parse_request_body(Bytes::from_static(b"{nope"), Some("application/json")).unwrap();
        assert_eq!(body.as_bytes().map(|b| &b[..]), Some(&b"{nope"[..]));
    }

    #[test]
    fn test_parse_form_body() {
        let body = parse_request_body(
            Bytes::from_static(b"name=John&email=john%40example.com"),
            Some("application/x-www-form-urlencoded"),
        )
        .unwrap();
        let form = body.as_form().unwrap();
        assert_eq!(form["name"].first(), Some("John"));
        assert_eq!(form["email"].first(), Some("john@example.com"));
    }

    #[test]
    fn test_parse_other_body_is_raw() {
        let body = parse_request_body(Bytes::from_static(b"plain"), Some("text/plain")).unwrap();
        assert!(matches!(body, RequestBody::Raw(_)));
        assert!(parse_request_body(Bytes::new(), Some("application/json")).is_none());
    }

    #[test]
    fn test_query_value_serializes_untagged() {
        let query = parse_query("a=1&b=2&b=3");
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, serde_json::json!({"a": "1", "b": ["2", "3"]}));
    }
}
