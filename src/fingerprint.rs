//! Stable request keys used for caching and de-duplication.

use crate::metadata::RequestDescriptor;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// A deterministic key identifying a logical request.
///
/// Rendered as `METHOD path encoding {params}` with the parameters as a
/// JSON object whose keys are sorted at every depth, followed by
/// ` body:<sha256>` when the descriptor carries a binary body. Parameter
/// insertion order never changes the key. Binary
/// bodies are compared by hash, so two different bodies only collide if
/// their SHA-256 digests do.
///
/// # Examples
///
/// ```
/// use stashline::metadata::RequestDescriptor;
///
/// let a = RequestDescriptor::get("/users").with_param("a", 1).with_param("b", 2);
/// let b = RequestDescriptor::get("/users").with_param("b", 2).with_param("a", 1);
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// assert_eq!(a.fingerprint().as_str(), r#"GET /users query {"a":1,"b":2}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a descriptor. Pure, no I/O.
    pub fn of(descriptor: &RequestDescriptor) -> Self {
        let sorted: BTreeMap<&str, Canonical<'_>> = descriptor
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), Canonical::of(v)))
            .collect();
        let params = serde_json::to_string(&sorted).unwrap_or_default();

        let mut key = format!(
            "{} {} {} {}",
            descriptor.method,
            descriptor.path,
            descriptor.encoding.as_str(),
            params
        );
        if let Some(body) = &descriptor.body {
            let digest = Sha256::digest(&body.bytes);
            key.push_str(" body:");
            key.push_str(&hex::encode(digest));
        }
        Fingerprint(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A JSON value with object keys sorted, independent of how the
/// `serde_json` map is ordered.
#[derive(Serialize)]
#[serde(untagged)]
enum Canonical<'a> {
    Object(BTreeMap<&'a str, Canonical<'a>>),
    Array(Vec<Canonical<'a>>),
    Scalar(&'a Value),
}

impl<'a> Canonical<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Canonical::Object(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Canonical::of(v)))
                    .collect(),
            ),
            Value::Array(items) => Canonical::Array(items.iter().map(Canonical::of).collect()),
            scalar => Canonical::Scalar(scalar),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ParameterEncoding;
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_parameter_order_is_irrelevant() {
        let a = RequestDescriptor::get("/items")
            .with_param("a", 1)
            .with_param("b", 2);
        let b = RequestDescriptor::get("/items")
            .with_param("b", 2)
            .with_param("a", 1);
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_nested_parameter_order_is_irrelevant() {
        let a = RequestDescriptor::get("/items").with_param("filter", json!({"x": 1, "y": 2}));
        let b = RequestDescriptor::get("/items").with_param("filter", json!({"y": 2, "x": 1}));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_every_field_changes_the_key() {
        let base = RequestDescriptor::get("/items").with_param("a", 1);

        let other_path = RequestDescriptor::get("/things").with_param("a", 1);
        let other_method = RequestDescriptor::new(Method::DELETE, "/items").with_param("a", 1);
        let other_value = RequestDescriptor::get("/items").with_param("a", 2);
        let other_type = RequestDescriptor::get("/items").with_param("a", "1");

        for other in [other_path, other_method, other_value, other_type] {
            assert_ne!(base.fingerprint(), other.fingerprint());
        }
    }

    #[test]
    fn test_deeply_nested_order_is_irrelevant() {
        let a = RequestDescriptor::get("/items")
            .with_param("q", json!([{"b": {"d": 1, "c": 2}, "a": 0}]));
        let b = RequestDescriptor::get("/items")
            .with_param("q", json!([{"a": 0, "b": {"c": 2, "d": 1}}]));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(
            a.fingerprint().as_str(),
            r#"GET /items query {"q":[{"a":0,"b":{"c":2,"d":1}}]}"#
        );
    }

    #[test]
    fn test_encoding_changes_the_key() {
        let json = RequestDescriptor::post("/search").with_param("q", "rust");
        let form = json.clone().with_encoding(ParameterEncoding::Form);
        let query = json.clone().with_encoding(ParameterEncoding::Query);

        assert_ne!(json.fingerprint(), form.fingerprint());
        assert_ne!(json.fingerprint(), query.fingerprint());
        assert_ne!(form.fingerprint(), query.fingerprint());
    }

    #[test]
    fn test_body_contents_are_hashed() {
        let a = RequestDescriptor::post("/upload").with_body(vec![1u8, 2, 3], "image/png");
        let b = RequestDescriptor::post("/upload").with_body(vec![1u8, 2, 4], "image/png");
        let c = RequestDescriptor::post("/upload").with_body(vec![1u8, 2, 3], "image/png");

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        assert!(a.fingerprint().as_str().contains(" body:"));
    }

    #[test]
    fn test_ambiguous_renderings_do_not_collide() {
        let a = RequestDescriptor::get("/q").with_param("k", "a&b=c");
        let b = RequestDescriptor::get("/q")
            .with_param("k", "a")
            .with_param("b", "c");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
