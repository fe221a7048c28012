//! The status envelope wrapping every response body.
//!
//! A typical body looks like
//!
//! ```json
//! {"code": 0, "message": "ok", "data": {"pagination": {...}, "content": [...]}}
//! ```
//!
//! [`Envelope::parse`] reads the wrapper, [`Envelope::check`] turns a
//! non-success code into an error, and [`Envelope::decode`] decodes the
//! payload into a [`Payload`].

use crate::decode::Decoder;
use crate::pagination::Pagination;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope key names and sentinel codes.
///
/// Deserializable so apps can ship it alongside other settings; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Key of the status code.
    pub code_key: String,
    /// Key of the message.
    pub message_key: String,
    /// Key of the payload.
    pub data_key: String,
    /// Key of the item array inside a paged payload.
    pub content_key: String,
    /// Key of the pagination object inside a paged payload.
    pub pagination_key: String,
    /// The code meaning success.
    pub success_code: i64,
    /// The code meaning the session has expired.
    pub session_expired_code: i64,
    /// The code assumed when the envelope has no integer code.
    pub missing_code: i64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            code_key: "code".to_string(),
            message_key: "message".to_string(),
            data_key: "data".to_string(),
            content_key: "content".to_string(),
            pagination_key: "pagination".to_string(),
            success_code: 0,
            session_expired_code: 401,
            missing_code: -1,
        }
    }
}

/// A parsed response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The status code.
    pub code: i64,
    /// The message, if any.
    pub message: Option<String>,
    /// The payload, if any.
    pub data: Option<Value>,
}

/// The decoded payload of a successful envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// `data` was absent or `null`.
    Empty,
    /// `data` was a single object.
    Single(T),
    /// `data` was an array.
    List(Vec<T>),
    /// `data` was an object holding an item array and pagination.
    Page {
        /// The decoded items.
        items: Vec<T>,
        /// The page metadata.
        pagination: Pagination,
    },
}

impl<T> Payload<T> {
    /// The single model, if this is a single-object payload.
    pub fn single(&self) -> Option<&T> {
        match self {
            Payload::Single(model) => Some(model),
            _ => None,
        }
    }

    /// The items of a list or page payload.
    pub fn items(&self) -> &[T] {
        match self {
            Payload::List(items) | Payload::Page { items, .. } => items,
            _ => &[],
        }
    }

    /// The pagination of a page payload.
    pub fn pagination(&self) -> Option<&Pagination> {
        match self {
            Payload::Page { pagination, .. } => Some(pagination),
            _ => None,
        }
    }

    /// Consumes the payload, returning the single model.
    pub fn into_single(self) -> Option<T> {
        match self {
            Payload::Single(model) => Some(model),
            _ => None,
        }
    }

    /// Consumes the payload, returning all items.
    pub fn into_items(self) -> Vec<T> {
        match self {
            Payload::Single(model) => vec![model],
            Payload::List(items) | Payload::Page { items, .. } => items,
            Payload::Empty => Vec::new(),
        }
    }
}

impl Envelope {
    /// Parses the envelope from a raw body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvelopeDecode`] if the body is not a JSON object.
    pub fn parse(body: &[u8], config: &EnvelopeConfig) -> Result<Self> {
        let json: Value = serde_json::from_slice(body).map_err(|e| decode_error(body, e))?;
        let Value::Object(mut map) = json else {
            return Err(decode_error(body, "envelope is not a JSON object"));
        };

        let code = map
            .get(&config.code_key)
            .and_then(Value::as_i64)
            .unwrap_or(config.missing_code);
        let message = match map.remove(&config.message_key) {
            Some(Value::String(message)) => Some(message),
            _ => None,
        };
        let data = map.remove(&config.data_key).filter(|v| !v.is_null());

        Ok(Self {
            code,
            message,
            data,
        })
    }

    /// Fails with a business error unless the code is the success code.
    ///
    /// # Examples
    ///
    /// ```
    /// use stashline::envelope::{Envelope, EnvelopeConfig};
    /// use stashline::Error;
    ///
    /// let config = EnvelopeConfig::default();
    /// let envelope = Envelope::parse(br#"{"code":401,"message":"Please sign in"}"#, &config).unwrap();
    /// assert!(matches!(envelope.check(&config), Err(Error::SessionExpired { code: 401, .. })));
    /// ```
    pub fn check(self, config: &EnvelopeConfig) -> Result<Self> {
        if self.code == config.success_code {
            Ok(self)
        } else if self.code == config.session_expired_code {
            Err(Error::SessionExpired {
                code: self.code,
                message: self.message,
            })
        } else {
            Err(Error::Business {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Decodes the payload with `decoder`, detecting its shape.
    ///
    /// `raw` is the body the envelope came from; it is attached to decode
    /// errors.
    pub fn decode<T, D>(self, decoder: &D, config: &EnvelopeConfig, raw: &[u8]) -> Result<Payload<T>>
    where
        D: Decoder<T> + ?Sized,
    {
        let decode_all = |items: Vec<Value>| -> Result<Vec<T>> {
            items
                .into_iter()
                .map(|item| decoder.decode(item).map_err(|e| decode_error(raw, e)))
                .collect()
        };

        match self.data {
            None => Ok(Payload::Empty),
            Some(Value::Array(items)) => Ok(Payload::List(decode_all(items)?)),
            Some(Value::Object(map)) if is_page(&map, config) => {
                let (items, pagination) = split_page(map, config, raw)?;
                Ok(Payload::Page {
                    items: decode_all(items)?,
                    pagination,
                })
            }
            Some(value) => decoder
                .decode(value)
                .map(Payload::Single)
                .map_err(|e| decode_error(raw, e)),
        }
    }
}

fn is_page(map: &Map<String, Value>, config: &EnvelopeConfig) -> bool {
    matches!(map.get(&config.content_key), Some(Value::Array(_)))
}

fn split_page(
    mut map: Map<String, Value>,
    config: &EnvelopeConfig,
    raw: &[u8],
) -> Result<(Vec<Value>, Pagination)> {
    let items = match map.remove(&config.content_key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let pagination = map
        .remove(&config.pagination_key)
        .ok_or_else(|| decode_error(raw, "paged payload has no pagination"))?;
    let pagination = serde_json::from_value(pagination).map_err(|e| decode_error(raw, e))?;
    Ok((items, pagination))
}

fn decode_error(raw: &[u8], reason: impl ToString) -> Error {
    Error::EnvelopeDecode {
        raw_response: String::from_utf8_lossy(raw).into_owned(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::JsonDecoder;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn decode(body: &str) -> Result<Payload<Item>> {
        let config = EnvelopeConfig::default();
        Envelope::parse(body.as_bytes(), &config)?
            .check(&config)?
            .decode(&JsonDecoder::new(), &config, body.as_bytes())
    }

    #[test]
    fn test_single_object() {
        let payload = decode(r#"{"code":0,"data":{"id":1}}"#).unwrap();
        assert_eq!(payload, Payload::Single(Item { id: 1 }));
    }

    #[test]
    fn test_plain_list() {
        let payload = decode(r#"{"code":0,"data":[{"id":1},{"id":2}]}"#).unwrap();
        assert_eq!(payload.items(), &[Item { id: 1 }, Item { id: 2 }]);
        assert!(payload.pagination().is_none());
    }

    #[test]
    fn test_paged_list() {
        let payload = decode(
            r#"{"code":0,"data":{"pagination":{"page":1,"size":2,"last":3,"total":5},"content":[{"id":1},{"id":2}]}}"#,
        )
        .unwrap();
        assert_eq!(payload.items().len(), 2);
        assert_eq!(payload.pagination().map(|p| p.last), Some(3));
    }

    #[test]
    fn test_paged_list_without_pagination_is_decode_error() {
        let err = decode(r#"{"code":0,"data":{"content":[]}}"#).unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode { .. }));
    }

    #[test]
    fn test_null_data_is_empty() {
        assert_eq!(decode(r#"{"code":0,"data":null}"#).unwrap(), Payload::Empty);
        assert_eq!(decode(r#"{"code":0}"#).unwrap(), Payload::Empty);
    }

    #[test]
    fn test_business_error_keeps_message() {
        let err = decode(r#"{"code":1001,"message":"Sold out"}"#).unwrap_err();
        assert_eq!(err.code(), Some(1001));
        assert_eq!(err.message(), Some("Sold out"));
    }

    #[test]
    fn test_missing_code_is_failure() {
        let err = decode(r#"{"data":{"id":1}}"#).unwrap_err();
        assert_eq!(err.code(), Some(-1));
    }

    #[test]
    fn test_non_object_body_is_decode_error() {
        let err = decode("[1,2,3]").unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode { .. }));
        let err = decode("<html>").unwrap_err();
        assert_eq!(err.raw_response(), Some("<html>"));
    }

    #[test]
    fn test_payload_decode_error() {
        let err = decode(r#"{"code":0,"data":{"id":"one"}}"#).unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode { .. }));
    }

    #[test]
    fn test_custom_keys() {
        let config = EnvelopeConfig {
            code_key: "status".to_string(),
            data_key: "result".to_string(),
            success_code: 200,
            ..Default::default()
        };
        let body = br#"{"status":200,"result":{"id":9}}"#;
        let payload: Payload<Item> = Envelope::parse(body, &config)
            .and_then(|e| e.check(&config))
            .and_then(|e| e.decode(&JsonDecoder::new(), &config, body))
            .unwrap();
        assert_eq!(payload.into_single(), Some(Item { id: 9 }));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EnvelopeConfig = serde_json::from_str(r#"{"success_code":200}"#).unwrap();
        assert_eq!(config.success_code, 200);
        assert_eq!(config.code_key, "code");
        assert_eq!(config.session_expired_code, 401);
    }
}
