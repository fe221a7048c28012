//! Payload decoding.
//!
//! A [`Decoder`] turns one JSON value from the envelope's `data` into a
//! model. The dispatcher applies it to a single object, or to every element
//! of a list.
//!
//! Date fields opt into the decoder's [`DateStrategy`] with
//! `#[serde(with = "stashline::decode::date")]` (or
//! [`date::option`] for optional dates). Other fields, strings included,
//! are never touched by the strategy.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::marker::PhantomData;

/// Decodes one payload value into `T`.
pub trait Decoder<T>: Send + Sync {
    /// Decodes `value`, returning a human-readable reason on failure.
    fn decode(&self, value: Value) -> std::result::Result<T, String>;
}

/// How date fields in a payload are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DateStrategy {
    /// Dates are RFC 3339.
    #[default]
    Rfc3339,
    /// Dates use this `chrono` format string, interpreted as UTC. RFC 3339
    /// is still accepted for values that do not match it.
    Format(String),
}

thread_local! {
    static DATE_FORMAT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Installs a date format for the current thread until dropped.
struct FormatScope {
    previous: Option<String>,
}

impl FormatScope {
    fn enter(dates: &DateStrategy) -> Self {
        let format = match dates {
            DateStrategy::Rfc3339 => None,
            DateStrategy::Format(format) => Some(format.clone()),
        };
        let previous = DATE_FORMAT.with(|cell| cell.replace(format));
        Self { previous }
    }
}

impl Drop for FormatScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        DATE_FORMAT.with(|cell| *cell.borrow_mut() = previous);
    }
}

fn parse_date(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    let format = DATE_FORMAT.with(|cell| cell.borrow().clone());
    if let Some(format) = format {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, &format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| format!("invalid date {:?}: {}", text, e))
}

/// Serde helpers for `DateTime<Utc>` fields that follow the decoder's
/// [`DateStrategy`]. Serializes as RFC 3339.
pub mod date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Deserializes a date with the active [`DateStrategy`](super::DateStrategy).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_date(&text).map_err(serde::de::Error::custom)
    }

    /// Serializes a date as RFC 3339.
    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    /// The same for `Option<DateTime<Utc>>`. Pair with `#[serde(default)]`
    /// when the field may be missing.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|text| super::super::parse_date(&text))
                .transpose()
                .map_err(serde::de::Error::custom)
        }

        pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(date) => serializer.serialize_some(&date.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Serde-based decoder with a configurable date strategy.
///
/// # Examples
///
/// ```
/// use stashline::decode::{DateStrategy, Decoder, JsonDecoder};
/// use chrono::{DateTime, Utc};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Post {
///     title: String,
///     #[serde(with = "stashline::decode::date")]
///     published_at: DateTime<Utc>,
/// }
///
/// let decoder = JsonDecoder::with_dates(DateStrategy::Format("%Y-%m-%d %H:%M:%S".into()));
/// let post: Post = decoder
///     .decode(serde_json::json!({"title": "Hi", "published_at": "2024-05-01 08:30:00"}))
///     .unwrap();
/// assert_eq!(post.published_at.to_rfc3339(), "2024-05-01T08:30:00+00:00");
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    dates: DateStrategy,
}

impl JsonDecoder {
    /// A decoder with RFC 3339 dates.
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder with the given date strategy.
    pub fn with_dates(dates: DateStrategy) -> Self {
        Self { dates }
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder {
    fn decode(&self, value: Value) -> std::result::Result<T, String> {
        let _scope = FormatScope::enter(&self.dates);
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// A decoder backed by a closure.
pub struct FnDecoder<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Decoder<T> for FnDecoder<T, F>
where
    F: Fn(Value) -> std::result::Result<T, String> + Send + Sync,
{
    fn decode(&self, value: Value) -> std::result::Result<T, String> {
        (self.f)(value)
    }
}

/// Wraps a closure as a [`Decoder`].
///
/// ```
/// use stashline::decode::{decode_fn, Decoder};
///
/// let ids = decode_fn(|v| v["id"].as_u64().ok_or_else(|| "missing id".to_string()));
/// assert_eq!(ids.decode(serde_json::json!({"id": 7})), Ok(7));
/// ```
pub fn decode_fn<T, F>(f: F) -> FnDecoder<T, F>
where
    F: Fn(Value) -> std::result::Result<T, String> + Send + Sync,
{
    FnDecoder {
        f,
        _marker: PhantomData,
    }
}
