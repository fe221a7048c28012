//! Response wrapper handed to success callbacks.
//!
//! The [`Response`] type carries the decoded payload together with the
//! envelope's code and message, the raw body, and whether the result was
//! served from the cache.

use crate::envelope::Payload;
use crate::pagination::Pagination;
use bytes::Bytes;
use http::StatusCode;
use std::time::Duration;

/// A successful, decoded response.
///
/// # Type Parameters
///
/// * `T` - The type of the decoded models
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded payload.
    pub data: Payload<T>,

    /// The envelope code (always the success code).
    pub code: i64,

    /// The envelope message, if any.
    pub message: Option<String>,

    /// The raw response body.
    ///
    /// This is what gets written to the cache.
    pub raw_body: Bytes,

    /// The HTTP status code. `None` for cached results.
    pub status: Option<StatusCode>,

    /// Time spent on the network. `None` for cached results.
    pub latency: Option<Duration>,

    /// Whether this result came from the cache rather than the network.
    pub is_from_cache: bool,
}

impl<T> Response<T> {
    /// Maps every decoded model to a different type, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stashline::{envelope::Payload, Response};
    /// let response = Response {
    ///     data: Payload::List(vec![1, 2]),
    ///     code: 0,
    ///     message: None,
    ///     raw_body: bytes::Bytes::new(),
    ///     status: None,
    ///     latency: None,
    ///     is_from_cache: true,
    /// };
    ///
    /// let strings = response.map(|n| n.to_string());
    /// assert_eq!(strings.items(), &["1".to_string(), "2".to_string()]);
    /// ```
    pub fn map<U, F>(self, mut f: F) -> Response<U>
    where
        F: FnMut(T) -> U,
    {
        let data = match self.data {
            Payload::Empty => Payload::Empty,
            Payload::Single(model) => Payload::Single(f(model)),
            Payload::List(items) => Payload::List(items.into_iter().map(&mut f).collect()),
            Payload::Page { items, pagination } => Payload::Page {
                items: items.into_iter().map(&mut f).collect(),
                pagination,
            },
        };
        Response {
            data,
            code: self.code,
            message: self.message,
            raw_body: self.raw_body,
            status: self.status,
            latency: self.latency,
            is_from_cache: self.is_from_cache,
        }
    }

    /// The single decoded model, if the payload was an object.
    pub fn model(&self) -> Option<&T> {
        self.data.single()
    }

    /// The decoded items of a list or page payload.
    pub fn items(&self) -> &[T] {
        self.data.items()
    }

    /// The pagination of a page payload.
    pub fn pagination(&self) -> Option<&Pagination> {
        self.data.pagination()
    }

    /// The raw body as text, lossily decoded.
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_body).into_owned()
    }
}

impl<T> AsRef<Payload<T>> for Response<T> {
    fn as_ref(&self) -> &Payload<T> {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = Payload<T>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
