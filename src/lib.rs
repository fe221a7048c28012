//! # Stashline - A caching, de-duplicating request dispatcher
//!
//! Stashline sits between an app and a backend that wraps every payload in a
//! status envelope (`{"code": 0, "message": "...", "data": ...}`). It
//! combines a response cache, in-flight de-duplication and envelope
//! unwrapping behind one call, and delivers results on a single main
//! context.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stashline::{CachePolicy, Dispatcher, RequestOptions};
//! use stashline::metadata::RequestDescriptor;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Debug, Deserialize)]
//! struct Profile {
//!     id: u64,
//!     nickname: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stashline::Error> {
//!     let dispatcher = Dispatcher::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     // Show the cached profile right away, then refresh it.
//!     let handle = dispatcher.request::<Profile, _, _>(
//!         RequestDescriptor::get("/profile"),
//!         RequestOptions::cached(CachePolicy::ReturnCacheThenFetch),
//!         |response| {
//!             if let Some(profile) = response.model() {
//!                 println!("{} (cached: {})", profile.nickname, response.is_from_cache);
//!             }
//!         },
//!         |error| eprintln!("Could not load profile: {}", error),
//!     );
//!     handle.join().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Cache policies** - Fetch only, cache then fetch (loud or silent), cache else fetch, or cache only
//! - **In-flight de-duplication** - At most one network call per request fingerprint
//! - **Envelope unwrapping** - Configurable keys, success and session-expired codes
//! - **Payload shapes** - Single models, lists, and paged lists with pagination metadata
//! - **Error taxonomy** - Transport, decode, business and session-expired failures in one [`Error`] type
//! - **Pluggable collaborators** - Transport, store, session, feedback sink and main context are traits
//! - **Automatic logging** - Structured logging with `tracing` for observability
//!
//! ## Error Handling
//!
//! Errors reach the `on_error` callback already classified:
//!
//! ```
//! use stashline::{Error, ErrorKind};
//!
//! fn describe(error: &Error) -> String {
//!     match error.kind() {
//!         ErrorKind::Business => format!("Rejected: {}", error.message().unwrap_or_default()),
//!         ErrorKind::SessionExpired => "Please sign in again".to_string(),
//!         ErrorKind::EnvelopeDecode => format!("Bad payload: {}", error.raw_response().unwrap_or_default()),
//!         ErrorKind::Transport | ErrorKind::Local => format!("Failed: {}", error),
//!     }
//! }
//! ```
//!
//! ## Pagination
//!
//! ```
//! use stashline::pagination::{PageTracker, Pagination};
//!
//! let mut tracker = PageTracker::new(1);
//! tracker.apply(Some(&Pagination { page: 1, size: 20, last: 3, total: 55 }));
//! assert_eq!(tracker.page(), 2);
//! assert!(tracker.has_more());
//! ```

pub mod cache;
pub mod context;
pub mod decode;
mod dispatcher;
pub mod envelope;
mod error;
pub mod fingerprint;
pub mod inflight;
pub mod metadata;
pub mod pagination;
pub mod policy;
mod response;
pub mod session;
pub mod store;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherBuilder, RequestHandle};
pub use error::{Error, ErrorKind, Result};
pub use metadata::{RequestDescriptor, RequestOptions};
pub use policy::CachePolicy;
pub use response::Response;
