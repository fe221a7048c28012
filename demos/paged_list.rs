//! Example demonstrating paged lists with a disk-backed cache.
//!
//! This example shows how to:
//! - Persist the first page of a list across runs with `DiskStore`
//! - Drive load-more with `PageTracker`
//! - Use a closure decoder instead of serde
//!
//! Run with: `cargo run --example paged_list`

use serde_json::json;
use stashline::context::SerialQueue;
use stashline::decode::decode_fn;
use stashline::pagination::PageTracker;
use stashline::store::DiskStore;
use stashline::{CachePolicy, Dispatcher, Error, RequestDescriptor, RequestOptions, Response};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_SIZE: u32 = 2;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("stashline=info,paged_list=info")
        .init();

    let server = MockServer::start().await;
    let titles = ["Ownership", "Borrowing", "Lifetimes", "Traits", "Async"];
    for (index, chunk) in titles.chunks(PAGE_SIZE as usize).enumerate() {
        let page = index + 1;
        let content: Vec<_> = chunk.iter().map(|t| json!({"title": t})).collect();
        Mock::given(method("GET"))
            .and(path("/articles"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "content": content,
                    "pagination": {"page": page, "size": PAGE_SIZE, "last": 3, "total": titles.len()}
                }
            })))
            .mount(&server)
            .await;
    }

    let cache_dir = std::env::temp_dir().join("stashline-paged-list");
    let queue = SerialQueue::spawn()?;
    let dispatcher = Dispatcher::builder()
        .base_url(server.uri())?
        .store(Arc::new(DiskStore::open(&cache_dir)?))
        .main_context(Arc::new(queue.clone()))
        .build()?;

    let titles_decoder = || {
        decode_fn(|value| {
            value["title"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| "missing title".to_string())
        })
    };

    let mut tracker = PageTracker::default();
    while tracker.has_more() {
        let latest: Arc<Mutex<Option<Response<String>>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);

        dispatcher
            .dispatch(
                RequestDescriptor::get("/articles").with_page(tracker.page() as u32, PAGE_SIZE),
                RequestOptions::cached(CachePolicy::ReturnCacheThenFetch).quiet(),
                titles_decoder(),
                move |response: Response<String>| {
                    if response.is_from_cache {
                        println!("(cached) {:?}", response.items());
                    }
                    if let Ok(mut latest) = sink.lock() {
                        *latest = Some(response);
                    }
                },
                |error| eprintln!("Page failed: {}", error),
            )
            .join()
            .await;
        queue.flush().await;

        let response = latest.lock().ok().and_then(|mut latest| latest.take());
        match response {
            Some(response) => {
                println!("Page {}: {:?}", tracker.page(), response.items());
                tracker.apply(response.pagination());
            }
            None => break,
        }
    }

    println!("Cache lives in {}", cache_dir.display());
    Ok(())
}
