//! Basic example demonstrating cache policies and error feedback.
//!
//! This example shows how to:
//! - Create a dispatcher with a session and a feedback sink
//! - Serve a cached result first and refresh it from the network
//! - Handle business errors and expired sessions
//!
//! The backend is simulated with a local mock server.
//!
//! Run with: `cargo run --example basic_dispatch`

use serde::Deserialize;
use serde_json::json;
use stashline::context::SerialQueue;
use stashline::session::{FeedbackSink, Session};
use stashline::{CachePolicy, Dispatcher, Error, RequestDescriptor, RequestOptions};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Profile {
    id: u64,
    nickname: String,
}

struct AppSession;

impl Session for AppSession {
    fn token(&self) -> Option<String> {
        Some("demo-token".to_string())
    }

    fn on_forced_logout(&self) {
        println!("[session] signed out");
    }
}

struct Console;

impl FeedbackSink for Console {
    fn loading_started(&self) {
        println!("[hud] loading...");
    }

    fn loading_finished(&self) {
        println!("[hud] done");
    }

    fn show_success(&self, message: &str) {
        println!("[toast] {}", message);
    }

    fn show_failure(&self, message: &str) {
        println!("[toast] {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("stashline=debug,basic_dispatch=info")
        .init();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "ok",
            "data": {"id": 42, "nickname": "ferris"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nickname"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1002,
            "message": "Nickname already taken"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wallet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 401})))
        .mount(&server)
        .await;

    let queue = SerialQueue::spawn()?;
    let dispatcher = Dispatcher::builder()
        .base_url(server.uri())?
        .session(Arc::new(AppSession))
        .feedback(Arc::new(Console))
        .main_context(Arc::new(queue.clone()))
        .build()?;

    println!("=== Cache then fetch ===");
    for round in 1..=2 {
        println!("-- round {} --", round);
        dispatcher
            .request::<Profile, _, _>(
                RequestDescriptor::get("/profile"),
                RequestOptions::cached(CachePolicy::ReturnCacheThenFetch),
                |response| {
                    let source = if response.is_from_cache { "cache" } else { "network" };
                    println!("Profile from {}: {:?}", source, response.model());
                },
                |error| eprintln!("Profile failed: {}", error),
            )
            .join()
            .await;
        queue.flush().await;
    }

    println!("\n=== Business error ===");
    dispatcher
        .request::<Profile, _, _>(
            RequestDescriptor::post("/nickname").with_param("nickname", "ferris"),
            RequestOptions::default().with_success_message("Nickname saved"),
            |_| println!("Nickname changed"),
            |error| println!("Rejected with code {:?}", error.code()),
        )
        .join()
        .await;
    queue.flush().await;

    println!("\n=== Expired session ===");
    let result = dispatcher
        .plain(RequestDescriptor::get("/wallet"), RequestOptions::default())
        .await;
    queue.flush().await;
    if let Err(e) = result {
        println!("Plain request failed: {} (logout: {})", e, e.requires_logout());
    }

    Ok(())
}
