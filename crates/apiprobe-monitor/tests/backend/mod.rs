//! Scripted HTTP backend for integration tests.
//!
//! Binds `127.0.0.1:0`, answers from a queue of scripted replies and falls
//! back to a fixed reply once the queue is empty. Every request is counted
//! and recorded before it is answered.
//!
//! `apiprobe-client/tests/backend/mod.rs` and
//! `apiprobe-monitor/tests/backend/mod.rs` are the same file; change both.

#![allow(dead_code)]

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            body: value.to_string(),
            content_type: "application/json",
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            content_type: "text/plain",
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    hits: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
}

pub struct TestBackend {
    addr: String,
    shared: Arc<Shared>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestBackend {
    /// Starts a backend answering `200 {"status":"ok"}` to everything.
    pub async fn start() -> Self {
        Self::with_fallback(Reply::json(200, serde_json::json!({"status": "ok"}))).await
    }

    pub async fn with_fallback(fallback: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shared = Arc::new(Shared::default());
        *shared.fallback.lock().unwrap() = Some(fallback);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        let server_shared = Arc::clone(&shared);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let shared = Arc::clone(&server_shared);

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let shared = Arc::clone(&shared);
                                        async move { Self::handle(shared, req).await }
                                    });

                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        eprintln!("Server error: {}", err);
                                    }
                                });
                            }
                            Err(err) => {
                                eprintln!("Accept error: {}", err);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    async fn handle(
        shared: Arc<Shared>,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        shared.hits.fetch_add(1, Ordering::SeqCst);

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let headers = req
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = req.into_body().collect().await?.to_bytes().to_vec();

        shared.requests.lock().unwrap().push(RecordedRequest {
            method,
            path,
            headers,
            body,
        });

        let reply = {
            let scripted = shared.script.lock().unwrap().pop_front();
            match scripted {
                Some(reply) => reply,
                None => shared.fallback.lock().unwrap().clone().unwrap(),
            }
        };

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        Ok(Response::builder()
            .status(StatusCode::from_u16(reply.status).unwrap())
            .header("Content-Type", reply.content_type)
            .body(Full::new(Bytes::from(reply.body)))
            .unwrap())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queues replies served before the fallback.
    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.shared.script.lock().unwrap().extend(replies);
    }

    pub fn set_fallback(&self, reply: Reply) {
        *self.shared.fallback.lock().unwrap() = Some(reply);
    }

    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("no request received")
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Returns a loopback URL nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
