#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use surge_core::{HttpRequest, HttpResponse, RequestExecutor, TransportError};
use tokio::time::Instant;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Duration,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// In-process executor: answers after a fixed delay and records what it was asked.
pub struct MockExecutor {
    origin: Instant,
    delay: Duration,
    responder: Box<Responder>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl MockExecutor {
    pub fn new<F>(delay: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            origin: Instant::now(),
            delay,
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
        })
    }

    /// Every request gets `200` with an empty JSON object.
    pub fn ok(delay: Duration) -> Arc<Self> {
        Self::new(delay, |_| Ok(json(200, "{}")))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Relaxed)
    }
}

impl RequestExecutor for MockExecutor {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Call {
                at: self.origin.elapsed(),
                url: req.url.clone(),
                headers: req.headers.clone(),
                body: String::from_utf8_lossy(&req.body).into_owned(),
            });

        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let res = (self.responder)(&req);

        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        res
    }
}

pub fn json(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: Bytes::from(body.to_string()),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
    }
}
