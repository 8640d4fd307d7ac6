//! Scripted network double shared by the unit tests of this crate.

use crate::fetch::{FetchRequest, FetchResponse, Network};
use async_trait::async_trait;
use bytes::Bytes;
use offcache_core::Error;
use reqwest::{Method, StatusCode, header};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

type Responder = Box<dyn Fn(&FetchRequest) -> Result<(u16, Vec<u8>), Error> + Send + Sync>;

/// Serves canned responses per URL, records every call, and can go offline.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    responder: Mutex<Option<Responder>>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `status`/`body` for `url` (any method).
    pub fn route(&self, url: &str, status: u16, body: &str) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.as_bytes().to_vec()));
        self
    }

    /// Decide every response with a closure instead of the route table.
    pub fn respond_with(&self, f: impl Fn(&FetchRequest) -> Result<(u16, Vec<u8>), Error> + Send + Sync + 'static) {
        *self.responder.lock().unwrap() = Some(Box::new(f));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every response for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, u)| u == url).count()
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.to_string()));

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }

        let (status, body) = match self.responder.lock().unwrap().as_ref() {
            Some(responder) => responder(request)?,
            None => self
                .routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .unwrap_or((404, b"not found".to_vec())),
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));

        Ok(FetchResponse {
            url: request.url.clone(),
            final_url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            bytes: Bytes::from(body),
            headers,
            fetch_ms: 1,
        })
    }
}
