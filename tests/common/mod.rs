//! Shared helpers for the integration tests
//!
//! `ScriptedTransport` stands in for the network: it records every request,
//! answers from a queue of scripted steps (falling back to a JSON body that
//! echoes the URL and call number), and can hold responses until released.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use fetch_cache::app::{
    FetchCache, FetchCacheConfig, InvalidationBus, SchedulerKind, Transport, TransportResponse,
};
use fetch_cache::errors::{FetchError, FetchResult};

/// What the transport answers for one call
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Body(String),
    Network(String),
}

#[derive(Debug, Clone)]
struct Step {
    delay: Duration,
    reply: Reply,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Step>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for the next unscripted call
    pub fn then(&self, reply: Reply) -> &Self {
        self.then_after(Duration::ZERO, reply)
    }

    /// Queue a reply delivered after a delay
    pub fn then_after(&self, delay: Duration, reply: Reply) -> &Self {
        self.script.lock().unwrap().push_back(Step { delay, reply });
        self
    }

    /// Hold every response until [`release`](Self::release)
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held and future responses through
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult<TransportResponse>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.urls.lock().unwrap().push(url.to_string());

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step {
            delay: Duration::ZERO,
            reply: Reply::Json(json!({"url": url, "call": call})),
        });
        let gate = self.gate.lock().unwrap().clone();

        async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await;
            }
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            match step.reply {
                Reply::Json(value) => Ok(TransportResponse::new(200, value.to_string())),
                Reply::Status(status) => Ok(TransportResponse::new(status, "error")),
                Reply::Body(body) => Ok(TransportResponse::new(200, body)),
                Reply::Network(message) => Err(FetchError::network(message)),
            }
        }
        .boxed()
    }
}

/// Service with the default policy and the given scheduler
pub fn service_with(transport: &Arc<ScriptedTransport>, scheduler: SchedulerKind) -> Arc<FetchCache> {
    let config = FetchCacheConfig::default().with_scheduler(scheduler);
    FetchCache::with_parts(
        config,
        "https://api.example.com",
        transport.clone(),
        scheduler.build(config.idle_timeout),
        Arc::new(InvalidationBus::new()),
    )
}

pub fn service(transport: &Arc<ScriptedTransport>) -> Arc<FetchCache> {
    service_with(transport, SchedulerKind::Immediate)
}

/// Let spawned tasks and timers run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
