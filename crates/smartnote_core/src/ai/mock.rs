//! Deterministic stub backend for tests and offline runs.
//!
//! Replies are served from a FIFO script, then from a fallback reply. An
//! optional delay simulates a slow remote; calls dropped during that delay
//! are counted as cancelled.

use crate::ai::client::{BackendFailure, GenerationBackend, GenerationRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// One scripted backend outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubReply {
    Text(String),
    /// Successful call that carries no text.
    Empty,
    Failure(BackendFailure),
}

/// Scripted `GenerationBackend`.
#[derive(Debug)]
pub struct StubGenerationBackend {
    script: Mutex<VecDeque<StubReply>>,
    fallback: StubReply,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl StubGenerationBackend {
    pub fn new(fallback: StubReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers with `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(StubReply::Text(text.into()))
    }

    /// Always fails with the given status and message.
    pub fn failing(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(StubReply::Failure(BackendFailure::new(status_code, message)))
    }

    /// Waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues `reply` ahead of the fallback.
    pub fn push_reply(&self, reply: StubReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Number of `generate` calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of calls dropped before completion.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self) -> StubReply {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

struct CancelGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl GenerationBackend for StubGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt.clone());

        let mut guard = CancelGuard {
            counter: Arc::clone(&self.cancelled),
            armed: true,
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard.armed = false;
        self.completed.fetch_add(1, Ordering::SeqCst);

        match self.next_reply() {
            StubReply::Text(text) => Ok(Some(text)),
            StubReply::Empty => Ok(None),
            StubReply::Failure(failure) => Err(failure),
        }
    }
}
