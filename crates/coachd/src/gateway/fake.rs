//! Fake provider for deterministic testing
//!
//! Scripted replies without any network. Replies are consumed in order; the
//! last one repeats forever. A responder closure can instead compute the
//! reply from the request messages.
//!
//! ## Example
//!
//! ```rust,ignore
//! let fake = FakeProviderBuilder::new("primary")
//!     .reject("HTTP 503")
//!     .text("Tell me about a time you led a project.")
//!     .build();
//! ```

use super::provider::{ProviderAdapter, ProviderError};
use async_trait::async_trait;
use coach_common::ChatMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted provider behavior
#[derive(Debug, Clone)]
pub enum FakeReply {
    Text(String),
    Reject(String),
    /// Sleep, then answer. Used to trigger gateway timeouts.
    Delay(Duration, String),
}

type Responder = dyn Fn(&[ChatMessage]) -> FakeReply + Send + Sync;

pub struct FakeProvider {
    name: String,
    replies: Mutex<VecDeque<FakeReply>>,
    responder: Option<Box<Responder>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeProvider {
    /// Provider that always answers `text`
    pub fn always(name: &str, text: &str) -> Arc<Self> {
        FakeProviderBuilder::new(name).text(text).build()
    }

    /// Provider that always rejects
    pub fn failing(name: &str) -> Arc<Self> {
        FakeProviderBuilder::new(name).reject("simulated outage").build()
    }

    /// Provider whose reply depends on the request
    pub fn with_responder<F>(name: &str, responder: F) -> Arc<Self>
    where
        F: Fn(&[ChatMessage]) -> FakeReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages of the most recent call
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> FakeReply {
        if let Some(responder) = &self.responder {
            return responder(messages);
        }

        let mut replies = match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if replies.len() > 1 {
            replies
                .pop_front()
                .unwrap_or_else(|| FakeReply::Reject("no scripted reply".to_string()))
        } else {
            replies
                .front()
                .cloned()
                .unwrap_or_else(|| FakeReply::Reject("no scripted reply".to_string()))
        }
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }

        match self.next_reply(messages) {
            FakeReply::Text(text) => Ok(text),
            FakeReply::Reject(reason) => Err(ProviderError::rejected(&self.name, reason)),
            FakeReply::Delay(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }
}

/// Builder for scripted fake providers
pub struct FakeProviderBuilder {
    name: String,
    replies: VecDeque<FakeReply>,
}

impl FakeProviderBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: VecDeque::new(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.replies.push_back(FakeReply::Text(text.to_string()));
        self
    }

    pub fn reject(mut self, reason: &str) -> Self {
        self.replies.push_back(FakeReply::Reject(reason.to_string()));
        self
    }

    pub fn delay(mut self, delay: Duration, text: &str) -> Self {
        self.replies
            .push_back(FakeReply::Delay(delay, text.to_string()));
        self
    }

    pub fn build(self) -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            name: self.name,
            replies: Mutex::new(self.replies),
            responder: None,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }
}
