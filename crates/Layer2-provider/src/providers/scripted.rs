//! Deterministic provider that replays canned responses
//!
//! Used for offline runs and for driving workers in tests without a network.

use crate::{
    error::ProviderError,
    r#trait::{ModelInfo, Provider, ProviderMetadata, ProviderResponse},
    Message,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Replays a fixed script, one response per `complete` call
pub struct ScriptedProvider {
    metadata: ProviderMetadata,
    model_info: ModelInfo,
    script: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    latency: Duration,
    served: Mutex<usize>,
    transcript: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(model: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = model.into();
        Self {
            metadata: ProviderMetadata {
                id: "scripted".to_string(),
                display_name: "Scripted".to_string(),
                default_model: model.clone(),
                base_url: None,
            },
            model_info: ModelInfo::new(model, "scripted"),
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            latency: Duration::ZERO,
            served: Mutex::new(0),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Response returned once the script runs dry
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Simulated per-call latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of responses served so far
    pub fn calls(&self) -> usize {
        *self.served.lock()
    }

    /// Messages received by each call, oldest first
    pub fn transcript(&self) -> Vec<Vec<Message>> {
        self.transcript.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn model(&self) -> &ModelInfo {
        &self.model_info
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        _system_prompt: Option<String>,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.transcript.lock().push(messages);

        let next = self.script.lock().pop_front();
        let mut served = self.served.lock();
        let content = match next.or_else(|| self.fallback.clone()) {
            Some(content) => content,
            None => return Err(ProviderError::ScriptExhausted(*served)),
        };
        *served += 1;

        Ok(ProviderResponse::text(content, &self.model_info.id))
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_exhausts() {
        let p = ScriptedProvider::new("m", ["one", "two"]);

        let a = p.complete(vec![Message::user("x")], None).await.unwrap();
        let b = p.complete(vec![Message::user("y")], None).await.unwrap();
        assert_eq!(a.content, "one");
        assert_eq!(b.content, "two");

        let err = p.complete(vec![], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::ScriptExhausted(2)));
        assert_eq!(p.transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_fallback_repeats() {
        let p = ScriptedProvider::new("m", Vec::<String>::new()).with_fallback("again");
        for _ in 0..3 {
            let r = p.complete(vec![], None).await.unwrap();
            assert_eq!(r.content, "again");
        }
        assert_eq!(p.calls(), 3);
    }
}
