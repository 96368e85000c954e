//! Detached completion of deferred interactions.
//!
//! The HTTP handler answers with a deferred acknowledgment and hands the
//! command work to [`DeferredResponder::spawn`]. The spawned task holds
//! until the acknowledgment gate opens, runs the work, then edits the
//! original response exactly once (with bounded retries on transient
//! failures).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::FollowUpRetryConfig;
use crate::discord::DiscordApi;
use crate::discord::types::truncate_message;
use crate::error::DiscordError;

#[derive(Clone)]
pub struct DeferredResponder {
    api: Arc<dyn DiscordApi>,
    retry: FollowUpRetryConfig,
}

impl DeferredResponder {
    pub fn new(api: Arc<dyn DiscordApi>, retry: FollowUpRetryConfig) -> Self {
        Self { api, retry }
    }

    /// Run `work` once `ack` fires and deliver its text as the follow-up.
    ///
    /// If the gate's sender is dropped without firing, the acknowledgment
    /// never went out and the work is abandoned.
    pub fn spawn<F>(
        &self,
        interaction_id: String,
        interaction_token: String,
        ack: oneshot::Receiver<()>,
        work: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = String> + Send + 'static,
    {
        let responder = self.clone();
        tokio::spawn(async move {
            if ack.await.is_err() {
                tracing::warn!(%interaction_id, "Acknowledgment not sent, dropping deferred work");
                return;
            }

            let text = work.await;
            match responder.deliver(&interaction_token, &text).await {
                Ok(()) => tracing::debug!(%interaction_id, "Follow-up delivered"),
                Err(e) => {
                    tracing::error!(%interaction_id, error = %e, "Follow-up delivery failed")
                }
            }
        })
    }

    /// Edit the original response, retrying transient failures with
    /// exponential backoff.
    pub async fn deliver(&self, interaction_token: &str, text: &str) -> Result<(), DiscordError> {
        let content = truncate_message(text);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0u32;

        loop {
            let err = match self
                .api
                .edit_original_response(interaction_token, &content)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.retry.max_retries {
                return Err(err);
            }
            attempt += 1;

            let wait = match &err {
                DiscordError::RateLimited {
                    retry_after: Some(after),
                    ..
                } => (*after).max(backoff),
                _ => backoff,
            };
            tracing::warn!(
                attempt,
                max_retries = self.retry.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Follow-up failed, retrying"
            );
            tokio::time::sleep(wait).await;
            backoff = backoff.saturating_mul(2).min(Duration::from_secs(30));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::discord::IdentityLookup;
    use crate::discord::commands::CommandDefinition;

    /// Discord double that replays scripted edit outcomes, then succeeds.
    #[derive(Default)]
    struct ScriptedDiscord {
        outcomes: Mutex<VecDeque<Result<(), DiscordError>>>,
        edits: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedDiscord {
        fn with(outcomes: Vec<Result<(), DiscordError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                edits: Mutex::default(),
            })
        }

        fn attempts(&self) -> usize {
            self.edits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdentityLookup for ScriptedDiscord {
        async fn display_name(&self, _credential: &SecretString) -> Result<String, DiscordError> {
            Ok("CreditBot".to_string())
        }
    }

    #[async_trait]
    impl DiscordApi for ScriptedDiscord {
        async fn edit_original_response(
            &self,
            interaction_token: &str,
            content: &str,
        ) -> Result<(), DiscordError> {
            self.edits
                .lock()
                .unwrap()
                .push((interaction_token.to_string(), content.to_string()));
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn register_commands(
            &self,
            commands: &[CommandDefinition],
        ) -> Result<usize, DiscordError> {
            Ok(commands.len())
        }
    }

    fn status(code: u16) -> DiscordError {
        DiscordError::Status {
            operation: "edit_original_response".to_string(),
            status: code,
            body: String::new(),
        }
    }

    fn responder(api: Arc<ScriptedDiscord>, max_retries: u32) -> DeferredResponder {
        DeferredResponder::new(
            api,
            FollowUpRetryConfig {
                max_retries,
                initial_backoff: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let api = ScriptedDiscord::with(vec![Err(status(502)), Err(status(503))]);
        responder(api.clone(), 2).deliver("tok", "done").await.unwrap();
        assert_eq!(api.attempts(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_bound() {
        let api = ScriptedDiscord::with(vec![Err(status(500)), Err(status(500)), Err(status(500))]);
        let err = responder(api.clone(), 2)
            .deliver("tok", "done")
            .await
            .unwrap_err();
        assert!(matches!(err, DiscordError::Status { status: 500, .. }));
        assert_eq!(api.attempts(), 3);
    }

    #[tokio::test]
    async fn rate_limit_waits_out_retry_after_then_succeeds() {
        let api = ScriptedDiscord::with(vec![Err(DiscordError::RateLimited {
            operation: "edit_original_response".to_string(),
            retry_after: Some(Duration::from_millis(20)),
        })]);
        let started = std::time::Instant::now();
        responder(api.clone(), 2).deliver("tok", "done").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(api.attempts(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let api = ScriptedDiscord::with(vec![Err(status(404))]);
        assert!(responder(api.clone(), 5).deliver("tok", "done").await.is_err());
        assert_eq!(api.attempts(), 1);
    }

    #[tokio::test]
    async fn long_text_is_truncated_before_delivery() {
        let api = ScriptedDiscord::with(vec![]);
        let long = "y".repeat(5000);
        responder(api.clone(), 0).deliver("tok", &long).await.unwrap();
        let edits = api.edits.lock().unwrap();
        assert_eq!(edits[0].1.chars().count(), crate::discord::types::MAX_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn spawned_work_waits_for_acknowledgment() {
        let api = ScriptedDiscord::with(vec![]);
        let started = Arc::new(Mutex::new(false));
        let (ack_tx, ack_rx) = oneshot::channel();

        let flag = Arc::clone(&started);
        let handle = responder(api.clone(), 0).spawn(
            "i-1".to_string(),
            "tok".to_string(),
            ack_rx,
            async move {
                *flag.lock().unwrap() = true;
                "answer".to_string()
            },
        );

        tokio::task::yield_now().await;
        assert!(!*started.lock().unwrap());
        assert_eq!(api.attempts(), 0);

        ack_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(*started.lock().unwrap());
        assert_eq!(
            api.edits.lock().unwrap().as_slice(),
            &[("tok".to_string(), "answer".to_string())]
        );
    }

    #[tokio::test]
    async fn dropped_gate_abandons_work() {
        let api = ScriptedDiscord::with(vec![]);
        let (ack_tx, ack_rx) = oneshot::channel::<()>();
        let handle = responder(api.clone(), 0).spawn(
            "i-1".to_string(),
            "tok".to_string(),
            ack_rx,
            async { "never".to_string() },
        );
        drop(ack_tx);
        handle.await.unwrap();
        assert_eq!(api.attempts(), 0);
    }
}
