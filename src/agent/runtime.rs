use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{AgentMessage, AgentReply, AgentRuntime, MessageContent};
use crate::config::AgentConfig;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
struct RuntimeResponse {
    content: MessageContent,
}

/// Talks to the runtime over `POST {base}/message`.
pub struct HttpAgentRuntime {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpAgentRuntime {
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/message", config.runtime_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }
}

fn parse_reply(body: &str) -> Result<AgentReply, AgentError> {
    let parsed: RuntimeResponse =
        serde_json::from_str(body).map_err(|e| AgentError::InvalidResponse {
            reason: format!("{e}; body: {}", body.chars().take(200).collect::<String>()),
        })?;
    Ok(AgentReply {
        text: parsed.content.text,
    })
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn handle_message(&self, message: &AgentMessage) -> Result<AgentReply, AgentError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                AgentError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AgentError::AuthFailed);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AgentError::RequestFailed {
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        tracing::debug!(room_id = %message.room_id, "Agent runtime replied");
        parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn parse_reply_reads_content_text() {
        let reply = parse_reply(r#"{"content":{"text":"hello"},"extra":1}"#).unwrap();
        assert_eq!(reply.text, "hello");
        assert!(matches!(
            parse_reply(r#"{"text":"hello"}"#),
            Err(AgentError::InvalidResponse { .. })
        ));
    }

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn spawn_runtime(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/message",
                post(
                    move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            seen.lock().unwrap().push((auth, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(Arc::clone(&seen));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn config(url: String, api_key: Option<&str>) -> AgentConfig {
        AgentConfig {
            runtime_url: url,
            api_key: api_key.map(SecretString::from),
            agent_id: "agent-1".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn posts_message_with_bearer_credential() {
        let (url, seen) =
            spawn_runtime(StatusCode::OK, json!({"content": {"text": "use cargo"}})).await;
        let runtime = HttpAgentRuntime::new(&config(url, Some("sekrit"))).unwrap();

        let message = AgentMessage::new("how do I build?", "42", "agent-1", "room-9");
        let reply = runtime.handle_message(&message).await.unwrap();

        assert_eq!(reply.text, "use cargo");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer sekrit"));
        assert_eq!(seen[0].1["content"]["text"], json!("how do I build?"));
        assert_eq!(seen[0].1["room_id"], json!("room-9"));
    }

    #[tokio::test]
    async fn maps_rejected_credential_to_auth_failed() {
        let (url, _seen) = spawn_runtime(StatusCode::UNAUTHORIZED, json!({})).await;
        let runtime = HttpAgentRuntime::new(&config(url, None)).unwrap();

        let message = AgentMessage::new("hi", "42", "agent-1", "room-9");
        assert!(matches!(
            runtime.handle_message(&message).await,
            Err(AgentError::AuthFailed)
        ));
    }

    #[tokio::test]
    async fn server_errors_surface_as_request_failures() {
        let (url, _seen) =
            spawn_runtime(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "down"})).await;
        let runtime = HttpAgentRuntime::new(&config(url, None)).unwrap();

        let message = AgentMessage::new("hi", "42", "agent-1", "room-9");
        let err = runtime.handle_message(&message).await.unwrap_err();
        assert!(matches!(err, AgentError::RequestFailed { .. }));
        assert!(err.to_string().contains("500"));
    }
}
