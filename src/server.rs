//! Inbound HTTP surface.
//!
//! `POST /interactions` is the only route Discord calls. It verifies the
//! signature, answers pings, and defers application commands to a
//! detached task that edits the original response when done.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{BoxStream, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::agent::HttpAgentRuntime;
use crate::config::Config;
use crate::discord::types::InteractionType;
use crate::discord::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::discord::{
    DiscordApi, HttpDiscordClient, InteractionRejection, InteractionResponse,
    InteractionVerifier, command_definitions,
};
use crate::dispatch::{CommandContext, DeferredResponder, DispatchSettings, Invocation, dispatch};
use crate::error::Error;

/// Shared state for all handlers.
pub struct AppState {
    pub verifier: InteractionVerifier,
    pub context: CommandContext,
    pub deferred: DeferredResponder,
    pub discord: Arc<dyn DiscordApi>,
    /// Required as a bearer token on `/register` when set.
    pub register_token: Option<SecretString>,
}

impl AppState {
    /// Wire the production collaborators from configuration.
    ///
    /// Opens the database and runs its migrations, so this is the point
    /// where a bad key, an unreachable store, or a broken HTTP client
    /// stops startup.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let verifier = InteractionVerifier::from_hex(
            &config.discord.public_key,
            config.discord.max_clock_skew,
        )?;
        let store = crate::db::connect_from_config(&config.database).await?;
        let discord = Arc::new(HttpDiscordClient::new(
            config.discord.api_base_url.clone(),
            config.discord.application_id.clone(),
            config.discord.bot_token.clone(),
        )?);
        let agent = Arc::new(HttpAgentRuntime::new(&config.agent)?);

        let settings = DispatchSettings {
            admin_role_ids: config.discord.admin_role_ids.clone(),
            agent_id: config.agent.agent_id.clone(),
            bot_token: config.discord.bot_token.clone(),
        };
        if settings.admin_role_ids.is_empty() {
            tracing::warn!("DISCORD_ADMIN_ROLE_IDS is empty; nobody can send credits");
        }

        Ok(Self {
            verifier,
            context: CommandContext::new(settings, store, discord.clone(), agent),
            deferred: DeferredResponder::new(discord.clone(), config.discord.followup),
            discord,
            register_token: config.http.register_token.clone(),
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct RegisterResponse {
    registered: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/interactions", post(interactions_handler))
        .route("/register", post(register_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
///
/// Returns the bound address (useful when binding to port 0) and the
/// server task.
pub async fn start_server<S>(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: S,
) -> Result<(SocketAddr, JoinHandle<()>), Error>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Startup {
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener.local_addr().map_err(|e| Error::Startup {
        reason: format!("Failed to get local addr: {}", e),
    })?;

    let app = build_router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown.await;
                tracing::info!("Interaction server shutting down");
            })
            .await
        {
            tracing::error!("Interaction server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Interaction server listening");
    Ok((bound_addr, handle))
}

async fn root_handler() -> &'static str {
    "creditagent is running"
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn interactions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let interaction = match state.verifier.verify_interaction(
        header_str(&headers, SIGNATURE_HEADER),
        header_str(&headers, TIMESTAMP_HEADER),
        &body,
    ) {
        Ok(interaction) => interaction,
        Err(InteractionRejection::Unauthorized(e)) => {
            tracing::warn!(error = %e, "Rejected interaction request");
            return error_response(StatusCode::UNAUTHORIZED, "invalid request signature");
        }
        Err(InteractionRejection::Malformed(e)) => {
            tracing::warn!(error = %e, "Signed body is not an interaction");
            return error_response(StatusCode::BAD_REQUEST, "malformed interaction");
        }
    };

    match interaction.kind {
        InteractionType::Ping => Json(InteractionResponse::pong()).into_response(),
        InteractionType::ApplicationCommand => {
            let Some(invocation) = Invocation::from_interaction(&interaction) else {
                return error_response(StatusCode::BAD_REQUEST, "missing command data or user");
            };
            tracing::info!(
                interaction_id = %invocation.interaction_id,
                command = %invocation.command.name(),
                user_id = %invocation.user_id,
                room_id = %invocation.room_id,
                "Deferring command"
            );

            let (ack_tx, ack_rx) = oneshot::channel();
            let context = state.context.clone();
            state.deferred.spawn(
                invocation.interaction_id.clone(),
                interaction.token,
                ack_rx,
                async move { dispatch(&context, &invocation).await },
            );

            release_on_handoff(Json(InteractionResponse::deferred()).into_response(), ack_tx)
        }
        other => {
            tracing::debug!(kind = ?other, "Unsupported interaction type");
            error_response(StatusCode::BAD_REQUEST, "unsupported interaction type")
        }
    }
}

/// Response body that opens the follow-up gate once hyper has drained it
/// or dropped it.
struct AckOnHandoff {
    inner: BoxStream<'static, Result<Bytes, axum::Error>>,
    gate: Option<oneshot::Sender<()>>,
}

impl AckOnHandoff {
    fn open(&mut self) {
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(());
        }
    }
}

impl Stream for AckOnHandoff {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);
        if let Poll::Ready(None) = polled {
            this.open();
        }
        polled
    }
}

impl Drop for AckOnHandoff {
    fn drop(&mut self) {
        self.open();
    }
}

/// Hold the detached command until `response` has left the handler stack.
fn release_on_handoff(response: Response, gate: oneshot::Sender<()>) -> Response {
    let (parts, body) = response.into_parts();
    let body = Body::from_stream(AckOnHandoff {
        inner: body.into_data_stream().boxed(),
        gate: Some(gate),
    });
    Response::from_parts(parts, body)
}

fn bearer_matches(headers: &HeaderMap, expected: &SecretString) -> bool {
    let Some(provided) = header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };
    provided
        .as_bytes()
        .ct_eq(expected.expose_secret().as_bytes())
        .into()
}

async fn register_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = &state.register_token
        && !bearer_matches(&headers, token)
    {
        return error_response(StatusCode::UNAUTHORIZED, "invalid register token");
    }

    match state.discord.register_commands(&command_definitions()).await {
        Ok(registered) => {
            tracing::info!(registered, "Registered slash commands");
            Json(RegisterResponse { registered }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Command registration failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
