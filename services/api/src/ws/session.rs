//! Manages the WebSocket connection lifecycle for a tutoring session.

use super::{
    playback::{ClientAudio, DecodedPlayback, StreamedPlayback},
    protocol::{ClientMessage, ServerMessage},
};
use crate::{audio_utils::DEFAULT_CLIENT_AUDIO_RATE, state::AppState};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use tutor_core::config::TargetOverrides;
use tutor_core::lesson::Lesson;
use tutor_core::narration::{PlaybackChain, PlaybackStrategy};
use tutor_core::{PhaseController, SessionDeps, SessionHandle};
use uuid::Uuid;

const PLAYBACK_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

struct InitRequest {
    lesson: Lesson,
    learner_id: String,
    overrides: TargetOverrides,
    audio_rate: Option<u32>,
}

/// Entry point for a new connection: waits for `init`, then hosts a session.
#[instrument(name = "ws_session", skip_all, fields(connection_id, lesson_id, learner))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", &connection_id.to_string());
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text, &state).await,
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let init = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let span = tracing::Span::current();
    span.record("lesson_id", init.lesson.id.as_str());
    span.record("learner", init.learner_id.as_str());

    if let Err(e) = run_session(state, socket_tx, socket_rx, init).await {
        error!(error = ?e, "Tutoring session terminated with error.");
    }
    info!("Tutoring session finished.");
}

/// Parses the `init` message and loads the lesson it names.
async fn parse_init(text: &str, state: &AppState) -> Result<InitRequest> {
    let msg: ClientMessage = serde_json::from_str(text).context("Malformed init message")?;
    let ClientMessage::Init {
        lesson_id,
        learner_id,
        overrides,
        audio_rate,
    } = msg
    else {
        return Err(anyhow!("First message must be `init`"));
    };
    if learner_id.trim().is_empty() {
        return Err(anyhow!("`learner_id` is required for `init`"));
    }
    let lesson = state
        .lessons
        .load(&lesson_id)
        .await
        .with_context(|| format!("Could not load lesson '{}'", lesson_id))?;
    Ok(InitRequest {
        lesson,
        learner_id,
        overrides,
        audio_rate,
    })
}

/// Wires a phase controller to the socket and pumps client messages into it.
async fn run_session(
    state: Arc<AppState>,
    socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    init: InitRequest,
) -> Result<()> {
    let session_config = Arc::new(state.config.session_config(&init.overrides));
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx));

    let audio = Arc::new(ClientAudio::new(outbound_tx.clone(), PLAYBACK_ACK_TIMEOUT));
    let playback = if state.speech.is_some() {
        let strategies: Vec<Arc<dyn PlaybackStrategy>> = vec![
            Arc::new(StreamedPlayback::new(audio.clone())),
            Arc::new(DecodedPlayback::new(
                audio.clone(),
                init.audio_rate.unwrap_or(DEFAULT_CLIENT_AUDIO_RATE),
            )),
        ];
        PlaybackChain::new(strategies)
    } else {
        PlaybackChain::silent()
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let forward_tx = outbound_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if forward_tx.send(ServerMessage::from(event)).is_err() {
                break;
            }
        }
    });

    let deps = SessionDeps {
        dialogue: state.dialogue_client(&session_config),
        assessments: state.assessments(&session_config),
        prompts: state.prompts.clone(),
        playback,
    };
    let lesson = Arc::new(init.lesson);
    let _ = outbound_tx.send(ServerMessage::Initialized {
        lesson_id: lesson.id.clone(),
        title: lesson.title.clone(),
    });
    let handle = PhaseController::new(session_config, lesson, init.learner_id, deps, events_tx).spawn();

    let result = pump_client(&mut socket_rx, &handle, &audio).await;

    handle.shutdown().await;
    let _ = forwarder.await;
    drop(outbound_tx);
    drop(audio);
    writer.abort();
    info!("WebSocket connection closed and session terminated.");
    result
}

async fn pump_client(
    socket_rx: &mut SplitStream<WebSocket>,
    handle: &SessionHandle,
    audio: &ClientAudio,
) -> Result<()> {
    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Playback { clip_id, status }) => {
                    audio.acknowledge(clip_id, status).await;
                }
                Ok(ClientMessage::Init { .. }) => warn!("Ignoring repeated init message."),
                Ok(msg) => {
                    if let Some(input) = msg.into_input() {
                        handle.send(input).await?;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed client message."),
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Binary(_)) => warn!("Ignoring unexpected binary message."),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}

async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!(error = %e, "Failed to write to client WebSocket.");
            break;
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
