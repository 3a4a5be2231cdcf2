//! WebSocket upgrade + message loop. Each client message is parsed as JSON
//! and answered with a single JSON message, except `solve`, which streams
//! stage transitions while the pipeline runs and finishes with the outcome.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::Difficulty;
use crate::ingest::decode_base64_image;
use crate::pipeline::SolveOutcome;
use crate::practice::{DifficultyChange, GradeOutcome};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "mathsage_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "mathsage_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let sent = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(ClientWsMessage::Solve { image_base64, mime }) => {
            debug!(target: "mathsage_backend", b64_len = image_base64.len(), "WS solve received");
            stream_solve(&mut socket, &state, &image_base64, mime.as_deref()).await
          }
          Ok(incoming) => {
            // answers may carry inline images; log a bounded preview only
            debug!(target: "mathsage_backend", "WS received: {}", trunc_for_log(&format!("{:?}", incoming), 200));
            let reply = handle_client_ws(incoming, &state).await;
            send_msg(&mut socket, &reply).await
          }
          Err(e) => {
            let reply = ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) };
            send_msg(&mut socket, &reply).await
          }
        };
        if let Err(e) = sent {
          error!(target: "mathsage_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "mathsage_backend", "WebSocket disconnected");
}

/// Drive a WS-initiated solve. Stage transitions go out as `solve_stage`
/// messages while the pipeline runs; the final message is `solved`,
/// `solve_cleared` (superseded) or `error`.
async fn stream_solve(
  socket: &mut WebSocket,
  state: &Arc<AppState>,
  image_base64: &str,
  mime: Option<&str>,
) -> Result<(), axum::Error> {
  let upload = match decode_base64_image(image_base64, mime) {
    Ok(u) => u,
    Err(e) => return send_msg(socket, &ServerWsMessage::Error { message: e.to_string() }).await,
  };

  let mut rx = state.solve.subscribe();
  let mut driver = tokio::spawn({
    let state = state.clone();
    async move { state.solve.submit(upload).await }
  });

  let outcome = loop {
    tokio::select! {
      changed = rx.changed() => {
        if changed.is_err() {
          break driver.await;
        }
        let stage = *rx.borrow_and_update();
        send_msg(socket, &ServerWsMessage::SolveStage { stage }).await?;
      }
      res = &mut driver => break res,
    }
  };

  let reply = match outcome {
    Ok(Ok(SolveOutcome::Completed(solution))) => ServerWsMessage::Solved { solution },
    Ok(Ok(SolveOutcome::Superseded)) => ServerWsMessage::SolveCleared,
    Ok(Err(e)) => ServerWsMessage::Error { message: e.to_string() },
    Err(e) => ServerWsMessage::Error { message: format!("solve task failed: {}", e) },
  };
  send_msg(socket, &reply).await
}

async fn send_msg(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

#[instrument(level = "info", skip_all)]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    // solve is intercepted by the socket loop so it can stream
    ClientWsMessage::Solve { .. } => {
      ServerWsMessage::Error { message: "solve is a streaming request".into() }
    }

    ClientWsMessage::SolveStatus => {
      ServerWsMessage::SolveStatus { snapshot: state.solve.snapshot().await }
    }

    ClientWsMessage::ClearSolve => {
      state.solve.clear().await;
      ServerWsMessage::SolveCleared
    }

    ClientWsMessage::NewQuestion { difficulty } => {
      let level = match difficulty.as_deref().map(str::parse::<Difficulty>).transpose() {
        Ok(l) => l,
        Err(e) => return ServerWsMessage::Error { message: e.to_string() },
      };
      match state.practice.new_round(level).await {
        Ok(question) => {
          info!(target: "practice", question_id = %question.id, "WS new_question served");
          ServerWsMessage::Question { question }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::SubmitAnswer { text, image_base64, mime } => {
      let image = match image_base64 {
        Some(b64) => match decode_base64_image(&b64, mime.as_deref()) {
          Ok(u) => Some(u),
          Err(e) => return ServerWsMessage::Error { message: e.to_string() },
        },
        None => None,
      };
      match state.practice.submit_answer(text, image).await {
        Ok(GradeOutcome::Graded(grading)) => {
          info!(target: "practice", is_correct = grading.is_correct, "WS answer graded");
          ServerWsMessage::AnswerResult { grading }
        }
        Ok(GradeOutcome::Superseded) => ServerWsMessage::RoundSuperseded,
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::ChangeDifficulty { difficulty } => match difficulty.parse::<Difficulty>() {
      Ok(level) => match state.practice.change_difficulty(level).await {
        Ok(DifficultyChange::Refreshed(question)) => {
          ServerWsMessage::DifficultyChanged { refreshed: true, question: Some(question) }
        }
        Ok(DifficultyChange::Stored) => {
          ServerWsMessage::DifficultyChanged { refreshed: false, question: None }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::AnswerStarted => {
      state.practice.mark_answer_started().await;
      ServerWsMessage::Ack
    }

    ClientWsMessage::Hint => match state.practice.hint().await {
      Ok(text) => {
        info!(target: "practice", "WS hint served");
        ServerWsMessage::Hint { text }
      }
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },
  }
}
