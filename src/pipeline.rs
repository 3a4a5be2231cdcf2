//! Solve pipeline state machine.
//!
//! Owns the staged progress of one photographed-problem session:
//! idle → preprocessing → ocr → parsing → solving → complete, with an escape
//! to error from any active stage. The reasoning-service call is issued at
//! the ocr → parsing boundary, right after the image is encoded for the
//! wire. `clear` resets to idle at any time; a session cleared mid-flight is
//! abandoned via an epoch token (the transport call itself is not cancelled,
//! its result is dropped on arrival).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Prompts, StagePacing};
use crate::domain::{Solution, Stage};
use crate::error::{CoreError, CoreResult};
use crate::ingest::ImageUpload;
use crate::reasoner::Reasoner;
use crate::render::TypesetRenderer;

/// Read-only view of the current solve session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveSnapshot {
    pub session_id: Option<String>,
    pub stage: Stage,
    /// Stages entered since the session was submitted, in order.
    pub trace: Vec<Stage>,
    pub solution: Option<Solution>,
    pub error: Option<String>,
}

/// What a `submit` call ultimately produced.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveOutcome {
    /// The session ran to completion and the solution was published.
    Completed(Solution),
    /// `clear` superseded the session mid-flight; nothing was published.
    Superseded,
}

#[derive(Clone, Debug, Default)]
struct SolveState {
    session_id: Option<String>,
    stage: Stage,
    trace: Vec<Stage>,
    solution: Option<Solution>,
    error: Option<String>,
}

pub struct SolvePipeline {
    reasoner: Option<Arc<Reasoner>>,
    prompts: Arc<Prompts>,
    pacing: StagePacing,
    renderer: Arc<dyn TypesetRenderer>,
    state: RwLock<SolveState>,
    /// Bumped by `clear`; a driver holding a stale value stops writing.
    epoch: AtomicU64,
    stage_tx: watch::Sender<Stage>,
}

impl SolvePipeline {
    pub fn new(
        reasoner: Option<Arc<Reasoner>>,
        prompts: Arc<Prompts>,
        pacing: StagePacing,
        renderer: Arc<dyn TypesetRenderer>,
    ) -> Self {
        let (stage_tx, _) = watch::channel(Stage::Idle);
        Self {
            reasoner,
            prompts,
            pacing,
            renderer,
            state: RwLock::new(SolveState::default()),
            epoch: AtomicU64::new(0),
            stage_tx,
        }
    }

    /// Subscribe to stage transitions (the WS layer streams these).
    pub fn subscribe(&self) -> watch::Receiver<Stage> {
        self.stage_tx.subscribe()
    }

    /// Read-only snapshot for status endpoints.
    pub async fn snapshot(&self) -> SolveSnapshot {
        let s = self.state.read().await;
        SolveSnapshot {
            session_id: s.session_id.clone(),
            stage: s.stage,
            trace: s.trace.clone(),
            solution: s.solution.clone(),
            error: s.error.clone(),
        }
    }

    /// Reset to idle, superseding any in-flight session and discarding any
    /// published solution or error.
    #[instrument(level = "info", skip(self))]
    pub async fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut s = self.state.write().await;
        *s = SolveState::default();
        self.stage_tx.send_replace(Stage::Idle);
        info!(target: "pipeline", "solve state cleared");
    }

    /// Drive one validated image through the full solve sequence.
    ///
    /// One session at a time: while a session is active or parked in a
    /// terminal stage, further submits are rejected until `clear`. On
    /// success the validated solution is published and handed to the
    /// renderer; on failure the cause is recorded and the machine parks in
    /// the error stage. No automatic retry either way.
    #[instrument(level = "info", skip(self, image), fields(mime = %image.mime(), image_bytes = image.len()))]
    pub async fn submit(&self, image: ImageUpload) -> CoreResult<SolveOutcome> {
        let (token, session_id) = {
            let mut s = self.state.write().await;
            if s.stage != Stage::Idle {
                return Err(CoreError::invalid_input(format!(
                    "a solve session is already {}; clear it before submitting again",
                    s.stage
                )));
            }
            let session_id = Uuid::new_v4().to_string();
            *s = SolveState {
                session_id: Some(session_id.clone()),
                stage: Stage::Preprocessing,
                trace: vec![Stage::Preprocessing],
                solution: None,
                error: None,
            };
            self.stage_tx.send_replace(Stage::Preprocessing);
            (self.epoch.load(Ordering::SeqCst), session_id)
        };
        info!(target: "pipeline", %session_id, "solve session started");

        tokio::time::sleep(self.pacing.preprocessing).await;
        if !self.advance(token, Stage::Ocr).await {
            return Ok(SolveOutcome::Superseded);
        }

        // The encoded form is what crosses the service boundary.
        let image_uri = image.to_data_uri();
        tokio::time::sleep(self.pacing.ocr).await;
        if !self.advance(token, Stage::Parsing).await {
            return Ok(SolveOutcome::Superseded);
        }

        let Some(reasoner) = self.reasoner.as_deref() else {
            return self.fail(token, CoreError::credentials_missing()).await;
        };
        match reasoner.solve_image(&self.prompts, &image_uri).await {
            Ok(solution) => {
                if !self.advance(token, Stage::Solving).await {
                    return Ok(SolveOutcome::Superseded);
                }
                tokio::time::sleep(self.pacing.solving).await;
                if !self.publish(token, solution.clone()).await {
                    return Ok(SolveOutcome::Superseded);
                }
                self.renderer.render(&solution.final_answer, true);
                info!(target: "pipeline", %session_id, steps = solution.steps.len(), "solve session complete");
                Ok(SolveOutcome::Completed(solution))
            }
            Err(e) => self.fail(token, e).await,
        }
    }

    /// Move to `next` unless the session was superseded by `clear`.
    async fn advance(&self, token: u64, next: Stage) -> bool {
        let mut s = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != token {
            warn!(target: "pipeline", stage = %next, "stage advance dropped: session superseded");
            return false;
        }
        debug_assert_eq!(s.stage.next_in_order(), Some(next));
        s.stage = next;
        s.trace.push(next);
        self.stage_tx.send_replace(next);
        true
    }

    /// Publish the solution and park in the complete stage.
    async fn publish(&self, token: u64, solution: Solution) -> bool {
        let mut s = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != token {
            warn!(target: "pipeline", "publish dropped: session superseded");
            return false;
        }
        debug_assert_eq!(s.stage.next_in_order(), Some(Stage::Complete));
        s.stage = Stage::Complete;
        s.trace.push(Stage::Complete);
        s.solution = Some(solution);
        self.stage_tx.send_replace(Stage::Complete);
        true
    }

    /// Record the failure and park in the error stage, unless superseded.
    async fn fail(&self, token: u64, err: CoreError) -> CoreResult<SolveOutcome> {
        let mut s = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != token {
            warn!(target: "pipeline", error = %err, "failure dropped: session superseded");
            return Ok(SolveOutcome::Superseded);
        }
        if let CoreError::MalformedResponse { field, message } = &err {
            error!(target: "pipeline", field = %field, %message, "service response failed shape validation");
        } else {
            error!(target: "pipeline", error = %err, "solve session failed");
        }
        s.stage = Stage::Error;
        s.trace.push(Stage::Error);
        s.solution = None;
        s.error = Some(err.to_string());
        self.stage_tx.send_replace(Stage::Error);
        Err(err)
    }
}
