//! Application state: the reasoning client, prompts/pacing, and the two
//! controllers.
//!
//! This module owns:
//!   - the solve pipeline (one session at a time)
//!   - the practice session (one round at a time)
//!   - the optional reasoning client both controllers share
//!
//! There are no local solver fallbacks: when the client is absent, every
//! AI-backed operation fails at call time with an auth-class error.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{load_solver_config_from_env, Prompts, StagePacing};
use crate::pipeline::SolvePipeline;
use crate::practice::PracticeSession;
use crate::reasoner::Reasoner;
use crate::render::{NullRenderer, TypesetRenderer};

pub struct AppState {
    pub solve: SolvePipeline,
    pub practice: PracticeSession,
    pub reasoner_enabled: bool,
}

impl AppState {
    /// Build state from env: load config, init the client, wire controllers.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_solver_config_from_env().unwrap_or_default();
        let pacing = StagePacing::from_cfg(&cfg.pacing);
        let reasoner = Reasoner::from_env().map(Arc::new);
        match &reasoner {
            Some(r) => {
                info!(target: "mathsage_backend", base_url = %r.base_url, fast_model = %r.fast_model, strong_model = %r.strong_model, "Reasoning service client enabled.")
            }
            None => {
                warn!(target: "mathsage_backend", "OPENAI_API_KEY not set. The server will run, but solve/practice calls will fail with an auth error until it is configured.")
            }
        }
        Self::with_parts(reasoner, cfg.prompts, pacing, Arc::new(NullRenderer))
    }

    /// Explicit wiring, shared by `new` and tests.
    pub fn with_parts(
        reasoner: Option<Arc<Reasoner>>,
        prompts: Prompts,
        pacing: StagePacing,
        renderer: Arc<dyn TypesetRenderer>,
    ) -> Self {
        let prompts = Arc::new(prompts);
        let reasoner_enabled = reasoner.is_some();
        Self {
            solve: SolvePipeline::new(reasoner.clone(), prompts.clone(), pacing, renderer.clone()),
            practice: PracticeSession::new(reasoner, prompts, renderer),
            reasoner_enabled,
        }
    }
}
