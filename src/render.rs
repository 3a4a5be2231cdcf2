//! Typesetting renderer boundary.
//!
//! Rendering is strictly a display concern: controllers hand expressions
//! over and never depend on the outcome. Implementations must swallow their
//! own failures (log, don't propagate) so a broken display surface cannot
//! take a solve or practice session down with it.

use tracing::debug;

use crate::util::trunc_for_log;

/// Accepts a math expression for display.
///
/// Calls are fire-and-forget and idempotent per surface: a new call replaces
/// whatever the surface showed before. `display_mode` selects block layout
/// over inline.
pub trait TypesetRenderer: Send + Sync {
  fn render(&self, expression: &str, display_mode: bool);
}

/// Renderer for headless runs: records the request in the debug log and
/// drops it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl TypesetRenderer for NullRenderer {
  fn render(&self, expression: &str, display_mode: bool) {
    debug!(
      target: "render",
      display_mode,
      expr = %trunc_for_log(expression, 80),
      "typeset request dropped (no display surface attached)"
    );
  }
}
