//! Terminal output helpers
//!
//! Spinners and styled lines go to stderr when attached to a terminal and
//! fall back to plain `[OK]`/`[WARN]` lines in CI, keeping stdout free for
//! command results.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, section, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
