//! CLI-specific progress handling for butterfly-access
//!
//! Engine stages are shown on a spinner; the library only reports stages
//! through a callback.

use std::sync::Arc;
use std::time::Duration;

use butterfly_access::{Stage, StageCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Creates a spinner showing the current engine stage
pub fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Progress manager for one accessibility run
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        eprintln!("{message}");
        Self {
            pb: create_spinner(),
        }
    }

    /// Stage callback that updates the spinner message
    pub fn stage_callback(&self) -> StageCallback {
        let pb = self.pb.clone();
        Arc::new(move |stage: Stage| pb.set_message(stage.to_string()))
    }

    pub fn finish(&self, message: &str) {
        self.pb.finish_with_message(message.to_string());
    }

    pub fn abandon(&self) {
        self.pb.abandon();
    }
}
