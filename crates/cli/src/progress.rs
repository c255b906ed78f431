use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(80);

/// Spinner for a single remote call; shows the elapsed time next to `msg`.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner()
        .with_style(style)
        .with_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}
