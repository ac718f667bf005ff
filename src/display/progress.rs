//! Spinner wrapper for long-running engine calls.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::theme::Theme;

/// Runs `operation` behind an indeterminate spinner.
///
/// The spinner only draws on a terminal; piped output stays clean.
pub fn with_spinner<F, T>(message: &str, operation: F) -> T
where
    F: FnOnce() -> T,
{
    if Theme::should_disable_colors() {
        return operation();
    }

    let spinner = ProgressBar::new_spinner().with_message(message.to_string());
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .expect("spinner template is valid"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = operation();
    spinner.finish_and_clear();
    result
}
