//! Color theme for CLI output.
//!
//! One [`Theme`] holds the style roles the binary prints with. Every
//! helper falls back to plain text when stdout is piped or the user set
//! `NO_COLOR`.

use console::Style;
use is_terminal::IsTerminal;
use std::sync::LazyLock;

/// Shared theme used by every command.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Style roles for terminal output.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Completed operations
    pub success: Style,
    /// Partial failures (some papers failed to encode)
    pub warning: Style,
    /// Hard failures
    pub error: Style,
    /// Sync detail lines
    pub info: Style,
    /// Empty-result notices and secondary lines
    pub dim: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            info: Style::new().blue(),
            dim: Style::new().dim(),
        }
    }
}

impl Theme {
    /// Success line with a leading checkmark.
    pub fn success_with_icon(&self, text: &str) -> String {
        self.iconed('✓', &self.success, text)
    }

    /// Warning line with a leading warning sign.
    pub fn warning_with_icon(&self, text: &str) -> String {
        self.iconed('⚠', &self.warning, text)
    }

    /// Error line with a leading cross.
    pub fn error_with_icon(&self, text: &str) -> String {
        self.iconed('✗', &self.error, text)
    }

    /// Secondary line, dimmed when colors are on.
    pub fn muted(&self, text: &str) -> String {
        self.apply(&self.dim, text)
    }

    /// True when stdout is not a terminal or `NO_COLOR` is set.
    pub fn should_disable_colors() -> bool {
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    /// Style `text` with `style`, or return it plain when colors are off.
    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }

    fn iconed(&self, icon: char, style: &Style, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("{icon} {text}")
        } else {
            format!("{} {}", style.apply_to(icon), style.apply_to(text))
        }
    }
}
