//! Rich terminal display utilities for enhanced CLI output.
//!
//! Provides styled tables, progress indicators, and formatted output
//! for a professional command-line experience.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::with_spinner;
pub use tables::{search_results_table, status_table, topics_table, update_summary_table};
pub use theme::{THEME, Theme};
