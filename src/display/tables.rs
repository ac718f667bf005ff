//! Table formatting for structured CLI output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::cache::{UpdateStats, format_timestamp};
use crate::engine::EngineStatus;
use crate::topics::Topic;
use crate::types::PaperId;

/// Widest a title cell gets before truncation.
const TITLE_WIDTH: usize = 60;

/// Keywords shown per topic row.
const KEYWORDS_SHOWN: usize = 5;

/// Standard preset shared by every table.
fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

/// Create a ranked search results table.
///
/// Each row is `(id, score, title, doi)` in rank order.
pub fn search_results_table(rows: &[(PaperId, f32, String, String)]) -> String {
    let mut table = base_table();
    table.set_header(vec![
        bold("#"),
        bold("Score"),
        bold("Paper"),
        bold("Title"),
        bold("DOI"),
    ]);

    // Rows without ANSI colors (comfy-table doesn't handle them well)
    for (rank, (id, score, title, doi)) in rows.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(format!("{score:.3}")).set_alignment(CellAlignment::Right),
            Cell::new(id),
            Cell::new(truncate_title(title)),
            Cell::new(doi),
        ]);
    }

    table.to_string()
}

/// Create a topics table with member counts and leading keywords.
pub fn topics_table(topics: &[Topic]) -> String {
    let mut table = base_table();
    table.set_header(vec![
        bold("Topic"),
        bold("Name"),
        bold("Papers"),
        bold("Keywords"),
    ]);

    for topic in topics {
        let keywords = topic
            .keywords
            .iter()
            .take(KEYWORDS_SHOWN)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(topic.id).set_alignment(CellAlignment::Right),
            Cell::new(truncate_title(&topic.name)),
            Cell::new(topic.len()).set_alignment(CellAlignment::Right),
            Cell::new(keywords),
        ]);
    }

    table.to_string()
}

/// Create the two-column status table.
pub fn status_table(status: &EngineStatus) -> String {
    let mut table = base_table();
    table.set_header(vec![bold("Metric"), bold("Value")]);

    table.add_row(vec!["Encoder", status.default_kind.key()]);
    for encoder in &status.encoders {
        let (text, color) = if encoder.ready {
            ("✓ ready".to_string(), Color::Green)
        } else if status.initializing {
            ("… loading".to_string(), Color::Yellow)
        } else {
            ("✗ not ready".to_string(), Color::Red)
        };
        table.add_row(vec![
            Cell::new(format!("  {}", encoder.kind.key())),
            Cell::new(text).fg(color),
        ]);
    }

    table.add_row(vec![
        Cell::new("Papers"),
        Cell::new(status.papers).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Embedded"),
        Cell::new(status.embedded).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Topics"),
        Cell::new(status.topics).set_alignment(CellAlignment::Right),
    ]);
    let updated = status
        .last_updated
        .map(format_timestamp)
        .unwrap_or_else(|| "never".to_string());
    table.add_row(vec!["Last updated", &updated]);
    table.add_row(vec![
        "Artifact",
        &status.artifact_path.display().to_string(),
    ]);

    table.to_string()
}

/// Create a summary table for an embedding update.
pub fn update_summary_table(stats: &UpdateStats) -> String {
    let mut table = base_table();
    table.set_header(vec![bold("Metric"), bold("Value")]);

    table.add_row(vec!["Papers", &stats.total_papers.to_string()]);
    table.add_row(vec!["Encoded", &stats.encoded.to_string()]);
    table.add_row(vec!["Up to date", &stats.skipped.to_string()]);
    table.add_row(vec!["Removed", &stats.removed.to_string()]);

    if stats.failed > 0 {
        table.add_row(vec![
            Cell::new("Failed"),
            Cell::new(stats.failed)
                .fg(Color::Red)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table.add_row(vec!["Elapsed", &format!("{:.2?}", stats.elapsed)]);

    table.to_string()
}

/// Truncates long titles on a char boundary, appending an ellipsis.
fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_WIDTH {
        return title.to_string();
    }
    let kept: String = title.chars().take(TITLE_WIDTH - 1).collect();
    format!("{kept}…")
}
