use super::storage::HistoryStorage;
use crate::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

pub fn list_history(storage: &HistoryStorage, limit: usize) -> Result<()> {
    let mut entries = storage.tail(limit)?;
    if entries.is_empty() {
        println!("No run history yet");
        return Ok(());
    }
    // 最新的在前
    entries.reverse();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "ID", "Time", "Paths", "Passed", "Failed", "Skipped", "Duration", "Coverage",
    ]);

    for entry in entries {
        let summary = &entry.summary;
        let failed = summary.failed + summary.errored + summary.timed_out;
        let status_color = if summary.is_success() {
            Color::Green
        } else {
            Color::Red
        };

        table.add_row(vec![
            Cell::new(entry.id.get(..8).unwrap_or(&entry.id)), // Short ID
            Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(entry.paths.join(" ")).add_attribute(Attribute::Dim),
            Cell::new(summary.passed).fg(Color::Green),
            Cell::new(failed).fg(status_color),
            Cell::new(summary.skipped),
            Cell::new(format!("{:.2}s", summary.duration_secs)),
            Cell::new(
                summary
                    .coverage
                    .map(|c| format!("{:.1}%", c))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{}", table);

    Ok(())
}
