//! Text table rendering for query results.
//!
//! Cells are left-aligned and never truncated; column widths come from
//! the display width of the header and of every rendered cell. Control
//! characters are escaped so a value always stays on its own line.

use crate::db::types::NormalizedResult;
use unicode_width::UnicodeWidthStr;

/// Render `result` as a bordered text table of at most `max_rows` rows,
/// followed by a `Total rows` footer.
pub fn render_table(result: &NormalizedResult, max_rows: usize) -> String {
    if result.columns.is_empty() {
        return "Query executed. No data returned.".to_string();
    }

    let shown = &result.rows[..result.rows.len().min(max_rows)];
    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(|cell| escape_control(&cell.to_string())).collect())
        .collect();
    let columns: Vec<String> = result.columns.iter().map(|c| escape_control(c)).collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    output.push_str(&render_line(&columns, &widths));
    output.push_str(&separator);
    for row in &cells {
        output.push_str(&render_line(row, &widths));
    }
    output.push_str(&separator);

    output.push_str(&format!(
        "Total rows: {} (showing first {})",
        result.row_count(),
        shown.len()
    ));
    output
}

/// Escape control characters the way ClickHouse `Pretty` output does,
/// `\n` as `\\n` and so on.
fn escape_control(value: &str) -> String {
    if !value.chars().any(char::is_control) {
        return value.to_string();
    }
    value
        .chars()
        .map(|c| {
            if c.is_control() {
                c.escape_default().to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

/// `{:<width$}` pads by char count, so pad by display width instead.
fn render_line<S: AsRef<str>>(values: &[S], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let value = value.as_ref();
            let padding = width.saturating_sub(value.width());
            format!("| {}{} ", value, " ".repeat(padding))
        })
        .collect::<String>()
        + "|\n"
}
