//! Plain-text table rendering.

use lazyadmin_core::models::TabularResult;
use std::fmt::Write;

/// Widest a column grows regardless of its contents.
const MAX_COLUMN_WIDTH: usize = 40;

/// Render a result as a padded text table with a header rule.
pub fn render_table(result: &TabularResult) -> String {
    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let longest = result
                .rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            col.width.max(longest).min(MAX_COLUMN_WIDTH)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let rule: Vec<&str> = rule.iter().map(String::as_str).collect();
    push_line(&mut out, &rule, &widths);

    for row in &result.rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        push_line(&mut out, &cells, &widths);
    }

    let plural = if result.row_count() == 1 { "" } else { "s" };
    let _ = write!(out, "({} row{plural})", result.row_count());
    if result.truncated {
        out.push_str(" (truncated)");
    }
    out.push('\n');
    out
}

fn push_line(out: &mut String, cells: &[&str], widths: &[usize]) {
    let line: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, width)| fit(cells.get(i).copied().unwrap_or_default(), *width))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

fn fit(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    if len <= width {
        return format!("{cell:<width$}");
    }
    let kept: String = cell.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyadmin_core::models::Value;

    #[test]
    fn test_render_pads_and_counts() {
        let result = TabularResult::from_values(
            vec!["id".into(), "email".into()],
            vec![
                vec![Value::Int(1), Value::Text("a@b.com".into())],
                vec![Value::Int(2), Value::Null],
            ],
        );
        let text = render_table(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id         | email");
        assert_eq!(lines[1], "---------- | ----------");
        assert_eq!(lines[2], "1          | a@b.com");
        assert_eq!(lines[3], "2          | NULL");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn test_long_cells_are_cut() {
        let long = "x".repeat(100);
        let result = TabularResult::from_values(
            vec!["body".into()],
            vec![vec![Value::Text(long)]],
        );
        let text = render_table(&result);
        let row = text.lines().nth(2).unwrap();
        assert_eq!(row.chars().count(), MAX_COLUMN_WIDTH);
        assert!(row.ends_with("..."));
        assert!(text.ends_with("(1 row)\n"));
    }
}
