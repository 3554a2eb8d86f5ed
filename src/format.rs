use crate::model::ResultSet;

pub const NO_ROWS: &str = "(no rows)";

/// Renders rows as a fixed-width, pipe-delimited table:
///
/// ```text
/// +------+-----+
/// | name | age |
/// +------+-----+
/// | Bob  | 25  |
/// +------+-----+
/// ```
pub fn format_table(rs: &ResultSet) -> String {
    if rs.is_empty() {
        return NO_ROWS.to_string();
    }

    let rendered: Vec<Vec<String>> = rs
        .rows
        .iter()
        .map(|row| row.iter().map(|c| c.render()).collect())
        .collect();

    let mut widths: Vec<usize> = rs.columns.iter().map(|h| h.chars().count()).collect();
    for row in &rendered {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let sep = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = widths
            .iter()
            .zip(cells)
            .map(|(&w, cell)| format!(" {cell:<w$} "))
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = vec![sep.clone(), line(&rs.columns), sep.clone()];
    out.extend(rendered.iter().map(|row| line(row)));
    out.push(sep);
    out.join("\n")
}
