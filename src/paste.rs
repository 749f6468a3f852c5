use crate::grid::{COLUMN_COUNT, CellCoord, Worksheet};

/// Rows of tab-separated values, taken verbatim from the clipboard.
pub type PasteGrid = Vec<Vec<String>>;

/// Split clipboard text into rows (LF, CR or CRLF) and each row into
/// values (tab). Returns `None` for an empty payload, which callers treat
/// as a no-op paste.
pub fn parse(raw: &str) -> Option<PasteGrid> {
    if raw.is_empty() {
        return None;
    }
    let grid = split_lines(raw)
        .into_iter()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect();
    Some(grid)
}

fn split_lines(raw: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = raw.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&raw[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    lines.push(&raw[start..]);
    lines
}

/// Write `grid` into `sheet` with its top-left value at `origin`.
///
/// Rows past the end are grown as each parsed row is reached. Values whose
/// target column falls outside the schema are dropped. Returns the number
/// of cells written.
pub fn apply(sheet: &mut Worksheet, origin: CellCoord, grid: &PasteGrid) -> usize {
    let mut written = 0;
    for (r, values) in grid.iter().enumerate() {
        let row = origin.row + r;
        sheet.ensure_row_exists(row);
        for (c, value) in values.iter().enumerate() {
            let col = origin.col + c;
            if col >= COLUMN_COUNT {
                continue;
            }
            if sheet.set(row, col, value.as_str()).is_ok() {
                written += 1;
            }
        }
    }
    tracing::debug!(
        row = origin.row,
        col = origin.col,
        rows = grid.len(),
        written,
        "paste applied"
    );
    written
}
