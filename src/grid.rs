use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Column names in display, navigation, paste and serialization order.
pub const COLUMNS: [&str; 9] = [
    "Keyword",
    "Prefix",
    "Suffix",
    "Middle",
    "City",
    "FirstName",
    "3-letter",
    "4-letter",
    "Extensions",
];

pub const COLUMN_COUNT: usize = COLUMNS.len();

/// Rows a worksheet starts with when nothing usable was persisted.
pub const DEFAULT_ROWS: usize = 8;

pub fn last_column() -> usize {
    COLUMN_COUNT - 1
}

/// (row position, column index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

impl CellCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    OutOfRange { row: usize, len: usize },
    NoSuchColumn(usize),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::OutOfRange { row, len } => {
                write!(f, "row {row} is out of range (worksheet has {len} rows)")
            }
            GridError::NoSuchColumn(col) => {
                write!(f, "column {col} is out of range ({COLUMN_COUNT} columns)")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// One value per schema column. The fixed-size array makes partial rows and
/// extra keys unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: [String; COLUMN_COUNT],
}

impl Row {
    pub fn empty() -> Self {
        Self {
            cells: std::array::from_fn(|_| String::new()),
        }
    }

    pub fn get(&self, col: usize) -> Option<&str> {
        self.cells.get(col).map(|s| s.as_str())
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub(crate) fn cell_mut(&mut self, col: usize) -> Option<&mut String> {
        self.cells.get_mut(col)
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::empty()
    }
}

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Ordered rows plus a version stamp that changes on every mutation.
///
/// Cloning is cheap: rows live behind an `Arc` and are copied on the next
/// write only while another snapshot still holds them.
#[derive(Debug, Clone)]
pub struct Worksheet {
    rows: Arc<Vec<Row>>,
    version: u64,
}

impl Worksheet {
    pub fn with_rows(count: usize) -> Self {
        Self::from_rows((0..count).map(|_| Row::empty()).collect())
    }

    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
            version: next_version(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, row: usize, col: usize) -> Result<&str, GridError> {
        let r = self.rows.get(row).ok_or(GridError::OutOfRange {
            row,
            len: self.len(),
        })?;
        r.get(col).ok_or(GridError::NoSuchColumn(col))
    }

    /// Overwrite one cell. The row must already exist; growth is the
    /// caller's job via [`Worksheet::ensure_row_exists`].
    pub fn set(
        &mut self,
        row: usize,
        col: usize,
        text: impl Into<String>,
    ) -> Result<(), GridError> {
        let len = self.len();
        if row >= len {
            return Err(GridError::OutOfRange { row, len });
        }
        if col >= COLUMN_COUNT {
            return Err(GridError::NoSuchColumn(col));
        }
        let text = text.into();
        let rows = self.rows_mut();
        if let Some(cell) = rows[row].cell_mut(col) {
            *cell = text;
        }
        Ok(())
    }

    /// Pad with empty rows up to and including `target_row`. Returns the
    /// number of rows appended.
    pub fn ensure_row_exists(&mut self, target_row: usize) -> usize {
        let len = self.len();
        if target_row < len {
            return 0;
        }
        let added = target_row - len + 1;
        self.append_rows(added);
        added
    }

    pub fn append_rows(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let rows = self.rows_mut();
        rows.extend((0..count).map(|_| Row::empty()));
        tracing::debug!(added = count, len = rows.len(), "rows appended");
    }

    fn rows_mut(&mut self) -> &mut Vec<Row> {
        self.version = next_version();
        Arc::make_mut(&mut self.rows)
    }
}

impl Default for Worksheet {
    fn default() -> Self {
        Self::with_rows(DEFAULT_ROWS)
    }
}

impl PartialEq for Worksheet {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl Eq for Worksheet {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_worksheet_has_eight_empty_rows() {
        let ws = Worksheet::default();
        assert_eq!(ws.len(), 8);
        assert!(
            ws.rows()
                .iter()
                .all(|r| r.cells().iter().all(|c| c.is_empty()))
        );
    }

    #[test]
    fn every_row_holds_every_column() {
        let row = Row::empty();
        assert_eq!(row.cells().len(), COLUMN_COUNT);
        for col in 0..COLUMN_COUNT {
            assert_eq!(row.get(col), Some(""));
        }
        assert_eq!(row.get(COLUMN_COUNT), None);
    }

    #[test]
    fn get_past_end_is_out_of_range() {
        let ws = Worksheet::with_rows(3);
        assert_eq!(ws.get(2, 0), Ok(""));
        assert_eq!(ws.get(3, 0), Err(GridError::OutOfRange { row: 3, len: 3 }));
        assert_eq!(ws.get(0, 9), Err(GridError::NoSuchColumn(9)));
    }

    #[test]
    fn set_requires_existing_row() {
        let mut ws = Worksheet::with_rows(1);
        assert!(ws.set(0, 4, "Paris").is_ok());
        assert_eq!(ws.get(0, 4), Ok("Paris"));
        assert_eq!(ws.set(1, 0, "x"), Err(GridError::OutOfRange { row: 1, len: 1 }));
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn ensure_row_exists_pads_exactly_to_target() {
        let mut ws = Worksheet::with_rows(8);
        assert_eq!(ws.ensure_row_exists(5), 0);
        assert_eq!(ws.len(), 8);
        assert_eq!(ws.ensure_row_exists(10), 3);
        assert_eq!(ws.len(), 11);
        assert_eq!(ws.ensure_row_exists(10), 0);
        assert_eq!(ws.len(), 11);
    }

    #[test]
    fn append_rows_is_unconditional() {
        let mut ws = Worksheet::with_rows(2);
        ws.append_rows(5);
        assert_eq!(ws.len(), 7);
        let v = ws.version();
        ws.append_rows(0);
        assert_eq!(ws.version(), v);
    }

    #[test]
    fn mutation_leaves_earlier_snapshot_untouched() {
        let mut ws = Worksheet::with_rows(2);
        let snapshot = ws.clone();
        ws.set(1, 1, "pre").unwrap();
        assert_eq!(snapshot.get(1, 1), Ok(""));
        assert_eq!(ws.get(1, 1), Ok("pre"));
        assert_ne!(snapshot.version(), ws.version());
    }

    #[test]
    fn schema_order() {
        assert_eq!(COLUMNS[0], "Keyword");
        assert_eq!(COLUMNS[last_column()], "Extensions");
        assert_eq!(last_column(), 8);
    }

    proptest! {
        #[test]
        fn ensure_row_exists_is_idempotent(start in 0usize..20, target in 0usize..60) {
            let mut ws = Worksheet::with_rows(start);
            ws.ensure_row_exists(target);
            let len = ws.len();
            prop_assert_eq!(len, start.max(target + 1));
            ws.ensure_row_exists(target);
            prop_assert_eq!(ws.len(), len);
        }
    }
}
