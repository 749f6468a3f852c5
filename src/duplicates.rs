use std::collections::{HashMap, HashSet};

use crate::grid::{CellCoord, Worksheet};

/// Trim, then lowercase. Cells compare equal for duplicate purposes iff
/// their normalized forms are identical.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Normalized value -> cells holding it, derived from one worksheet snapshot.
/// Empty normalized values are never indexed.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    groups: HashMap<String, Vec<CellCoord>>,
    flagged: HashSet<CellCoord>,
}

impl DuplicateIndex {
    pub fn build(sheet: &Worksheet) -> Self {
        let mut groups: HashMap<String, Vec<CellCoord>> = HashMap::new();
        for (r, row) in sheet.rows().iter().enumerate() {
            for (c, value) in row.cells().iter().enumerate() {
                let key = normalize(value);
                if key.is_empty() {
                    continue;
                }
                groups.entry(key).or_default().push(CellCoord::new(r, c));
            }
        }
        let flagged = groups
            .values()
            .filter(|cells| cells.len() >= 2)
            .flatten()
            .copied()
            .collect();
        Self { groups, flagged }
    }

    pub fn is_duplicate(&self, row: usize, col: usize) -> bool {
        self.flagged.contains(&CellCoord::new(row, col))
    }

    /// Cells sharing `value` after normalization, in row-major order.
    pub fn group(&self, value: &str) -> &[CellCoord] {
        self.groups
            .get(&normalize(value))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn duplicate_cell_count(&self) -> usize {
        self.flagged.len()
    }
}

/// Memo of the last index, keyed by the worksheet's version stamp.
#[derive(Debug, Default)]
pub struct DuplicateCache {
    built: Option<(u64, DuplicateIndex)>,
}

impl DuplicateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index consistent with `sheet`, rebuilding if the snapshot changed.
    pub fn get(&mut self, sheet: &Worksheet) -> &DuplicateIndex {
        let stale = !matches!(&self.built, Some((v, _)) if *v == sheet.version());
        if stale {
            tracing::debug!(
                version = sheet.version(),
                rows = sheet.len(),
                "rebuilding duplicate index"
            );
            self.built = None;
        }
        let (_, index) = self
            .built
            .get_or_insert_with(|| (sheet.version(), DuplicateIndex::build(sheet)));
        index
    }
}
