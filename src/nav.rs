use crate::grid::{COLUMN_COUNT, CellCoord, Worksheet, last_column};

/// Which cell, if any, is accepting keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    NoFocus,
    FocusedAt(CellCoord),
}

impl Focus {
    pub fn cell(&self) -> Option<CellCoord> {
        match self {
            Focus::NoFocus => None,
            Focus::FocusedAt(c) => Some(*c),
        }
    }
}

/// Focus state machine. Moving focus grows the worksheet on demand; it
/// never touches cell contents.
#[derive(Debug, Default)]
pub struct Navigator {
    focus: Focus,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Negative rows are ignored. Columns clamp into the schema.
    pub fn focus_cell(
        &mut self,
        sheet: &mut Worksheet,
        target_row: isize,
        target_col: isize,
    ) -> Focus {
        if target_row < 0 {
            return self.focus;
        }
        let row = target_row as usize;
        let col = target_col.clamp(0, last_column() as isize) as usize;
        sheet.ensure_row_exists(row);
        self.focus = Focus::FocusedAt(CellCoord::new(row, col));
        tracing::debug!(row, col, "focus moved");
        self.focus
    }

    /// Commit-and-move-down (Enter).
    pub fn advance_on_confirm(&mut self, sheet: &mut Worksheet) -> Focus {
        let Focus::FocusedAt(at) = self.focus else {
            return self.focus;
        };
        self.focus_cell(sheet, at.row as isize + 1, at.col as isize)
    }

    /// Next/previous field (Tab / Shift+Tab), wrapping across rows. Going
    /// backward from the first cell of row 0 stays on row 0.
    pub fn advance_on_step(&mut self, sheet: &mut Worksheet, forward: bool) -> Focus {
        let Focus::FocusedAt(at) = self.focus else {
            return self.focus;
        };
        let (row, col) = if forward {
            if at.col + 1 >= COLUMN_COUNT {
                (at.row + 1, 0)
            } else {
                (at.row, at.col + 1)
            }
        } else if at.col == 0 {
            (at.row.saturating_sub(1), last_column())
        } else {
            (at.row, at.col - 1)
        };
        self.focus_cell(sheet, row as isize, col as isize)
    }

    /// Drop focus unless it is moving straight to another cell of this grid.
    pub fn blur_if_outside(&mut self, candidate: Option<CellCoord>) -> Focus {
        match candidate {
            Some(target) if target.col < COLUMN_COUNT => {}
            _ => {
                if self.focus != Focus::NoFocus {
                    tracing::debug!("focus cleared");
                }
                self.focus = Focus::NoFocus;
            }
        }
        self.focus
    }
}
