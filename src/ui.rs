use crate::app::App;
use crate::grid::{COLUMNS, CellCoord};
use crate::nav::Focus;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};

const GUTTER_WIDTH: u16 = 5;

/// Where the last frame put each data cell, for mapping clicks back to the
/// worksheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridGeometry {
    /// Table body inside the borders, below the header
    body: Rect,
    first_row: usize,
    row_count: usize,
    column_width: u16,
}

impl GridGeometry {
    /// Cell under terminal position (`x`, `y`). The gutter and the gaps
    /// between columns map to nothing.
    pub fn cell_at(&self, x: u16, y: u16) -> Option<CellCoord> {
        let body = self.body;
        if x < body.x || y < body.y || x >= body.right() || y >= body.bottom() {
            return None;
        }
        let row = self.first_row + (y - body.y) as usize;
        if row >= self.row_count {
            return None;
        }
        let dx = (x - body.x).checked_sub(GUTTER_WIDTH + 1)?;
        let stride = self.column_width + 1;
        if dx % stride == self.column_width {
            return None;
        }
        let col = (dx / stride) as usize;
        (col < COLUMNS.len()).then_some(CellCoord::new(row, col))
    }
}

pub fn draw(f: &mut Frame, app: &mut App) -> GridGeometry {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)].as_ref())
        .split(f.size());

    let grid = draw_grid(f, chunks[0], app);
    draw_status(f, chunks[1], app);
    grid
}

fn draw_status(f: &mut Frame, area: Rect, app: &mut App) {
    let focus = app.focus();
    let (mode, detail) = match focus {
        Focus::NoFocus => {
            let text = app.current_cell_text().to_string();
            let matches = app.duplicates().group(&text).len();
            if matches >= 2 {
                ("NORMAL", format!(" | {text} ({matches} matches)"))
            } else {
                ("NORMAL", String::new())
            }
        }
        Focus::FocusedAt(at) => ("EDIT", format!(" | {}", with_cursor(app, at))),
    };
    let dup_count = app.duplicates().duplicate_cell_count();
    let text = Line::from(vec![
        Span::styled(
            format!("[{mode}] "),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.status.clone()),
        Span::raw(detail),
        Span::styled(
            format!("  ({dup_count} duplicate cells)"),
            Style::default().fg(Color::Yellow),
        ),
    ]);
    let p = Paragraph::new(text).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn with_cursor(app: &App, at: CellCoord) -> String {
    let text = app.sheet().get(at.row, at.col).unwrap_or_default();
    let cursor = app.edit_cursor.min(text.len());
    if !text.is_char_boundary(cursor) {
        return text.to_string();
    }
    format!("{}▏{}", &text[..cursor], &text[cursor..])
}

fn draw_grid(f: &mut Frame, area: Rect, app: &mut App) -> GridGeometry {
    let block = Block::default().borders(Borders::ALL).title("Worksheet");
    let inner = block.inner(area);
    let focus = app.focus().cell();
    let selected = app.selected;
    let (sheet, dups) = app.view();

    let row_count = sheet.len();
    let widths = column_widths(area.width, COLUMNS.len());
    let header = Row::new(
        std::iter::once(Cell::from("#")).chain(COLUMNS.iter().map(|c| Cell::from(*c))),
    )
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let mut rows = Vec::with_capacity(sheet.len());
    for (r_idx, row) in sheet.rows().iter().enumerate() {
        let mut cells = Vec::with_capacity(COLUMNS.len() + 1);
        let number = Cell::from((r_idx + 1).to_string());
        cells.push(number.style(Style::default().fg(Color::DarkGray)));
        for (c_idx, val) in row.cells().iter().enumerate() {
            let here = CellCoord::new(r_idx, c_idx);
            let mut style = Style::default();
            if dups.is_duplicate(r_idx, c_idx) {
                style = style.bg(Color::Yellow).fg(Color::Black);
            }
            if focus == Some(here) {
                style = style.bg(Color::Blue).fg(Color::White);
            } else if focus.is_none() && selected == here {
                style = style.add_modifier(Modifier::REVERSED);
            }
            cells.push(Cell::from(val.as_str()).style(style));
        }
        rows.push(Row::new(cells));
    }

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .column_spacing(1);

    let mut state = TableState::default();
    state.select(Some(focus.unwrap_or(selected).row));
    f.render_stateful_widget(table, area, &mut state);

    GridGeometry {
        body: Rect {
            y: inner.y.saturating_add(1),
            height: inner.height.saturating_sub(1),
            ..inner
        },
        first_row: state.offset(),
        row_count,
        column_width: data_column_width(area.width, COLUMNS.len()),
    }
}

// Evenly divide what is left after borders, spacing and the gutter.
fn data_column_width(total_width: u16, cols: usize) -> u16 {
    let w = total_width.saturating_sub(2 + cols as u16 + GUTTER_WIDTH);
    (w / cols.max(1) as u16).max(1)
}

fn column_widths(total_width: u16, cols: usize) -> Vec<Constraint> {
    if cols == 0 {
        return vec![];
    }
    let per = data_column_width(total_width, cols);
    std::iter::once(Constraint::Length(GUTTER_WIDTH))
        .chain((0..cols).map(|_| Constraint::Length(per)))
        .collect()
}
