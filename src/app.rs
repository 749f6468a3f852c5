use crossbeam_channel::Sender;

use crate::db::StoreRequest;
use crate::duplicates::{DuplicateCache, DuplicateIndex};
use crate::grid::{COLUMN_COUNT, CellCoord, Worksheet};
use crate::nav::{Focus, Navigator};
use crate::paste;

const NORMAL_STATUS: &str = "Press q to quit. Enter to edit. Tab/Shift+Tab to step. + to add rows.";

pub struct App {
    pub should_quit: bool,

    // UI state
    pub status: String,

    // Data
    sheet: Worksheet,
    duplicates: DuplicateCache,

    // Focus and selection
    nav: Navigator,
    /// Highlighted cell while nothing is focused; follows focus otherwise
    pub selected: CellCoord,
    /// Byte offset of the text cursor inside the focused cell
    pub edit_cursor: usize,

    /// Rows appended by the bulk add command
    pub add_rows: usize,

    // Channels
    pub req_tx: Sender<StoreRequest>,
}

impl App {
    pub fn new(sheet: Worksheet, add_rows: usize, req_tx: Sender<StoreRequest>) -> Self {
        Self {
            should_quit: false,
            status: NORMAL_STATUS.into(),
            sheet,
            duplicates: DuplicateCache::new(),
            nav: Navigator::new(),
            selected: CellCoord::new(0, 0),
            edit_cursor: 0,
            add_rows,
            req_tx,
        }
    }

    pub fn sheet(&self) -> &Worksheet {
        &self.sheet
    }

    pub fn focus(&self) -> Focus {
        self.nav.focus()
    }

    pub fn is_editing(&self) -> bool {
        self.nav.focus() != Focus::NoFocus
    }

    /// Duplicate index for the current worksheet snapshot.
    pub fn duplicates(&mut self) -> &DuplicateIndex {
        self.duplicates.get(&self.sheet)
    }

    /// Worksheet together with its up-to-date duplicate index, for rendering.
    pub fn view(&mut self) -> (&Worksheet, &DuplicateIndex) {
        let index = self.duplicates.get(&self.sheet);
        (&self.sheet, index)
    }

    // Write-through after every committed mutation; a closed channel only
    // means the writer has gone away.
    fn persist_if_changed(&mut self, before: u64) {
        if self.sheet.version() == before {
            return;
        }
        if self.req_tx.send(StoreRequest::Save(self.sheet.clone())).is_err() {
            tracing::warn!("store writer unavailable; change kept in memory only");
        }
    }

    fn sync_after_focus(&mut self) {
        if let Focus::FocusedAt(at) = self.nav.focus() {
            self.selected = at;
            self.edit_cursor = self.cell_text(at).len();
        }
    }

    fn cell_text(&self, at: CellCoord) -> &str {
        self.sheet.get(at.row, at.col).unwrap_or_default()
    }

    // ===== Navigation =====

    pub fn focus_cell(&mut self, row: isize, col: isize) {
        let before = self.sheet.version();
        self.nav.focus_cell(&mut self.sheet, row, col);
        self.sync_after_focus();
        self.persist_if_changed(before);
    }

    pub fn begin_edit_cell(&mut self) {
        let at = self.selected;
        self.focus_cell(at.row as isize, at.col as isize);
        self.status = "Editing: Enter to move down, Tab to step, Esc to leave".into();
    }

    pub fn advance_on_confirm(&mut self) {
        let before = self.sheet.version();
        self.nav.advance_on_confirm(&mut self.sheet);
        self.sync_after_focus();
        self.persist_if_changed(before);
    }

    pub fn advance_on_step(&mut self, forward: bool) {
        let before = self.sheet.version();
        self.nav.advance_on_step(&mut self.sheet, forward);
        self.sync_after_focus();
        self.persist_if_changed(before);
    }

    /// Leave edit mode. Text was already committed keystroke by keystroke.
    pub fn blur(&mut self) {
        self.nav.blur_if_outside(None);
        self.status = NORMAL_STATUS.into();
    }

    /// Mouse click: focus the cell under the pointer, or leave edit mode
    /// when the click landed outside the grid.
    pub fn click_cell(&mut self, target: Option<CellCoord>) {
        self.nav.blur_if_outside(target);
        let Some(at) = target else {
            self.status = NORMAL_STATUS.into();
            return;
        };
        self.selected = at;
        self.begin_edit_cell();
    }

    pub fn move_up(&mut self) {
        match self.nav.focus() {
            Focus::FocusedAt(at) => self.focus_cell(at.row as isize - 1, at.col as isize),
            Focus::NoFocus => self.selected.row = self.selected.row.saturating_sub(1),
        }
    }

    pub fn move_down(&mut self) {
        match self.nav.focus() {
            Focus::FocusedAt(at) => self.focus_cell(at.row as isize + 1, at.col as isize),
            Focus::NoFocus if !self.sheet.is_empty() => {
                let last = self.sheet.len() - 1;
                self.selected.row = (self.selected.row + 1).min(last);
            }
            Focus::NoFocus => {}
        }
    }

    pub fn move_left(&mut self) {
        if !self.is_editing() {
            self.selected.col = self.selected.col.saturating_sub(1);
        }
    }

    pub fn move_right(&mut self) {
        if !self.is_editing() {
            self.selected.col = (self.selected.col + 1).min(COLUMN_COUNT - 1);
        }
    }

    // ===== Bulk edits =====

    pub fn append_rows(&mut self) {
        let before = self.sheet.version();
        self.sheet.append_rows(self.add_rows);
        self.status = format!("Added {} rows ({} total)", self.add_rows, self.sheet.len());
        self.persist_if_changed(before);
    }

    /// Paste tab/line separated text at the focused cell, or at the
    /// selection when nothing is focused.
    pub fn paste_text(&mut self, text: &str) {
        let Some(grid) = paste::parse(text) else {
            self.status = "Nothing to paste".into();
            return;
        };
        let origin = self.nav.focus().cell().unwrap_or(self.selected);
        let before = self.sheet.version();
        let written = paste::apply(&mut self.sheet, origin, &grid);
        if let Some(at) = self.nav.focus().cell() {
            self.edit_cursor = self.edit_cursor.min(self.cell_text(at).len());
            while !self.cell_text(at).is_char_boundary(self.edit_cursor) {
                self.edit_cursor -= 1;
            }
        }
        self.status = format!("Pasted {} cells", written);
        self.persist_if_changed(before);
    }

    pub fn paste_from_clipboard(&mut self) {
        match read_clipboard() {
            Some(text) => self.paste_text(&text),
            None => self.status = "Clipboard unavailable (no paste tool found)".into(),
        }
    }

    // ===== Editing buffer ops =====

    fn update_focused_cell(&mut self, edit: impl FnOnce(&mut String, &mut usize)) {
        let Focus::FocusedAt(at) = self.nav.focus() else {
            return;
        };
        let mut text = self.cell_text(at).to_string();
        let mut cursor = self.edit_cursor.min(text.len());
        edit(&mut text, &mut cursor);
        self.edit_cursor = cursor;
        if text == self.cell_text(at) {
            return;
        }
        let before = self.sheet.version();
        if let Err(e) = self.sheet.set(at.row, at.col, text) {
            tracing::warn!(error = %e, "edit dropped");
        }
        self.persist_if_changed(before);
    }

    pub fn edit_input_insert(&mut self, ch: char) {
        self.update_focused_cell(|text, cursor| {
            text.insert(*cursor, ch);
            *cursor += ch.len_utf8();
        });
    }

    pub fn edit_input_backspace(&mut self) {
        self.update_focused_cell(|text, cursor| {
            if *cursor > 0 {
                let prev = prev_char_boundary(text, *cursor);
                text.drain(prev..*cursor);
                *cursor = prev;
            }
        });
    }

    pub fn edit_input_delete(&mut self) {
        self.update_focused_cell(|text, cursor| {
            if *cursor < text.len() {
                let next = next_char_boundary(text, *cursor);
                text.drain(*cursor..next);
            }
        });
    }

    pub fn edit_input_left(&mut self) {
        self.update_focused_cell(|text, cursor| *cursor = prev_char_boundary(text, *cursor));
    }

    pub fn edit_input_right(&mut self) {
        self.update_focused_cell(|text, cursor| *cursor = next_char_boundary(text, *cursor));
    }

    pub fn edit_input_home(&mut self) {
        self.update_focused_cell(|_, cursor| *cursor = 0);
    }

    pub fn edit_input_end(&mut self) {
        self.update_focused_cell(|text, cursor| *cursor = text.len());
    }

    // ===== Copy to clipboard (TSV) =====

    /// Copy the selected cell's text to the clipboard.
    pub fn copy_current_cell_tsv(&mut self) {
        let cell = self.cell_text(self.selected).to_string();
        self.copy_to_clipboard(cell, "cell");
    }

    /// Copy the selected row as one tab-separated line.
    pub fn copy_current_row_tsv(&mut self) {
        let line = self
            .sheet
            .rows()
            .get(self.selected.row)
            .map(|row| row.cells().join("\t"))
            .unwrap_or_default();
        self.copy_to_clipboard(line, "row");
    }

    fn copy_to_clipboard(&mut self, content: String, label: &str) {
        let candidates: &[(&str, &[&str])] = &[
            // macOS
            ("pbcopy", &[]),
            // Wayland
            ("wl-copy", &[]),
            // X11
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
            // Windows
            ("clip", &[]),
        ];
        for (prog, args) in candidates {
            if write_clipboard_prog(prog, args, &content) {
                self.status = format!("Copied {} to clipboard via {}", label, prog);
                return;
            }
        }
        self.status = format!("Could not copy {} (no clipboard tool found)", label);
    }

    /// Text of the selected cell (for the status line).
    pub fn current_cell_text(&self) -> &str {
        self.cell_text(self.selected)
    }
}

fn write_clipboard_prog(prog: &str, args: &[&str], content: &str) -> bool {
    match std::process::Command::new(prog)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                use std::io::Write;
                let _ = stdin.write_all(content.as_bytes());
            }
            if let Ok(status) = child.wait() {
                return status.success();
            }
            false
        }
        Err(_) => false,
    }
}

/// Read plain text from the first clipboard tool that answers.
fn read_clipboard() -> Option<String> {
    let candidates: &[(&str, &[&str])] = &[
        ("pbpaste", &[]),
        ("wl-paste", &["--no-newline"]),
        ("xclip", &["-selection", "clipboard", "-o"]),
        ("xsel", &["--clipboard", "--output"]),
        ("powershell", &["-NoProfile", "-Command", "Get-Clipboard -Raw"]),
    ];
    for (prog, args) in candidates {
        let Ok(out) = std::process::Command::new(prog)
            .args(*args)
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
        else {
            continue;
        };
        if out.status.success() {
            tracing::debug!(tool = prog, bytes = out.stdout.len(), "clipboard read");
            return Some(String::from_utf8_lossy(&out.stdout).into_owned());
        }
    }
    None
}

fn prev_char_boundary(s: &str, idx: usize) -> usize {
    s[..idx].char_indices().next_back().map(|(i, _)| i).unwrap_or(0)
}

fn next_char_boundary(s: &str, idx: usize) -> usize {
    s[idx..].chars().next().map(|c| idx + c.len_utf8()).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Store, start_store_worker};
    use crossbeam_channel::Receiver;

    fn app() -> (App, Receiver<StoreRequest>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (App::new(Worksheet::default(), 10, tx), rx)
    }

    fn saved(rx: &Receiver<StoreRequest>) -> Vec<Worksheet> {
        rx.try_iter().map(|StoreRequest::Save(ws)| ws).collect()
    }

    #[test]
    fn focus_beyond_end_grows_and_saves() {
        let (mut app, rx) = app();
        app.focus_cell(10, 2);
        assert_eq!(app.sheet().len(), 11);
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(10, 2)));
        assert_eq!(app.selected, CellCoord::new(10, 2));
        let writes = saved(&rx);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 11);
    }

    #[test]
    fn moving_within_bounds_does_not_save() {
        let (mut app, rx) = app();
        app.focus_cell(1, 1);
        app.advance_on_step(true);
        app.blur();
        assert!(saved(&rx).is_empty());
    }

    #[test]
    fn typing_commits_every_keystroke() {
        let (mut app, rx) = app();
        app.focus_cell(0, 4);
        for ch in "Paré".chars() {
            app.edit_input_insert(ch);
        }
        assert_eq!(app.sheet().get(0, 4), Ok("Paré"));
        assert_eq!(saved(&rx).len(), 4);

        app.edit_input_left();
        app.edit_input_backspace();
        assert_eq!(app.sheet().get(0, 4), Ok("Paé"));
        app.edit_input_home();
        app.edit_input_delete();
        app.edit_input_end();
        app.edit_input_insert('!');
        assert_eq!(app.sheet().get(0, 4), Ok("aé!"));

        app.blur();
        assert_eq!(app.focus(), Focus::NoFocus);
        assert_eq!(app.sheet().get(0, 4), Ok("aé!"));
    }

    #[test]
    fn typing_without_focus_is_ignored() {
        let (mut app, rx) = app();
        app.edit_input_insert('x');
        assert_eq!(app.sheet().get(0, 0), Ok(""));
        assert!(saved(&rx).is_empty());
    }

    #[test]
    fn duplicates_follow_edits() {
        let (mut app, _rx) = app();
        app.focus_cell(0, 4);
        app.paste_text(" Paris ");
        app.focus_cell(1, 4);
        app.paste_text("paris");
        assert!(app.duplicates().is_duplicate(0, 4));
        assert!(app.duplicates().is_duplicate(1, 4));
        app.edit_input_end();
        app.edit_input_backspace();
        assert!(!app.duplicates().is_duplicate(0, 4));
        assert_eq!(app.duplicates().duplicate_cell_count(), 0);
    }

    #[test]
    fn paste_uses_selection_without_focus() {
        let (mut app, rx) = app();
        app.selected = CellCoord::new(7, 7);
        app.paste_text("a\tb\tc\nd");
        assert_eq!(app.sheet().get(7, 7), Ok("a"));
        assert_eq!(app.sheet().get(7, 8), Ok("b"));
        assert_eq!(app.sheet().get(8, 7), Ok("d"));
        assert_eq!(app.sheet().len(), 9);
        assert_eq!(app.status, "Pasted 3 cells");
        assert_eq!(saved(&rx).len(), 1);
    }

    #[test]
    fn empty_paste_changes_nothing() {
        let (mut app, rx) = app();
        app.paste_text("");
        assert_eq!(app.status, "Nothing to paste");
        assert!(saved(&rx).is_empty());
    }

    #[test]
    fn paste_into_focused_cell_keeps_cursor_valid() {
        let (mut app, _rx) = app();
        app.focus_cell(0, 0);
        for ch in "longer text".chars() {
            app.edit_input_insert(ch);
        }
        app.paste_text("é");
        app.edit_input_insert('x');
        assert_eq!(app.sheet().get(0, 0), Ok("éx"));
    }

    #[test]
    fn append_rows_uses_configured_count() {
        let (mut app, rx) = app();
        app.append_rows();
        assert_eq!(app.sheet().len(), 18);
        assert_eq!(saved(&rx).len(), 1);
    }

    #[test]
    fn selection_stays_in_bounds_without_focus() {
        let (mut app, _rx) = app();
        app.move_up();
        app.move_left();
        assert_eq!(app.selected, CellCoord::new(0, 0));
        for _ in 0..20 {
            app.move_down();
            app.move_right();
        }
        assert_eq!(app.selected, CellCoord::new(7, 8));
        assert_eq!(app.sheet().len(), 8);
    }

    #[test]
    fn arrows_while_editing_move_focus() {
        let (mut app, _rx) = app();
        app.selected = CellCoord::new(7, 3);
        app.begin_edit_cell();
        app.move_down();
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(8, 3)));
        assert_eq!(app.sheet().len(), 9);
        app.focus_cell(0, 3);
        app.move_up();
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(0, 3)));
    }

    #[test]
    fn confirm_and_step_follow_grid_rules() {
        let (mut app, _rx) = app();
        app.focus_cell(3, 8);
        app.advance_on_step(true);
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(4, 0)));
        app.advance_on_step(false);
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(3, 8)));
        app.advance_on_confirm();
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(4, 8)));
    }

    #[test]
    fn click_focuses_cell_and_click_outside_blurs() {
        let (mut app, rx) = app();
        app.click_cell(Some(CellCoord::new(2, 5)));
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(2, 5)));
        assert_eq!(app.selected, CellCoord::new(2, 5));
        app.edit_input_insert('k');

        app.click_cell(Some(CellCoord::new(4, 0)));
        assert_eq!(app.focus(), Focus::FocusedAt(CellCoord::new(4, 0)));
        assert_eq!(app.edit_cursor, 0);

        app.click_cell(None);
        assert_eq!(app.focus(), Focus::NoFocus);
        assert_eq!(app.status, NORMAL_STATUS);
        assert_eq!(app.sheet().get(2, 5), Ok("k"));
        assert_eq!(saved(&rx).len(), 1);
    }

    #[test]
    fn edits_stay_in_memory_when_saves_fail() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let writer = std::thread::spawn(move || {
            let store = Store::open_without_table().unwrap();
            start_store_worker(Some(store), rx);
        });
        let mut app = App::new(Worksheet::default(), 10, tx);
        app.focus_cell(0, 0);
        app.edit_input_insert('k');
        app.edit_input_insert('w');
        app.focus_cell(9, 1);

        // Hang up on the writer; later edits have nowhere to go
        drop(std::mem::replace(&mut app.req_tx, crossbeam_channel::unbounded().0));
        writer.join().unwrap();
        app.edit_input_insert('!');

        assert_eq!(app.sheet().get(0, 0), Ok("kw"));
        assert_eq!(app.sheet().get(9, 1), Ok("!"));
        assert_eq!(app.sheet().len(), 10);
    }

    #[test]
    fn char_boundaries() {
        assert_eq!(prev_char_boundary("aé", 3), 1);
        assert_eq!(next_char_boundary("aé", 1), 3);
        assert_eq!(next_char_boundary("aé", 3), 3);
        assert_eq!(prev_char_boundary("", 0), 0);
    }
}
