use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};

mod app;
mod db;
mod duplicates;
mod grid;
mod logging;
mod nav;
mod paste;
mod ui;

use app::App;
use db::{Store, StoreRequest, start_store_worker};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keyword grid editor with duplicate highlighting")]
struct Args {
    /// SQLite file the worksheet is saved to
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Rows appended by the add-rows command (+)
    #[arg(short = 'n', long, default_value_t = 10)]
    add_rows: usize,

    /// Directory for log files (defaults to the database's directory)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("wordgrid").join("wordgrid.db"))
        .unwrap_or_else(|| PathBuf::from("wordgrid.db"))
}

fn open_store(path: &Path) -> Result<Store> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Store::open(path)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let db_path = args.db.clone().unwrap_or_else(default_db_path);
    let log_dir = args.log_dir.clone().unwrap_or_else(|| {
        db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let _log_guard = match logging::init(&log_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Could not initialize file logging: {e}");
            None
        }
    };
    tracing::info!(db = %db_path.display(), "starting");

    // Seed the worksheet once, then hand the store to the writer thread
    let (store, sheet, startup_note) = match open_store(&db_path) {
        Ok(store) => {
            let sheet = db::load_worksheet(&store);
            (Some(store), sheet, None)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not open store; changes will not be saved");
            (
                None,
                grid::Worksheet::default(),
                Some(format!("Could not open {}; changes will not be saved", db_path.display())),
            )
        }
    };

    let (req_tx, req_rx) = crossbeam_channel::unbounded::<StoreRequest>();
    let writer = std::thread::spawn(move || start_store_worker(store, req_rx));

    let mut terminal = setup_terminal()?;

    let mut app = App::new(sheet, args.add_rows, req_tx);
    if let Some(note) = startup_note {
        app.status = note;
    }

    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(250);

    let res = run_app(&mut terminal, &mut app, tick_rate, &mut last_tick);

    let restored = restore_terminal(terminal);

    // Closing the channel lets the writer drain and exit; the last snapshot
    // must land before any terminal error is reported
    drop(app);
    if writer.join().is_err() {
        tracing::warn!("store writer panicked");
    }
    tracing::info!("stopped");

    if let Err(e) = res {
        eprintln!("Error: {e:?}");
    }
    restored
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
    last_tick: &mut Instant,
) -> Result<()> {
    // Redraw only when state changes or on tick
    let mut dirty = true;
    let mut grid = ui::GridGeometry::default();
    loop {
        let tick_due = last_tick.elapsed() >= tick_rate;
        if dirty || tick_due {
            terminal.draw(|f| grid = ui::draw(f, app))?;
            dirty = false;
            if tick_due {
                *last_tick = Instant::now();
            }
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    if app.is_editing() {
                        handle_key_editing(app, key);
                    } else {
                        handle_key_normal(app, key);
                    }
                    dirty = true;
                }
                Event::Paste(text) => {
                    app.paste_text(&text);
                    dirty = true;
                }
                Event::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
                    app.click_cell(grid.cell_at(mouse.column, mouse.row));
                    dirty = true;
                }
                Event::Resize(..) => dirty = true,
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key_normal(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char('v') = key.code {
            app.paste_from_clipboard();
        }
        return;
    }
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Up | KeyCode::Char('k') => app.move_up(),
        KeyCode::Down | KeyCode::Char('j') => app.move_down(),
        KeyCode::Left | KeyCode::Char('h') => app.move_left(),
        KeyCode::Right | KeyCode::Char('l') => app.move_right(),
        KeyCode::Enter | KeyCode::Char('e') => app.begin_edit_cell(),
        KeyCode::Char('+') => app.append_rows(),
        KeyCode::Char('c') => app.copy_current_cell_tsv(),
        KeyCode::Char('C') => app.copy_current_row_tsv(),
        _ => {}
    }
}

fn handle_key_editing(app: &mut App, key: KeyEvent) {
    use crossterm::event::KeyCode::*;

    match key.code {
        Enter => app.advance_on_confirm(),
        Tab => app.advance_on_step(true),
        BackTab => app.advance_on_step(false),
        Esc => app.blur(),
        Up => app.move_up(),
        Down => app.move_down(),
        Backspace => app.edit_input_backspace(),
        Delete => app.edit_input_delete(),
        Left => app.edit_input_left(),
        Right => app.edit_input_right(),
        Home => app.edit_input_home(),
        End => app.edit_input_end(),
        Char('v') if key.modifiers.contains(KeyModifiers::CONTROL) => app.paste_from_clipboard(),
        Char(c) => {
            // ignore control chars in insert
            if !key.modifiers.contains(KeyModifiers::CONTROL) {
                app.edit_input_insert(c);
            }
        }
        _ => {}
    }
}
