use std::path::Path;

use anyhow::Result;
use crossbeam_channel::Receiver;
use rusqlite::{Connection, OptionalExtension};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::grid::{COLUMNS, Row, Worksheet};

/// Key the worksheet is stored under.
pub const WORKSHEET_KEY: &str = "wordgrid.worksheet";

/// Durable key-value byte store backed by a single SQLite table.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // safemode: faster writes
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// A store whose every read and write fails.
    #[cfg(test)]
    pub fn open_without_table() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum StoreRequest {
    /// Write this snapshot through to the store
    Save(Worksheet),
}

/// Serializes one row as an object keyed by column name, in schema order.
struct RowRecord<'a>(&'a Row);

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(COLUMNS.len()))?;
        for (name, value) in COLUMNS.iter().zip(self.0.cells()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub fn encode_worksheet(sheet: &Worksheet) -> Result<Vec<u8>> {
    let records: Vec<RowRecord<'_>> = sheet.rows().iter().map(RowRecord).collect();
    Ok(serde_json::to_vec(&records)?)
}

/// Parse a stored worksheet. `None` when the payload is not a non-empty
/// array of objects.
pub fn decode_worksheet(bytes: &[u8]) -> Option<Worksheet> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    let rows = items
        .iter()
        .map(|item| item.as_object().map(row_from_object))
        .collect::<Option<Vec<_>>>()?;
    Some(Worksheet::from_rows(rows))
}

fn row_from_object(obj: &serde_json::Map<String, Value>) -> Row {
    let mut row = Row::empty();
    for (col, name) in COLUMNS.iter().enumerate() {
        let text = match obj.get(*name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string().trim().to_string(),
        };
        if let Some(cell) = row.cell_mut(col) {
            *cell = text;
        }
    }
    row
}

/// Startup read. Anything missing or unreadable yields a fresh worksheet.
pub fn load_worksheet(store: &Store) -> Worksheet {
    let bytes = match store.get(WORKSHEET_KEY) {
        Ok(Some(b)) => b,
        Ok(None) => {
            tracing::info!("no saved worksheet; starting fresh");
            return Worksheet::default();
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read saved worksheet; starting fresh");
            return Worksheet::default();
        }
    };
    match decode_worksheet(&bytes) {
        Some(sheet) => {
            tracing::info!(rows = sheet.len(), "loaded saved worksheet");
            sheet
        }
        None => {
            tracing::warn!(bytes = bytes.len(), "saved worksheet is malformed; starting fresh");
            Worksheet::default()
        }
    }
}

pub fn save_worksheet(store: &Store, sheet: &Worksheet) -> Result<()> {
    let bytes = encode_worksheet(sheet)?;
    store.put(WORKSHEET_KEY, &bytes)
}

/// Writer loop. Queued snapshots are coalesced so only the newest is
/// written; failures are logged and otherwise ignored. Returns once every
/// sender is dropped and the queue is drained.
pub fn start_store_worker(store: Option<Store>, req_rx: Receiver<StoreRequest>) {
    while let Ok(req) = req_rx.recv() {
        let StoreRequest::Save(mut sheet) = req;
        while let Ok(StoreRequest::Save(newer)) = req_rx.try_recv() {
            sheet = newer;
        }
        let Some(store) = store.as_ref() else {
            continue;
        };
        match save_worksheet(store, &sheet) {
            Ok(()) => {
                tracing::debug!(rows = sheet.len(), version = sheet.version(), "worksheet saved")
            }
            Err(e) => tracing::warn!(error = %e, "failed to save worksheet"),
        }
    }
    tracing::debug!("store worker stopped");
}
