//! Relational symbol table on SQLite.
//!
//! Rows are namespaced by configuration name and numbered per
//! configuration, so rewriting one configuration yields the same ids every
//! time and never disturbs the others.

use ir::{Context, Diagnostics, MacroCall, MacroDefinition, SymbolRow, Trace, TraceHop, WarningKind};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symbol_table (
    configuration TEXT NOT NULL,
    id INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    line_number INTEGER,
    node_id INTEGER,
    PRIMARY KEY (configuration, id)
);
CREATE INDEX IF NOT EXISTS idx_symbol_config_node ON symbol_table(configuration, node_id);

CREATE TABLE IF NOT EXISTS macro_definitions (
    configuration TEXT NOT NULL,
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    symbol_id INTEGER NOT NULL,
    PRIMARY KEY (configuration, id),
    UNIQUE (configuration, name)
);

CREATE TABLE IF NOT EXISTS macro_calls (
    configuration TEXT NOT NULL,
    id INTEGER NOT NULL,
    node_id INTEGER NOT NULL,
    macro_definition_id INTEGER NOT NULL,
    symbol_id INTEGER NOT NULL,
    PRIMARY KEY (configuration, id)
);
CREATE INDEX IF NOT EXISTS idx_macrocall_config_node ON macro_calls(configuration, node_id);
";

/// Rows written by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCounts {
    pub symbols: i64,
    pub definitions: i64,
    pub calls: i64,
}

pub struct SymbolStore {
    conn: Connection,
}

impl SymbolStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Starts rewriting `configuration`. Its previous rows are deleted inside
    /// the same transaction, so nothing changes unless the writer commits.
    pub fn begin(&mut self, configuration: &str) -> Result<SymbolWriter<'_>> {
        let tx = self.conn.transaction()?;
        for table in ["macro_calls", "macro_definitions", "symbol_table"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE configuration = ?1"),
                params![configuration],
            )?;
        }
        Ok(SymbolWriter {
            tx,
            configuration: configuration.to_string(),
            counts: SymbolCounts::default(),
            definitions: HashMap::new(),
        })
    }

    /// Configurations with at least one symbol row.
    pub fn configurations(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT configuration FROM symbol_table ORDER BY configuration")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn rows(&self, configuration: &str) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_path, line_number, node_id FROM symbol_table
             WHERE configuration = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![configuration], symbol_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn macro_definitions(&self, configuration: &str) -> Result<Vec<MacroDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, symbol_id FROM macro_definitions
             WHERE configuration = ?1 ORDER BY id",
        )?;
        let defs = stmt
            .query_map(params![configuration], |row| {
                Ok(MacroDefinition {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    symbol_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    pub fn macro_calls(&self, configuration: &str) -> Result<Vec<MacroCall>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, node_id, macro_definition_id, symbol_id FROM macro_calls
             WHERE configuration = ?1 ORDER BY id",
        )?;
        let calls = stmt
            .query_map(params![configuration], |row| {
                Ok(MacroCall {
                    id: row.get(0)?,
                    node_id: row.get::<_, i64>(1)? as u64,
                    macro_definition_id: row.get(2)?,
                    symbol_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(calls)
    }

    /// Provenance of directive `node_id`: its origin row and its macro hops,
    /// innermost first.
    pub fn trace(&self, configuration: &str, node_id: u64) -> Result<Option<Trace>> {
        let origin = self
            .conn
            .query_row(
                "SELECT id, file_path, line_number, node_id FROM symbol_table
                 WHERE configuration = ?1 AND node_id = ?2 ORDER BY id LIMIT 1",
                params![configuration, node_id as i64],
                symbol_row,
            )
            .optional()?;
        let Some(origin) = origin else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT md.name, ds.file_path, ds.line_number, us.file_path, us.line_number
             FROM macro_calls mc
             JOIN macro_definitions md
               ON md.configuration = mc.configuration AND md.id = mc.macro_definition_id
             JOIN symbol_table ds
               ON ds.configuration = md.configuration AND ds.id = md.symbol_id
             JOIN symbol_table us
               ON us.configuration = mc.configuration AND us.id = mc.symbol_id
             WHERE mc.configuration = ?1 AND mc.node_id = ?2
             ORDER BY mc.id",
        )?;
        let hops = stmt
            .query_map(params![configuration, node_id as i64], |row| {
                Ok(TraceHop {
                    macro_name: row.get(0)?,
                    definition_file: row.get(1)?,
                    definition_line: row.get(2)?,
                    use_file: row.get(3)?,
                    use_line: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(Trace {
            node_id,
            origin,
            hops,
        }))
    }
}

fn symbol_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRow> {
    Ok(SymbolRow {
        id: row.get(0)?,
        file_path: row.get(1)?,
        line_number: row.get(2)?,
        node_id: row.get::<_, Option<i64>>(3)?.map(|n| n as u64),
    })
}

/// Absolute position of a context: a file line, or a macro body offset
/// added to the line the macro is defined on.
fn position(ctx: &Context) -> Option<(&str, Option<i64>)> {
    match ctx {
        Context::Line(_) => None,
        Context::File(f) => Some((&f.file_path, f.line_num.map(i64::from))),
        Context::Macro(m) => Some((
            &m.definition.file_path,
            m.definition
                .line_num
                .map(|def| i64::from(def) + i64::from(m.line_num.unwrap_or(0))),
        )),
    }
}

/// Open transaction rewriting one configuration. Dropping it without
/// [`SymbolWriter::commit`] rolls everything back.
pub struct SymbolWriter<'conn> {
    tx: Transaction<'conn>,
    configuration: String,
    counts: SymbolCounts,
    definitions: HashMap<String, i64>,
}

impl SymbolWriter<'_> {
    pub fn counts(&self) -> SymbolCounts {
        self.counts
    }

    fn insert_symbol(&mut self, file_path: &str, line: Option<i64>, node_id: Option<u64>) -> Result<i64> {
        self.counts.symbols += 1;
        let id = self.counts.symbols;
        self.tx
            .prepare_cached(
                "INSERT INTO symbol_table (configuration, id, file_path, line_number, node_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                self.configuration,
                id,
                file_path,
                line,
                node_id.map(|n| n as i64)
            ])?;
        Ok(id)
    }

    /// Id of the definition row of `name`, inserting it on first sight.
    fn definition(&mut self, name: &str, file_path: &str, line: Option<i64>) -> Result<i64> {
        if let Some(&id) = self.definitions.get(name) {
            return Ok(id);
        }
        let symbol_id = self.insert_symbol(file_path, line, None)?;
        self.counts.definitions += 1;
        let id = self.counts.definitions;
        self.tx
            .prepare_cached(
                "INSERT INTO macro_definitions (configuration, id, name, symbol_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![self.configuration, id, name, symbol_id])?;
        self.definitions.insert(name.to_string(), id);
        Ok(id)
    }

    /// Records the origin of directive `node_id` and every macro hop of its
    /// context.
    pub fn record(&mut self, node_id: u64, context: &Context, diag: &mut Diagnostics) -> Result<()> {
        let mut first = true;
        let mut ptr = context;
        loop {
            match ptr {
                // Unlinked directive, nothing to record.
                Context::Line(_) => break,
                Context::File(f) => {
                    if first {
                        self.insert_symbol(&f.file_path, f.line_num.map(i64::from), Some(node_id))?;
                    }
                    break;
                }
                Context::Macro(m) => {
                    let def_line = m.definition.line_num.map(i64::from);
                    let def_id = self.definition(&m.macro_name, &m.definition.file_path, def_line)?;
                    if first {
                        if let Some((file, line)) = position(ptr) {
                            self.insert_symbol(file, line, Some(node_id))?;
                        }
                        first = false;
                    }
                    let Some((use_file, use_line)) = position(&m.used_in) else {
                        warn!(node_id, macro_name = %m.macro_name, "Macro use site has no file");
                        diag.warn(
                            WarningKind::MalformedContext,
                            Some(node_id),
                            format!("macro '{}' used from a bare line reference", m.macro_name),
                        );
                        break;
                    };
                    let use_id = self.insert_symbol(use_file, use_line, None)?;
                    self.counts.calls += 1;
                    self.tx
                        .prepare_cached(
                            "INSERT INTO macro_calls
                             (configuration, id, node_id, macro_definition_id, symbol_id)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                        )?
                        .execute(params![
                            self.configuration,
                            self.counts.calls,
                            node_id as i64,
                            def_id,
                            use_id
                        ])?;
                    ptr = &m.used_in;
                }
            }
        }
        Ok(())
    }

    pub fn commit(self) -> Result<SymbolCounts> {
        let counts = self.counts;
        self.tx.commit()?;
        debug!(
            configuration = %self.configuration,
            symbols = counts.symbols,
            definitions = counts.definitions,
            calls = counts.calls,
            "Symbol table committed"
        );
        Ok(counts)
    }
}
