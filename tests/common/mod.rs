//! In-process fake engine for integration tests.
//!
//! Speaks the engine line protocol over in-memory streams, keeps real
//! server-side state (tables, cursors, appender buffers) and records every
//! request so tests can assert on exactly what went over the wire.
//!
//! Understood SQL:
//! - `create table <name> (<col> <type>, ...)`
//! - `insert into <name> values (?, ...)` with positional parameters
//! - `select * from <name>`
//! - `select * from range(<n>)`
//! - `select <json literal> [as <alias>]`

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use duckrpc::{Connection, Transport};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug)]
struct OpenAppender {
    table: String,
    pending: Vec<Vec<Value>>,
}

#[derive(Default)]
struct EngineState {
    outbox: VecDeque<u8>,
    inbox: Vec<u8>,
    requests: Vec<Value>,
    lines: Vec<String>,
    next_database: i64,
    next_cursor: i64,
    next_appender: i64,
    tables: HashMap<String, Table>,
    cursors: HashMap<i64, VecDeque<Vec<Value>>>,
    appenders: HashMap<i64, OpenAppender>,
    failures: HashMap<String, String>,
    shut_down: bool,
}

/// Handle to a fake engine shared with the transports it hands out.
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    /// An engine that boots successfully.
    pub fn new() -> Self {
        Self::with_boot_line(json!({"ok": true}))
    }

    /// An engine whose readiness line reports `message`.
    pub fn failing_boot(message: &str) -> Self {
        Self::with_boot_line(json!({"ok": false, "err": message}))
    }

    fn with_boot_line(line: Value) -> Self {
        let engine = Self {
            state: Arc::new(Mutex::new(EngineState {
                next_database: 1,
                ..EngineState::default()
            })),
        };
        engine.lock().emit(line);
        engine
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    /// Add a table with rows already committed.
    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.lock().tables.insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    /// Make the next request with this method tag fail with `message`.
    pub fn fail_next(&self, method: &str, message: &str) {
        self.lock()
            .failures
            .insert(method.to_string(), message.to_string());
    }

    /// A transport whose streams are connected to this engine.
    pub fn transport(&self) -> Transport {
        Transport::from_streams(
            EngineOutput(self.state.clone()),
            EngineInput(self.state.clone()),
        )
    }

    /// Boot a transport and open `name` on it.
    pub fn connect(&self, name: &str) -> Connection {
        Connection::with_transport(self.transport(), name).unwrap()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.lock().requests.clone()
    }

    /// Every request line exactly as it arrived, without the newline.
    pub fn transcript(&self) -> String {
        self.lock().lines.join("\n")
    }

    /// Method tags of every request received, in order.
    pub fn methods(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(|r| r["@"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Number of requests received with this method tag.
    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    pub fn open_cursors(&self) -> usize {
        self.lock().cursors.len()
    }

    pub fn open_appenders(&self) -> usize {
        self.lock().appenders.len()
    }

    /// Committed rows of a table.
    pub fn table_rows(&self, name: &str) -> Vec<Vec<Value>> {
        self.lock()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }
}

struct EngineOutput(Arc<Mutex<EngineState>>);

impl Read for EngineOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        let n = buf.len().min(state.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct EngineInput(Arc<Mutex<EngineState>>);

impl Write for EngineInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        state.inbox.extend_from_slice(buf);
        while let Some(end) = state.inbox.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = state.inbox.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            state.lines.push(text);
            let request: Value = serde_json::from_slice(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            state.handle(request);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type Reply = Result<Value, String>;

impl EngineState {
    fn emit(&mut self, line: Value) {
        let mut bytes = serde_json::to_vec(&line).unwrap();
        bytes.push(b'\n');
        self.outbox.extend(bytes);
    }

    fn handle(&mut self, request: Value) {
        self.requests.push(request.clone());
        let method = request["@"].as_str().unwrap_or_default().to_string();

        let reply = match self.failures.remove(&method) {
            Some(message) => Err(message),
            None => self.dispatch(&method, &request),
        };

        let line = match reply {
            Ok(Value::Object(mut fields)) => {
                fields.insert("ok".to_string(), Value::Bool(true));
                Value::Object(fields)
            }
            Ok(_) => json!({"ok": true}),
            Err(message) => json!({"ok": false, "err": message}),
        };
        self.emit(line);
    }

    fn dispatch(&mut self, method: &str, req: &Value) -> Reply {
        match method {
            "c" => {
                let handle = self.next_database;
                self.next_database += 1;
                Ok(json!({"d": handle}))
            }
            "e" => {
                self.run(req)?;
                Ok(json!({}))
            }
            "q" => {
                let table = self.run(req)?;
                let handle = self.next_cursor;
                self.next_cursor += 1;
                self.cursors.insert(handle, table.rows.into());
                Ok(json!({"h": handle, "c": table.columns}))
            }
            "qf" => {
                let handle = req["h"].as_i64().ok_or("missing key: h")?;
                let n = req["n"].as_u64().ok_or("missing key: n")?;
                let remaining = self.cursors.get_mut(&handle).ok_or("no such handle")?;
                let mut rows = Vec::new();
                let mut eof = false;
                for _ in 0..n {
                    match remaining.pop_front() {
                        Some(row) => rows.push(row),
                        None => {
                            eof = true;
                            break;
                        }
                    }
                }
                Ok(json!({"r": rows, "eof": eof}))
            }
            "qx" => {
                let handle = req["h"].as_i64().ok_or("missing key: h")?;
                self.cursors.remove(&handle).ok_or("no such query")?;
                Ok(json!({}))
            }
            "qq" => {
                let table = self.run(req)?;
                Ok(json!({"r": table.rows, "c": table.columns}))
            }
            "a" => {
                let table = req["t"].as_str().ok_or("missing key: t")?;
                if !self.tables.contains_key(table) {
                    return Err(format!("Catalog Error: Table with name {} does not exist!", table));
                }
                let handle = self.next_appender;
                self.next_appender += 1;
                self.appenders.insert(
                    handle,
                    OpenAppender {
                        table: table.to_string(),
                        pending: Vec::new(),
                    },
                );
                Ok(json!({"h": handle}))
            }
            "ai" => {
                let handle = req["h"].as_i64().ok_or("missing key: h")?;
                let appender = self.appenders.get(&handle).ok_or("no such appender")?;
                let width = self.tables[&appender.table].columns.len();
                let rows = req["r"].as_array().ok_or("missing key: r")?;
                let mut accepted = Vec::new();
                for row in rows {
                    match row.as_array() {
                        Some(values) if values.len() == width => accepted.push(values.clone()),
                        Some(values) => {
                            // The engine drops a sink whose append failed.
                            self.appenders.remove(&handle);
                            return Err(format!(
                                "append: expected {} values per row, but got {}",
                                width,
                                values.len()
                            ));
                        }
                        None => {
                            self.appenders.remove(&handle);
                            return Err("append: row is not an array".to_string());
                        }
                    }
                }
                if let Some(appender) = self.appenders.get_mut(&handle) {
                    appender.pending.extend(accepted);
                }
                Ok(json!({}))
            }
            "ax" => {
                let handle = req["h"].as_i64().ok_or("missing key: h")?;
                let appender = self.appenders.remove(&handle).ok_or("no such appender")?;
                if let Some(table) = self.tables.get_mut(&appender.table) {
                    table.rows.extend(appender.pending);
                }
                Ok(json!({}))
            }
            "x" => {
                self.shut_down = true;
                Ok(json!({}))
            }
            other => Err(format!("unknown command: {}", other)),
        }
    }

    /// Evaluate the statement in a request, returning its result set.
    fn run(&mut self, req: &Value) -> Result<Table, String> {
        let sql = req["q"].as_str().ok_or("missing key: q")?.trim();
        let params = req["p"].as_array().cloned().unwrap_or_default();
        let lower = sql.to_lowercase();

        if let Some(rest) = lower.strip_prefix("create table ") {
            let open = rest.find('(').ok_or_else(|| syntax_error(sql))?;
            let name = rest[..open].trim().to_string();
            let columns = rest[open + 1..]
                .trim_end_matches(')')
                .split(',')
                .filter_map(|def| def.split_whitespace().next())
                .map(str::to_string)
                .collect();
            self.tables.insert(name, Table { columns, rows: Vec::new() });
            return Ok(Table::default());
        }

        if let Some(rest) = lower.strip_prefix("insert into ") {
            let name = rest.split_whitespace().next().unwrap_or_default();
            let table = self
                .tables
                .get_mut(name)
                .ok_or_else(|| missing_table(name))?;
            table.rows.push(params);
            return Ok(Table::default());
        }

        if let Some(rest) = lower.strip_prefix("select * from range(") {
            let n: i64 = rest
                .trim_end_matches(')')
                .parse()
                .map_err(|_| syntax_error(sql))?;
            return Ok(Table {
                columns: vec!["range".to_string()],
                rows: (0..n).map(|i| vec![json!(i)]).collect(),
            });
        }

        if let Some(name) = lower.strip_prefix("select * from ") {
            let name = name.trim();
            return self.tables.get(name).cloned().ok_or_else(|| missing_table(name));
        }

        if lower.starts_with("select ") {
            let expr = sql[7..].trim();
            let (literal, alias) = match expr.to_lowercase().find(" as ") {
                Some(at) => (expr[..at].trim(), expr[at + 4..].trim()),
                None => (expr, expr),
            };
            let value: Value = serde_json::from_str(&literal.replace('\'', "\""))
                .map_err(|_| syntax_error(literal))?;
            return Ok(Table {
                columns: vec![alias.to_string()],
                rows: vec![vec![value]],
            });
        }

        Err(syntax_error(sql))
    }
}

fn syntax_error(sql: &str) -> String {
    let near = sql.split_whitespace().next().unwrap_or_default();
    format!("Parser Error: syntax error at or near \"{}\"", near)
}

fn missing_table(name: &str) -> String {
    format!("Catalog Error: Table with name {} does not exist!", name)
}
