//! duckrpc CLI - Talk to a query engine from the shell
//!
//! Usage:
//!   duckrpc exec <db> <sql> [-p <json>]...
//!   duckrpc query <db> <sql> [-p <json>]... [--chunk-size <n>]
//!   duckrpc one <db> <sql> [-p <json>]...
//!   duckrpc value <db> <sql> [-p <json>]...
//!   duckrpc all <db> <sql> [-p <json>]...
//!   duckrpc load <db> <table> [file]
//!
//! Examples:
//!   duckrpc exec t.db "create table t (i integer, s varchar)"
//!   printf '[1,"a"]\n[2,"b"]\n' | duckrpc load t.db t
//!   duckrpc query t.db "select * from t where i > ?" -p 0

use clap::{Args, Parser, Subcommand};
use duckrpc::{Connection, RpcError, Settings};
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rows sent to the engine per append request by `load`.
const LOAD_BATCH: usize = 1000;

#[derive(Parser)]
#[command(name = "duckrpc")]
#[command(about = "duckrpc - Query an engine process over its line protocol")]
#[command(version)]
struct Cli {
    /// Config file (defaults to DUCKRPC_CONFIG, ./duckrpc.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Engine binary, overriding the config
    #[arg(short, long, global = true)]
    engine: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Statement {
    /// Database to open
    db: String,

    /// SQL text
    sql: String,

    /// Positional parameter as JSON (repeatable; bare words are strings)
    #[arg(short, long = "param")]
    params: Vec<String>,
}

impl Statement {
    fn params(&self) -> Vec<Value> {
        self.params
            .iter()
            .map(|p| serde_json::from_str(p).unwrap_or_else(|_| Value::String(p.clone())))
            .collect()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a statement that returns no rows
    Exec(Statement),

    /// Stream query results as NDJSON
    Query {
        #[command(flatten)]
        statement: Statement,

        /// Rows per fetch (overrides cursor.chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Print the first row of a query
    One(Statement),

    /// Print the first value of the first row of a query
    Value(Statement),

    /// Fetch a whole (small) result set in one response
    All(Statement),

    /// Append NDJSON rows (one JSON array per line) to a table
    ///
    /// Rows go to the engine in batches. If a later line fails, the batches
    /// already sent are still committed before the command exits with an error.
    Load {
        /// Database to open
        db: String,

        /// Target table
        table: String,

        /// Input file (stdin if omitted)
        file: Option<PathBuf>,
    },
}

impl Commands {
    fn db(&self) -> &str {
        match self {
            Commands::Exec(s) | Commands::One(s) | Commands::Value(s) | Commands::All(s) => &s.db,
            Commands::Query { statement, .. } => &statement.db,
            Commands::Load { db, .. } => db,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {source}")]
    Input {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duckrpc=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path).map_err(RpcError::from)?,
        None => Settings::load().map_err(RpcError::from)?,
    };
    if let Some(engine) = cli.engine {
        settings.engine.path = Some(engine);
    }

    let conn = Connection::open(cli.command.db(), &settings)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match &cli.command {
        Commands::Exec(s) => conn.execute(&s.sql, &s.params())?,
        Commands::Query {
            statement,
            chunk_size,
        } => {
            let mut cursor = conn.select(&statement.sql, &statement.params())?;
            let size = chunk_size.unwrap_or(conn.chunk_size()).max(1);
            while let Some(chunk) = cursor.fetch_chunk(size)? {
                for row in &chunk {
                    write_json(&mut out, row)?;
                }
                // Flush per chunk so a slow consumer sees progress.
                out.flush()?;
            }
        }
        Commands::One(s) => match conn.select_one(&s.sql, &s.params())? {
            Some(row) => write_json(&mut out, &row)?,
            None => writeln!(out, "null")?,
        },
        Commands::Value(s) => write_json(&mut out, &conn.select_value(&s.sql, &s.params())?)?,
        Commands::All(s) => {
            for row in conn.select_all(&s.sql, &s.params())? {
                write_json(&mut out, &row)?;
            }
        }
        Commands::Load { table, file, .. } => {
            let input: Box<dyn BufRead> = match file {
                Some(path) => Box::new(BufReader::new(File::open(path)?)),
                None => Box::new(io::stdin().lock()),
            };
            let count = load(&conn, table, input)?;
            eprintln!("Appended {} rows to {}", count, table);
        }
    }

    out.flush()?;
    Ok(())
}

fn load(conn: &Connection, table: &str, input: Box<dyn BufRead>) -> Result<usize, CliError> {
    let mut appender = conn.appender(table)?;
    let mut batch: Vec<Value> = Vec::with_capacity(LOAD_BATCH);
    let mut count = 0;

    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Value = serde_json::from_str(&line).map_err(|source| CliError::Input {
            line: i + 1,
            source,
        })?;
        batch.push(row);
        if batch.len() == LOAD_BATCH {
            appender.insert_rows(&batch)?;
            count += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        appender.insert_rows(&batch)?;
        count += batch.len();
    }

    appender.commit()?;
    Ok(count)
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value).map_err(io::Error::from)?;
    writeln!(out)?;
    Ok(())
}
