//! `tablelog`: feed JSON-lines log records into a SQLite log table.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tl_common::LogRecord;
use tl_config::{config_json_schema, resolve_config};
use tl_core::exit_codes::ExitCode;
use tl_core::logging::{init_logging, LogFormat};
use tl_core::{LogSink, RequestOrigin, SqliteDatabase};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tablelog", version, about = "Persist structured log records into a database table")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "TABLELOG_DB", default_value = "tablelog.db")]
    db: PathBuf,

    /// Sink config file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Table prefix reported by the connection
    #[arg(long, global = true, env = "TABLELOG_PREFIX", default_value = "")]
    prefix: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read JSON-lines records from stdin and write them
    Ingest {
        /// Abort on the first record that fails
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Print the table's live columns
    Columns,
    /// Run one retention pass
    Prune,
    /// Drop the log table
    Drop {
        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file JSON Schema
    Schema,
}

/// One input line: a record plus optional request origin.
#[derive(Debug, Deserialize)]
struct IngestLine {
    #[serde(flatten)]
    record: LogRecord,
    #[serde(default)]
    origin: RequestOrigin,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tablelog: {err}");
            ExitCode::for_error(&err)
        }
    };
    process::exit(code.as_i32());
}

fn open_sink(cli: &Cli) -> Result<LogSink, tl_common::Error> {
    let resolved = resolve_config(cli.config.as_deref())?;
    info!(source = ?resolved.source, "loaded sink config");
    let db = Arc::new(SqliteDatabase::open(&cli.db, cli.prefix.clone())?);
    Ok(LogSink::new(db, resolved.config)?)
}

fn print_json(value: &serde_json::Value) -> Result<(), tl_common::Error> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode, tl_common::Error> {
    match &cli.command {
        Command::Ingest { stop_on_error } => {
            let sink = open_sink(&cli)?;
            ingest(&sink, *stop_on_error)
        }
        Command::Columns => {
            let sink = open_sink(&cli)?;
            let columns = sink.live_columns()?;
            print_json(&json!({ "table": sink.table_name(), "columns": columns }))?;
            Ok(ExitCode::Clean)
        }
        Command::Prune => {
            let sink = open_sink(&cli)?;
            let deleted = sink.truncate_now()?;
            print_json(&json!({ "table": sink.table_name(), "deleted": deleted }))?;
            Ok(ExitCode::Clean)
        }
        Command::Drop { yes } => {
            let sink = open_sink(&cli)?;
            if !yes {
                eprintln!(
                    "tablelog: refusing to drop {} without --yes",
                    sink.table_name()
                );
                return Ok(ExitCode::Refused);
            }
            sink.drop_table()?;
            print_json(&json!({ "table": sink.table_name(), "dropped": true }))?;
            Ok(ExitCode::Clean)
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let resolved = resolve_config(cli.config.as_deref())?;
                print_json(&json!({
                    "source": resolved.source.path().map(|p| p.display().to_string()),
                    "config": serde_json::to_value(&resolved.config)?,
                }))?;
                Ok(ExitCode::Clean)
            }
            ConfigAction::Schema => {
                print_json(&config_json_schema())?;
                Ok(ExitCode::Clean)
            }
        },
    }
}

fn ingest(sink: &LogSink, stop_on_error: bool) -> Result<ExitCode, tl_common::Error> {
    let stdin = io::stdin().lock();
    let mut written = 0u64;
    let mut failed = 0u64;

    for (idx, line) in stdin.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let parsed: IngestLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                if stop_on_error {
                    return Err(err.into());
                }
                warn!(line = line_no, error = %err, "skipping unparseable record");
                failed += 1;
                continue;
            }
        };

        match sink.write_with_origin(&parsed.record, &parsed.origin) {
            Ok(()) => written += 1,
            Err(err) => {
                if stop_on_error {
                    return Err(err.into());
                }
                error!(line = line_no, error = %err, "failed to write record");
                failed += 1;
            }
        }
    }

    print_json(&json!({
        "table": sink.table_name(),
        "written": written,
        "failed": failed,
    }))?;
    Ok(if failed > 0 {
        ExitCode::PartialFail
    } else {
        ExitCode::Clean
    })
}
