//! tuckdb Inspect Binary
//!
//! Looks inside a tuckdb file: header summary, tables, rows, and a forced
//! checkpoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use tuckdb::{BinaryBackend, Config, EncryptionLevel, Storage};

/// tuckdb file inspector
#[derive(Parser, Debug)]
#[command(name = "tuck-inspect")]
#[command(about = "Inspect and maintain tuckdb files")]
#[command(version)]
struct Args {
    /// Database file
    path: PathBuf,

    /// Password for encrypted files
    #[arg(short, long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the header summary without loading any table
    Probe {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List tables with their columns and row counts
    Tables,

    /// Print the rows of a table
    Dump {
        /// Table name
        table: String,

        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fold the WAL into the file and start a new generation
    Checkpoint,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tuckdb=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match &args.command {
        Commands::Probe { json } => probe(&args.path, *json),
        Commands::Tables => {
            let tables = backend(args)?.load()?;
            for (name, table) in &tables {
                println!("{} ({} rows)", name, table.len());
                for column in table.columns() {
                    let mut notes = Vec::new();
                    if column.primary_key {
                        notes.push("primary key".to_string());
                    }
                    if !column.nullable {
                        notes.push("not null".to_string());
                    }
                    if column.index != tuckdb::IndexKind::None {
                        notes.push(format!("{:?} index", column.index).to_lowercase());
                    }
                    println!("  {}: {} {}", column.name, column.column_type, notes.join(", "));
                }
            }
            Ok(())
        }
        Commands::Dump { table, limit } => {
            let tables = backend(args)?.load()?;
            let table = tables
                .get(table)
                .ok_or_else(|| tuckdb::TuckError::TableNotFound(table.clone()))?;
            let rows = table.scan()?;
            let shown = limit.unwrap_or(rows.len());
            for (id, record) in rows.iter().take(shown) {
                let fields: Vec<String> = record
                    .iter()
                    .map(|(column, value)| format!("{}={}", column, value))
                    .collect();
                println!("{}: {}", id, fields.join(" "));
            }
            if shown < rows.len() {
                println!("... {} more", rows.len() - shown);
            }
            Ok(())
        }
        Commands::Checkpoint => {
            if !args.path.is_file() {
                return Err(format!("{} does not exist", args.path.display()).into());
            }
            let mut builder = Config::builder().path(&args.path);
            if let Some(password) = &args.password {
                builder = builder.encryption(file_level(&args.path)?, password.clone());
            }
            let mut storage = Storage::open(builder.build())?;
            storage.checkpoint()?;
            println!(
                "checkpointed {} (generation {}, LSN {})",
                args.path.display(),
                storage.generation(),
                storage.last_lsn()
            );
            storage.close()?;
            Ok(())
        }
    }
}

fn probe(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (recognized, summary) = BinaryBackend::probe(path)?;
    if json {
        let out = serde_json::json!({
            "recognized": recognized,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match (recognized, summary) {
        (false, _) => println!("{}: not a tuckdb file", path.display()),
        (true, None) => println!("{}: tuckdb file with no valid header", path.display()),
        (true, Some(s)) => {
            println!("engine:         {}", s.engine);
            println!("format version: {}", s.format_version);
            println!("generation:     {}", s.generation);
            println!("tables:         {}", s.table_count);
            println!("wal:            {}", if s.wal_active { "active" } else { "off" });
            println!("checkpoint LSN: {}", s.checkpoint_lsn);
            println!("encryption:     {}", s.encryption.as_deref().unwrap_or("none"));
            println!("file size:      {}", s.file_size);
            if let Some(modified) = s.modified {
                println!("modified:       {}", modified.to_rfc3339());
            }
        }
    }
    Ok(())
}

fn backend(args: &Args) -> Result<BinaryBackend, Box<dyn std::error::Error>> {
    let backend = BinaryBackend::new(&args.path);
    Ok(match &args.password {
        Some(password) => backend.with_encryption(file_level(&args.path)?, password.clone()),
        None => backend,
    })
}

/// Encryption level recorded in the header, so a rewrite keeps it
fn file_level(path: &Path) -> Result<EncryptionLevel, Box<dyn std::error::Error>> {
    let (_, summary) = BinaryBackend::probe(path)?;
    match summary.and_then(|s| s.encryption) {
        Some(level) => Ok(level.parse()?),
        None => Ok(EncryptionLevel::High),
    }
}
