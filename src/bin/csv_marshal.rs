//! csv-marshal: Render JSON records as delimited tables
//!
//! Usage:
//!   # Read from file, output to stdout
//!   csv-marshal data.json
//!
//!   # Read from stdin with tab-separated columns
//!   echo '[{"id": 1, "tags": ["a", "b"]}]' | csv-marshal --field-delim '\t'
//!
//!   # Treat every line of an NDJSON file as one row
//!   csv-marshal --ndjson events.jsonl --no-header

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use csv_marshal::{format, MapOrder, MarshalConfig, Marshaler};
use regex::Regex;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "csv-marshal")]
#[command(about = "Render JSON records as delimited tables", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one record per line)
    #[arg(long)]
    ndjson: bool,

    /// Row terminator (default: "\n")
    #[arg(long)]
    row_delim: Option<String>,

    /// Column separator (default: ";")
    #[arg(long)]
    field_delim: Option<String>,

    /// Separator for values merged into one cell (default: "|")
    #[arg(long)]
    inner_delim: Option<String>,

    /// Don't render header lines
    #[arg(long)]
    no_header: bool,

    /// Sort map cells by key instead of keeping document order
    #[arg(long)]
    sort_map_keys: bool,

    /// Render floating point numbers with a decimal comma
    #[arg(long)]
    decimal_comma: bool,

    /// Regex of field names to leave out (default: "^XXX_", empty disables)
    #[arg(long)]
    reserved_fields: Option<String>,

    /// Log progress to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = build_config(&args)?;
    debug!(?config, "resolved configuration");

    let reader = if let Some(file_path) = &args.input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open file: {}", file_path))?,
        )) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };
    let document = read_document(reader, args.ndjson)?;

    let marshaler = Marshaler::new(config);
    let output = marshaler
        .marshal_json(&document)
        .context("Failed to render table")?;
    debug!(bytes = output.len(), content_type = marshaler.content_type(), "rendered");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output).context("Failed to write output")?;
    stdout.flush().context("Failed to flush output")?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Map command line flags onto a marshal configuration
fn build_config(args: &Args) -> Result<MarshalConfig> {
    let mut config = MarshalConfig::default();
    if let Some(delim) = &args.row_delim {
        config.row_delim = unescape(delim);
    }
    if let Some(delim) = &args.field_delim {
        config.field_delim = unescape(delim);
    }
    if let Some(delim) = &args.inner_delim {
        config.inner_delim = unescape(delim);
    }
    config.no_header = args.no_header;
    if args.sort_map_keys {
        config.map_order = MapOrder::SortedByKey;
    }
    if args.decimal_comma {
        config.formatter = format::decimal_separator(',');
    }
    if let Some(pattern) = &args.reserved_fields {
        config.reserved_fields = if pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(pattern)
                    .with_context(|| format!("Invalid --reserved-fields pattern: {}", pattern))?,
            )
        };
    }
    Ok(config)
}

/// Turn shell-friendly escapes into the characters they stand for
fn unescape(delim: &str) -> String {
    delim
        .replace("\\t", "\t")
        .replace("\\n", "\n")
        .replace("\\r", "\r")
}

/// Read one JSON document, or an NDJSON stream gathered into an array
fn read_document(reader: Box<dyn Read>, ndjson: bool) -> Result<Value> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader
        .read_to_end(&mut content)
        .context("Failed to read input")?;

    if !ndjson {
        return parse_json(&content);
    }

    let mut records = Vec::new();
    for (line_no, line) in content.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record =
            parse_json(line).with_context(|| format!("Invalid JSON on line {}", line_no + 1))?;
        records.push(record);
    }
    debug!(records = records.len(), "read NDJSON records");
    Ok(Value::Array(records))
}

/// Parse with simd-json, falling back to serde_json for inputs it rejects
fn parse_json(bytes: &[u8]) -> Result<Value> {
    let mut scratch = bytes.to_vec();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!(%err, "simd-json rejected input, retrying with serde_json");
            serde_json::from_slice(bytes).context("Failed to parse JSON")
        }
    }
}
