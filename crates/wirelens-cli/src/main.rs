//! wirelens - Inspect Protocol Buffer payloads without their schema
//!
//! This tool decodes raw protobuf messages into annotated field trees, infers
//! `.proto` schemas from payloads or JSON objects, and encodes or decodes
//! payloads against an explicit field table.

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use wirelens_core::schema::infer_field_table;
use wirelens_core::{
    decode_with_field_table, encode_with_field_table, DecodedField, Decoder, DecoderConfig,
    InterpretationKind, SchemaConfig, SchemaInferencer, SimpleFieldDefinition,
};

/// Inspect, reverse-engineer and re-encode Protocol Buffer payloads
#[derive(Parser, Debug)]
#[command(name = "wirelens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the interpretation tree of a payload
    Decode {
        /// Payload file
        file: PathBuf,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Show every interpretation, not only the selected one
        #[arg(long)]
        all: bool,
    },

    /// Infer a .proto schema from one payload or a directory of payloads
    Schema(SchemaArgs),

    /// Infer a .proto schema from a JSON object
    ObjectSchema {
        /// JSON file holding an object
        file: PathBuf,

        #[command(flatten)]
        naming: NamingArgs,
    },

    /// Infer a field table from a payload and print it as JSON
    Table {
        /// Payload file
        file: PathBuf,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Encode a JSON object using a field table
    Encode {
        /// Field table (JSON array of field definitions)
        #[arg(short, long)]
        table: PathBuf,

        /// JSON file holding the object to encode
        file: PathBuf,

        /// Encoding of the written payload
        #[arg(long, value_enum, default_value = "hex")]
        output_format: ByteFormat,

        /// Write the payload to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Decode a payload using a field table and print JSON
    DecodeTable {
        /// Field table (JSON array of field definitions)
        #[arg(short, long)]
        table: PathBuf,

        /// Payload file
        file: PathBuf,

        /// Encoding of the payload file
        #[arg(long, value_enum, default_value = "raw")]
        input_format: ByteFormat,
    },
}

/// How payload files are read
#[derive(Args, Debug, Clone)]
struct PayloadArgs {
    /// Encoding of the payload file
    #[arg(long, value_enum, default_value = "raw")]
    input_format: ByteFormat,

    /// Deepest nesting level probed for embedded messages
    #[arg(long, default_value_t = wirelens_core::decode::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl PayloadArgs {
    fn decoder(&self) -> Decoder {
        Decoder::with_config(DecoderConfig::new().max_depth(self.max_depth))
    }
}

/// Names used in generated schemas
#[derive(Args, Debug, Clone)]
struct NamingArgs {
    /// Package declared in the schema (empty for none)
    #[arg(long, default_value = "decoded")]
    package: String,

    /// Name of the top-level message
    #[arg(long, default_value = "DecodedMessage")]
    message_name: String,
}

impl NamingArgs {
    fn inferencer(&self) -> SchemaInferencer {
        SchemaInferencer::with_config(
            SchemaConfig::new()
                .package(self.package.clone())
                .message_name(self.message_name.clone()),
        )
    }
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[command(flatten)]
    input: InputMode,

    #[command(flatten)]
    payload: PayloadArgs,

    #[command(flatten)]
    naming: NamingArgs,

    /// Output directory for generated .proto files (directory mode)
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Dry run - don't write files, just show what would be generated
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without prompting
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Payload file; the schema is printed to stdout
    file: Option<PathBuf>,

    /// Directory of payloads; one .proto is written per distinct schema
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Byte encoding of a payload on disk or on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ByteFormat {
    /// Raw binary
    Raw,
    /// Hexadecimal text
    Hex,
    /// Standard base64 text
    Base64,
}

impl ByteFormat {
    /// Turn file contents into payload bytes
    fn read(self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            ByteFormat::Raw => Ok(data),
            ByteFormat::Hex => {
                let text = compact_text(&data)?;
                hex::decode(text).context("Input is not valid hex")
            }
            ByteFormat::Base64 => {
                let text = compact_text(&data)?;
                base64::engine::general_purpose::STANDARD
                    .decode(text)
                    .context("Input is not valid base64")
            }
        }
    }

    /// Render payload bytes for output
    fn write(self, payload: &[u8]) -> Vec<u8> {
        match self {
            ByteFormat::Raw => payload.to_vec(),
            ByteFormat::Hex => format!("{}\n", hex::encode(payload)).into_bytes(),
            ByteFormat::Base64 => format!(
                "{}\n",
                base64::engine::general_purpose::STANDARD.encode(payload)
            )
            .into_bytes(),
        }
    }
}

/// Text input with all whitespace removed
fn compact_text(data: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(data).context("Input is not UTF-8 text")?;
    Ok(text.chars().filter(|c| !c.is_whitespace()).collect())
}

/// Tracks written schemas for deduplication
#[derive(Default)]
struct ProtoRegistry {
    /// Proto filenames already assigned
    taken: HashSet<String>,
    /// Maps content hash -> first output path
    by_hash: HashMap<String, PathBuf>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    payloads: usize,
    skipped: usize,
    duplicates: usize,
    conflicts_renamed: usize,
    written: usize,
}

impl ProtoRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 8 chars of blake3)
    fn content_hash(content: &str) -> String {
        let hash = blake3::hash(content.as_bytes());
        hash.to_hex()[..8].to_string()
    }

    /// Register a schema and return the path to write it to, or `None` if an
    /// identical schema was already registered
    fn register(
        &mut self,
        filename: &str,
        content_hash: &str,
        output_dir: &Path,
    ) -> Option<PathBuf> {
        if let Some(existing) = self.by_hash.get(content_hash) {
            debug!(
                "Skipping duplicate: {} (same schema as {})",
                filename,
                existing.display()
            );
            self.stats.duplicates += 1;
            return None;
        }

        let output_path = if !self.taken.insert(filename.to_string()) {
            let new_name = Self::add_suffix(filename, &format!("~{}", content_hash));
            info!(
                "Conflict resolved: {} -> {} (content differs)",
                filename, new_name
            );
            self.stats.conflicts_renamed += 1;
            output_dir.join(new_name)
        } else {
            output_dir.join(filename)
        };

        self.by_hash
            .insert(content_hash.to_string(), output_path.clone());

        Some(output_path)
    }

    /// Add a suffix before the .proto extension
    fn add_suffix(filename: &str, suffix: &str) -> String {
        if let Some(stem) = filename.strip_suffix(".proto") {
            format!("{}{}.proto", stem, suffix)
        } else {
            format!("{}{}", filename, suffix)
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} payloads, {} skipped, {} duplicate schemas, {} conflicts renamed, {} written",
            self.stats.payloads,
            self.stats.skipped,
            self.stats.duplicates,
            self.stats.conflicts_renamed,
            self.stats.written
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Decode { file, payload, all } => run_decode(file, payload, *all),
        Command::Schema(args) => run_schema(args),
        Command::ObjectSchema { file, naming } => run_object_schema(file, naming),
        Command::Table { file, payload } => run_table(file, payload),
        Command::Encode {
            table,
            file,
            output_format,
            output,
            force,
        } => run_encode(table, file, *output_format, output.as_deref(), *force),
        Command::DecodeTable {
            table,
            file,
            input_format,
        } => run_decode_table(table, file, *input_format),
    }
}

/// Read a payload file in the given encoding
fn read_payload(path: &Path, format: ByteFormat) -> Result<Vec<u8>> {
    if !path.is_file() {
        bail!("Input file does not exist: {}", path.display());
    }
    trace!("Reading {}", path.display());
    let data =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;
    let payload = format
        .read(data)
        .with_context(|| format!("Failed to read payload: {}", path.display()))?;
    trace!("Read {} payload bytes from {}", payload.len(), path.display());
    Ok(payload)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_table(path: &Path) -> Result<Vec<SimpleFieldDefinition>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read field table: {}", path.display()))?;
    let table: Vec<SimpleFieldDefinition> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid field table in {}", path.display()))?;
    debug!("Loaded {} field definitions", table.len());
    Ok(table)
}

fn run_decode(file: &Path, payload: &PayloadArgs, all: bool) -> Result<()> {
    let data = read_payload(file, payload.input_format)?;
    let fields = payload
        .decoder()
        .decode(&data)
        .with_context(|| format!("Failed to decode {}", file.display()))?;

    let mut out = String::new();
    render_fields(&fields, 0, all, &mut out);
    print!("{}", out);
    Ok(())
}

/// Render a decoded tree, one field per line, children indented
fn render_fields(fields: &[DecodedField<'_>], depth: usize, all: bool, out: &mut String) {
    let indent = "  ".repeat(depth);

    for field in fields {
        let Some(primary) = field.primary() else {
            continue;
        };
        let _ = writeln!(
            out,
            "{}{} <{}> {}: {}",
            indent,
            field.number,
            field.wire_type(),
            primary.kind,
            primary.value
        );

        if all {
            for alternative in field.interpretations.iter().filter(|i| *i != primary) {
                let _ = writeln!(
                    out,
                    "{}  ~ {}: {} ({})",
                    indent, alternative.kind, alternative.value, alternative.confidence
                );
            }
        }

        if let Some(nested) = &field.nested {
            if all || primary.kind == InterpretationKind::Message {
                render_fields(nested, depth + 1, all, out);
            }
        }
    }
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    if let Some(ref file) = args.input.file {
        let data = read_payload(file, args.payload.input_format)?;
        let fields = args
            .payload
            .decoder()
            .decode(&data)
            .with_context(|| format!("Failed to decode {}", file.display()))?;
        print!("{}", args.naming.inferencer().generate_from_decoded(&fields));
        Ok(())
    } else if let Some(ref directory) = args.input.directory {
        process_directory(args, directory)
    } else {
        bail!("Either a payload file or --directory must be specified")
    }
}

/// Generate schemas for every payload under a directory
fn process_directory(args: &SchemaArgs, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let decoder = args.payload.decoder();
    let inferencer = args.naming.inferencer();
    let mut registry = ProtoRegistry::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || is_skipped(path) {
            continue;
        }
        registry.stats.payloads += 1;

        let data = match read_payload(path, args.payload.input_format) {
            Ok(data) => data,
            Err(e) => {
                warn!("Error reading {}: {:#}", path.display(), e);
                registry.stats.skipped += 1;
                continue;
            }
        };

        let fields = match decoder.decode(&data) {
            Ok(fields) if !fields.is_empty() => fields,
            Ok(_) => {
                trace!("No fields in {}", path.display());
                registry.stats.skipped += 1;
                continue;
            }
            Err(e) if e.is_recoverable() => {
                debug!("Not a protobuf payload: {} ({})", path.display(), e);
                registry.stats.skipped += 1;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to decode {}", path.display())),
        };

        let content = inferencer.generate_from_decoded(&fields);
        let content_hash = ProtoRegistry::content_hash(&content);
        let filename = proto_filename(path);

        let Some(output_path) = registry.register(&filename, &content_hash, &args.output) else {
            continue;
        };

        if args.dry_run {
            println!("Would write: {}", output_path.display());
            if tracing::enabled!(Level::INFO) {
                println!("---");
                print!("{}", content);
                println!("---");
            }
            continue;
        }

        match write_proto_file(&output_path, &content, args.force) {
            Ok(()) => {
                println!("Wrote {}", output_path.display());
                registry.stats.written += 1;
            }
            Err(e) => {
                error!("Failed to write {}: {:#}", output_path.display(), e);
            }
        }
    }

    registry.print_summary();
    Ok(())
}

/// Hidden files and generated schemas are not payloads
fn is_skipped(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    let proto = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("proto"))
        .unwrap_or(false);
    hidden || proto
}

/// Output filename for a payload: its stem with a .proto extension
fn proto_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("payload");
    format!("{}.proto", stem)
}

fn run_object_schema(file: &Path, naming: &NamingArgs) -> Result<()> {
    let value = read_json(file)?;
    let schema = naming
        .inferencer()
        .generate_from_object(&value)
        .with_context(|| format!("Failed to infer schema from {}", file.display()))?;
    print!("{}", schema);
    Ok(())
}

fn run_table(file: &Path, payload: &PayloadArgs) -> Result<()> {
    let data = read_payload(file, payload.input_format)?;
    let fields = payload
        .decoder()
        .decode(&data)
        .with_context(|| format!("Failed to decode {}", file.display()))?;
    let table = infer_field_table(&fields);
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn run_encode(
    table: &Path,
    file: &Path,
    format: ByteFormat,
    output: Option<&Path>,
    force: bool,
) -> Result<()> {
    let table = read_table(table)?;
    let value = read_json(file)?;
    let payload = encode_with_field_table(&value, &table)
        .with_context(|| format!("Failed to encode {}", file.display()))?;
    debug!("Encoded {} bytes", payload.len());

    let rendered = format.write(&payload);
    match output {
        Some(path) => {
            write_output_file(path, &rendered, force)?;
            info!("Wrote {}", path.display());
        }
        None => std::io::stdout()
            .write_all(&rendered)
            .context("Failed to write to stdout")?,
    }
    Ok(())
}

fn run_decode_table(table: &Path, file: &Path, format: ByteFormat) -> Result<()> {
    let table = read_table(table)?;
    let data = read_payload(file, format)?;
    let object = decode_with_field_table(&data, &table)
        .with_context(|| format!("Failed to decode {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&object)?);
    Ok(())
}

/// Write a proto file to disk, creating parent directories
fn write_proto_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    write_output_file(output_path, content.as_bytes(), force)
}

fn write_output_file(output_path: &Path, content: &[u8], force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Check if file exists
    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}
