//! revpb - Decode Protocol Buffers messages without their .proto schema
//!
//! This tool reads raw protobuf wire data, guesses what every field holds
//! and prints the decoded tree. A compiled descriptor set or individual
//! field hints can be supplied to decode known fields by their declared type.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use revpb_core::dump::DEFAULT_DUMP_PREFIX;
use revpb_core::{
    Decoder, DecoderConfig, DumpSink, Error, HintRegistry, Message, MessageTree, RenderConfig,
    TypeHints,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Decode Protocol Buffers messages without their .proto schema
#[derive(Parser, Debug)]
#[command(name = "revpb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Compiled FileDescriptorSet (protoc --descriptor_set_out) providing field types
    #[arg(long, requires = "message_type")]
    descriptor_set: Option<PathBuf>,

    /// Fully qualified type of the root message (e.g. `package.Message`)
    #[arg(short, long)]
    message_type: Option<String>,

    /// Declare one field type by hand, e.g. `pkg.Msg:3=sint64` (repeatable)
    #[arg(long = "hint", value_name = "MESSAGE:FIELD=TYPE", value_parser = parse_hint)]
    hints: Vec<FieldHintArg>,

    /// Directory receiving chunks of fields declared as `dump`
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Maximum nesting depth of messages and groups
    #[arg(long, default_value = "100")]
    max_depth: usize,

    /// Bytes per line in hex dumps
    #[arg(long, default_value = "24")]
    hex_width: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Exit with an error when any decode error was recorded
    #[arg(long)]
    strict: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a file holding one encoded message
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of encoded messages to process
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Encoded message as hex digits (whitespace is ignored)
    #[arg(short = 'x', long)]
    hex: Option<String>,
}

/// Output format for decoded messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Indented field tree with diagnostics
    Tree,
    /// One line per input (for scripting)
    Summary,
}

/// A field type declared on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldHintArg {
    message_type: String,
    field_no: u64,
    type_name: String,
}

fn parse_hint(s: &str) -> std::result::Result<FieldHintArg, String> {
    let (location, type_name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MESSAGE:FIELD=TYPE, got '{s}'"))?;
    let (message_type, field_no) = location
        .rsplit_once(':')
        .ok_or_else(|| format!("expected MESSAGE:FIELD before '=', got '{location}'"))?;
    let field_no = field_no
        .trim()
        .parse()
        .map_err(|e| format!("invalid field number '{field_no}': {e}"))?;

    let message_type = message_type.trim();
    let type_name = type_name.trim();
    if message_type.is_empty() || type_name.is_empty() {
        return Err(format!("empty message or type name in '{s}'"));
    }

    Ok(FieldHintArg {
        message_type: message_type.to_string(),
        field_no,
        type_name: type_name.to_string(),
    })
}

/// Writes dumped chunks as numbered files, reusing the file of an identical chunk
#[derive(Debug)]
struct FileDumpSink {
    dir: PathBuf,
    written: HashMap<blake3::Hash, PathBuf>,
    next_index: usize,
}

impl FileDumpSink {
    fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: HashMap::new(),
            next_index: 0,
        }
    }
}

impl DumpSink for FileDumpSink {
    fn dump(&mut self, chunk: &[u8]) -> revpb_core::Result<String> {
        let digest = blake3::hash(chunk);
        if let Some(path) = self.written.get(&digest) {
            debug!("Dump of {} bytes matches {}", chunk.len(), path.display());
            return Ok(format!("{} bytes, same as {}", chunk.len(), path.display()));
        }

        fs::create_dir_all(&self.dir).map_err(|e| Error::dump_write(self.dir.clone(), e))?;
        let path = self
            .dir
            .join(format!("{}{}", DEFAULT_DUMP_PREFIX, self.next_index));
        fs::write(&path, chunk).map_err(|e| Error::dump_write(path.clone(), e))?;

        self.next_index += 1;
        self.written.insert(digest, path.clone());
        Ok(format!("{} bytes written to {}", chunk.len(), path.display()))
    }
}

/// Tracks seen inputs so identical content is decoded once
#[derive(Default)]
struct InputRegistry {
    /// Maps content digest -> first input with that content
    seen: HashMap<blake3::Hash, PathBuf>,
    /// Statistics
    stats: RunStats,
}

#[derive(Default)]
struct RunStats {
    decoded: usize,
    duplicates_skipped: usize,
    failed: usize,
    decode_errors: usize,
}

impl InputRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Short content hash for display (first 8 chars of blake3)
    fn content_hash(data: &[u8]) -> String {
        let hash = blake3::hash(data);
        hash.to_hex()[..8].to_string()
    }

    /// Registers `path`, returning the earlier input if the content was already seen
    fn register(&mut self, path: &Path, data: &[u8]) -> Option<PathBuf> {
        let digest = blake3::hash(data);
        if let Some(first) = self.seen.get(&digest) {
            debug!(
                "Skipping duplicate: {} (same content as {})",
                path.display(),
                first.display()
            );
            self.stats.duplicates_skipped += 1;
            return Some(first.clone());
        }
        self.seen.insert(digest, path.to_path_buf());
        None
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} decoded, {} duplicates skipped, {} unreadable, {} decode errors",
            self.stats.decoded,
            self.stats.duplicates_skipped,
            self.stats.failed,
            self.stats.decode_errors
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
        .init();

    let hints = Arc::new(load_hints(&cli)?);
    let mut dump_sink = cli.dump_dir.as_deref().map(FileDumpSink::new);
    let mut registry = InputRegistry::new();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file, &hints, dump_sink.as_mut(), &mut registry)?;
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory, &hints, dump_sink.as_mut(), &mut registry)?;
    } else if let Some(ref digits) = cli.input.hex {
        let data = parse_hex_input(digits)?;
        decode_input(&cli, "<hex>", data, &hints, dump_sink.as_mut(), &mut registry);
    } else {
        bail!("One of --file, --directory or --hex must be specified")
    }

    registry.print_summary();

    if cli.strict && registry.stats.decode_errors > 0 {
        bail!(
            "{} decode error(s) recorded (--strict)",
            registry.stats.decode_errors
        );
    }
    Ok(())
}

/// Builds the hint registry from the descriptor set and `--hint` arguments
fn load_hints(cli: &Cli) -> Result<HintRegistry> {
    let mut registry = match &cli.descriptor_set {
        Some(path) => {
            let data = fs::read(path)
                .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
            let registry = HintRegistry::from_file_descriptor_set_bytes(&data)
                .with_context(|| format!("Failed to load descriptor set: {}", path.display()))?;
            info!(
                "Loaded {} message types from {}",
                registry.message_count(),
                path.display()
            );
            registry
        }
        None => HintRegistry::new(),
    };

    for hint in &cli.hints {
        trace!(
            "Hint: {}:{} = {}",
            hint.message_type,
            hint.field_no,
            hint.type_name
        );
        registry = registry.with_field(
            hint.message_type.as_str(),
            hint.field_no,
            hint.type_name.as_str(),
            None,
        );
    }

    if let Some(message_type) = &cli.message_type {
        if cli.descriptor_set.is_some() && !registry.has_message(message_type) {
            bail!("Message type '{}' not found in descriptor set", message_type);
        }
    }

    Ok(registry)
}

fn parse_hex_input(digits: &str) -> Result<Vec<u8>> {
    let compact: String = digits.split_whitespace().collect();
    let compact = compact.strip_prefix("0x").unwrap_or(&compact);
    hex::decode(compact).context("Invalid hex input")
}

/// Process a single input file
fn process_single_file(
    cli: &Cli,
    file: &Path,
    hints: &Arc<HintRegistry>,
    dump_sink: Option<&mut FileDumpSink>,
    registry: &mut InputRegistry,
) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let data = fs::read(file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;
    decode_input(cli, &file.display().to_string(), data, hints, dump_sink, registry);
    Ok(())
}

/// Process a directory of inputs recursively
fn process_directory(
    cli: &Cli,
    directory: &Path,
    hints: &Arc<HintRegistry>,
    mut dump_sink: Option<&mut FileDumpSink>,
    registry: &mut InputRegistry,
) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let dump_dir = cli.dump_dir.as_deref();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        // Never decode our own dumps
        if dump_dir.is_some_and(|dir| path.starts_with(dir)) {
            trace!("Skipping dump output: {}", path.display());
            continue;
        }

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                // Log error but continue with other files
                warn!("Error reading {}: {}", path.display(), e);
                registry.stats.failed += 1;
                continue;
            }
        };

        let label = path.display().to_string();
        if let Some(first) = registry.register(path, &data) {
            if cli.format == OutputFormat::Summary {
                println!("{}: same as {}", label, first.display());
            }
            continue;
        }

        debug!(
            "Decoding {} ({} bytes, {})",
            label,
            data.len(),
            InputRegistry::content_hash(&data)
        );
        decode_input(cli, &label, data, hints, dump_sink.as_deref_mut(), registry);
    }

    Ok(())
}

/// Decodes one input and prints it
fn decode_input(
    cli: &Cli,
    label: &str,
    data: Vec<u8>,
    hints: &Arc<HintRegistry>,
    dump_sink: Option<&mut FileDumpSink>,
    registry: &mut InputRegistry,
) {
    let config = DecoderConfig::new().max_depth(cli.max_depth);
    let mut decoder = Decoder::new()
        .with_config(config)
        .with_hints(Arc::clone(hints));
    if let Some(sink) = dump_sink {
        decoder = decoder.with_dump_sink(sink);
    }

    let size = data.len();
    let message = match &cli.message_type {
        Some(message_type) => decoder.decode_as(data, message_type),
        None => decoder.decode(data),
    };

    for diagnostic in decoder.errors() {
        warn!("{}: {}", label, diagnostic);
    }

    match cli.format {
        OutputFormat::Tree => {
            if cli.input.directory.is_some() {
                println!("== {} ==", label);
            }
            let render_config = RenderConfig::new().hex_dump_width(cli.hex_width);
            print!("{}", MessageTree::new(&message, &render_config));
        }
        OutputFormat::Summary => println!("{}", summary_line(label, size, &message, &decoder)),
    }

    registry.stats.decoded += 1;
    registry.stats.decode_errors += decoder.errors().len();
}

fn summary_line(label: &str, size: usize, message: &Message, decoder: &Decoder<'_>) -> String {
    let mut line = format!(
        "{}: {} bytes, {} fields, {} errors",
        label,
        size,
        message.len(),
        decoder.errors().len()
    );
    if decoder.wire_types_not_matching() {
        line.push_str(", wire types not matching");
    }
    if decoder.groups_observed() {
        line.push_str(", groups");
    }
    if !message.is_complete() {
        line.push_str(", incomplete");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use revpb_core::TypedData;
    use tempfile::TempDir;

    #[test]
    fn test_parse_hint() {
        assert_eq!(
            parse_hint("pkg.Msg:3=sint64").unwrap(),
            FieldHintArg {
                message_type: "pkg.Msg".to_string(),
                field_no: 3,
                type_name: "sint64".to_string(),
            }
        );
        assert_eq!(parse_hint("Root:12 = packed fixed32").unwrap().type_name, "packed fixed32");

        assert!(parse_hint("pkg.Msg:3").is_err());
        assert!(parse_hint("pkg.Msg=sint64").is_err());
        assert!(parse_hint("pkg.Msg:x=sint64").is_err());
        assert!(parse_hint(":3=sint64").is_err());
    }

    #[test]
    fn test_parse_hex_input() {
        assert_eq!(parse_hex_input("08 96 01").unwrap(), vec![0x08, 0x96, 0x01]);
        assert_eq!(parse_hex_input("0x0896\n01").unwrap(), vec![0x08, 0x96, 0x01]);
        assert!(parse_hex_input("0g").is_err());
        assert!(parse_hex_input("089").is_err());
    }

    #[test]
    fn test_file_dump_sink_numbers_and_reuses() {
        let temp_dir = TempDir::new().unwrap();
        let dump_dir = temp_dir.path().join("dumps");
        let mut sink = FileDumpSink::new(&dump_dir);

        let first = sink.dump(b"abc").unwrap();
        let second = sink.dump(b"de").unwrap();
        let repeat = sink.dump(b"abc").unwrap();

        assert!(first.ends_with("dump.0"));
        assert!(second.ends_with("dump.1"));
        assert!(repeat.contains("same as"));
        assert_eq!(fs::read(dump_dir.join("dump.0")).unwrap(), b"abc");
        assert_eq!(fs::read(dump_dir.join("dump.1")).unwrap(), b"de");
        assert!(!dump_dir.join("dump.2").exists());
    }

    #[test]
    fn test_file_dump_sink_reports_write_errors() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let mut sink = FileDumpSink::new(&blocker);
        let err = sink.dump(b"abc").unwrap_err();
        assert!(matches!(err, Error::DumpWrite { .. }));
    }

    #[test]
    fn test_dump_hint_through_decoder() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = FileDumpSink::new(temp_dir.path());
        let hints = HintRegistry::new().with_field("Root", 1, "dump", None);

        let message = Decoder::new()
            .with_hints(hints)
            .with_dump_sink(&mut sink)
            .decode_as(vec![0x0A, 0x02, 0xFF, 0xFE], "Root");

        let Some(TypedData::Dumped(confirmation)) =
            message.first(1).and_then(|v| v.as_typed()).map(|t| &t.data)
        else {
            panic!("expected a dump confirmation");
        };
        assert!(confirmation.starts_with("2 bytes written to"));
        assert_eq!(fs::read(temp_dir.path().join("dump.0")).unwrap(), vec![0xFF, 0xFE]);
    }

    #[test]
    fn test_input_registry_deduplication() {
        let mut registry = InputRegistry::new();

        assert!(registry.register(Path::new("a.bin"), b"\x08\x01").is_none());
        assert!(registry.register(Path::new("b.bin"), b"\x08\x02").is_none());
        assert_eq!(
            registry.register(Path::new("c.bin"), b"\x08\x01"),
            Some(PathBuf::from("a.bin"))
        );
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_content_hash() {
        let hash1 = InputRegistry::content_hash(b"hello");
        let hash2 = InputRegistry::content_hash(b"hello");
        let hash3 = InputRegistry::content_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_summary_line() {
        let mut decoder = Decoder::new();
        let message = decoder.decode(vec![0x08, 0x01, 0x12, 0x05, 0x61]);
        assert_eq!(
            summary_line("in", 5, &message, &decoder),
            "in: 5 bytes, 1 fields, 1 errors, incomplete"
        );
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
