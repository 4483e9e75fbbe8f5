//! bplist - Inspect, dump and convert binary property lists
//!
//! This tool reads binary (and XML) property lists, reports the layout of
//! binary files, prints decoded contents and converts between formats.

use anyhow::{bail, Context, Result};
use bplist_core::{is_binary_plist, Codec, DecoderConfig, Format, Reader, Trailer, Value};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect, dump and convert binary property lists
#[derive(Parser, Debug)]
#[command(name = "bplist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum container nesting depth accepted when decoding
    #[arg(long, global = true, default_value_t = bplist_core::binary::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the trailer of binary property lists
    Info {
        #[command(flatten)]
        input: InputMode,
    },
    /// Decode a property list and print it as an indented tree
    Dump {
        /// Property list to decode (binary or XML)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Re-encode a property list in another format
    Convert {
        /// Property list to read (binary or XML)
        input: PathBuf,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "binary")]
        to: OutputFormat,

        /// Overwrite existing files without prompting
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single property list
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory to search for binary property lists
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for conversions
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Binary property list (bplist00)
    Binary,
    /// XML property list
    Xml,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Binary => Format::Binary,
            OutputFormat::Xml => Format::Xml,
        }
    }
}

/// Counts gathered while inspecting files
#[derive(Default)]
struct InfoStats {
    inspected: usize,
    skipped: usize,
    failed: usize,
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

    let codec = Codec::new().decoder_config(DecoderConfig::new().max_depth(cli.max_depth));

    match &cli.command {
        Command::Info { input } => {
            if let Some(ref file) = input.file {
                print!("{}", describe_file(file)?);
                Ok(())
            } else if let Some(ref directory) = input.directory {
                process_directory(directory)
            } else {
                bail!("Either --file or --directory must be specified")
            }
        }
        Command::Dump { file } => {
            let value = codec
                .read_file(file)
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            print!("{}", render(&value)?);
            Ok(())
        }
        Command::Convert {
            input,
            output,
            to,
            force,
        } => {
            convert(&codec, input, output, (*to).into(), *force)?;
            println!("Wrote {}", output.display());
            Ok(())
        }
    }
}

/// Describe the trailer of one binary property list
fn describe_file(path: &Path) -> Result<String> {
    trace!("Reading {}", path.display());
    let data =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let reader = Reader::new(&data)
        .with_context(|| format!("Failed to parse binary plist: {}", path.display()))?;

    Ok(describe_trailer(path, reader.trailer()))
}

fn describe_trailer(path: &Path, trailer: &Trailer) -> String {
    format!(
        "{}: {} objects, top object {}, offset size {}, reference size {}, offset table at {}\n",
        path.display(),
        trailer.offset_count,
        trailer.top_object,
        trailer.offset_size,
        trailer.object_ref_size,
        trailer.offset_table_offset
    )
}

/// Inspect every binary property list below a directory
fn process_directory(directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut stats = InfoStats::default();
    for path in find_binary_plists(directory, &mut stats) {
        match describe_file(&path) {
            Ok(line) => {
                print!("{}", line);
                stats.inspected += 1;
            }
            Err(e) => {
                // Log error but continue with other files
                warn!("Error processing {}: {:#}", path.display(), e);
                stats.failed += 1;
            }
        }
    }

    info!(
        "Summary: {} inspected, {} skipped, {} failed",
        stats.inspected, stats.skipped, stats.failed
    );
    Ok(())
}

/// Collect non-hidden files that carry the binary signature
fn find_binary_plists(directory: &Path, stats: &mut InfoStats) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            continue;
        }

        let binary = fs::File::open(path)
            .map_err(bplist_core::Error::from)
            .and_then(|mut file| is_binary_plist(&mut file));
        match binary {
            Ok(true) => found.push(path.to_path_buf()),
            Ok(false) => {
                trace!("Skipping non-binary: {}", path.display());
                stats.skipped += 1;
            }
            Err(e) => {
                debug!("Skipping unreadable {}: {}", path.display(), e);
                stats.skipped += 1;
            }
        }
    }
    found
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Read `input` in any format and write it to `output` in `format`
fn convert(codec: &Codec, input: &Path, output: &Path, format: Format, force: bool) -> Result<()> {
    let value = codec
        .read_file(input)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    if output.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output.display()
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    codec
        .write_file(&value, output, format)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    debug!("Converted {} -> {}", input.display(), output.display());
    Ok(())
}

/// Render a value as an indented tree, one node per line
fn render(value: &Value) -> Result<String> {
    let mut out = String::new();
    render_node(value, 0, &mut out)?;
    Ok(out)
}

fn render_node(value: &Value, depth: usize, out: &mut String) -> std::fmt::Result {
    match value {
        Value::Array(items) => {
            writeln!(out, "array ({} items)", items.len())?;
            for item in items {
                write!(out, "{:indent$}", "", indent = (depth + 1) * 2)?;
                render_node(item, depth + 1, out)?;
            }
        }
        Value::Set(set) => {
            writeln!(out, "set ({} items)", set.len())?;
            for item in set {
                write!(out, "{:indent$}", "", indent = (depth + 1) * 2)?;
                render_node(item, depth + 1, out)?;
            }
        }
        Value::Dictionary(dict) => {
            writeln!(out, "dict ({} entries)", dict.len())?;
            for (key, item) in dict.iter() {
                write!(out, "{:indent$}", "", indent = (depth + 1) * 2)?;
                write!(out, "{} = ", describe(key))?;
                render_node(item, depth + 1, out)?;
            }
        }
        scalar => writeln!(out, "{}", describe(scalar))?,
    }
    Ok(())
}

/// One-line description of a value
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => format!("{:?}", r),
        Value::Date(date) => date.to_rfc3339(),
        Value::Data(bytes) => {
            let preview: String = bytes.iter().take(16).map(|b| format!("{:02x}", b)).collect();
            let more = if bytes.len() > 16 { "..." } else { "" };
            format!("<{} bytes {}{}>", bytes.len(), preview, more)
        }
        Value::String(s) => format!("{:?}", s),
        Value::Uid(uid) => format!("uid({})", uid.get()),
        Value::Array(items) => format!("<array of {}>", items.len()),
        Value::Set(set) => format!("<set of {}>", set.len()),
        Value::Dictionary(dict) => format!("<dict of {}>", dict.len()),
    }
}
