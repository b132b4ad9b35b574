//! Inspection tool for changegroup streams and bridge metadata.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use hgbridge::changegroup::{ChunkReader, Layout, Parents, RawRevChunk};
use hgbridge::config::load_options;
use hgbridge::metadata::{gate_state, GateState, MetadataStore, UpgradeOutcome, METADATA_VERSION};
use hgbridge::{NodeId, Session};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cg-inspect",
    version,
    about = "Inspect changegroup streams and bridge metadata",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "HGBRIDGE_CONFIG",
        value_name = "FILE",
        help = "Configuration file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Changegroup layout, overriding the configuration"
    )]
    layout: Option<LayoutArg>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "List every record of a changegroup")]
    Records {
        #[arg(value_name = "FILE", help = "Changegroup file, or - for stdin")]
        input: PathBuf,
    },
    #[command(about = "Print the full text of one revision")]
    Resolve {
        #[arg(value_name = "FILE", help = "Changegroup file, or - for stdin")]
        input: PathBuf,

        #[arg(value_name = "NODE", help = "40-character hex node")]
        node: String,

        #[arg(long, help = "Skip digest verification")]
        no_verify: bool,
    },
    #[command(about = "Report whether metadata can be used as is")]
    CheckMetadata {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    #[command(about = "Rewrite upgradable metadata at the current format")]
    UpgradeMetadata {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LayoutArg {
    #[value(name = "01")]
    V1,
    #[value(name = "02")]
    V2,
}

impl From<LayoutArg> for Layout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::V1 => Layout::V1,
            LayoutArg::V2 => Layout::V2,
        }
    }
}

#[derive(Serialize)]
struct RecordRow {
    section: String,
    node: String,
    parents: Vec<String>,
    delta_base: String,
    changeset: String,
    patch_len: usize,
}

#[derive(Serialize)]
struct RecordsReport {
    layout: Layout,
    records: Vec<RecordRow>,
}

#[derive(Serialize)]
struct ResolveReport {
    node: String,
    len: usize,
    text: String,
}

#[derive(Serialize)]
struct MetadataReport {
    path: String,
    exists: bool,
    version: Option<u32>,
    current: u32,
    state: Option<GateState>,
}

#[derive(Serialize)]
struct UpgradeReport {
    path: String,
    upgraded_from: Option<u32>,
    current: u32,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    let mut options = load_options(cli.config.clone())?;
    if let Some(layout) = cli.layout {
        options.layout = layout.into();
    }

    match cli.command {
        Command::Records { input } => {
            let report = records(&input, options.layout)?;
            emit(cli.format, &report, || print_records_text(&report))?;
        }
        Command::Resolve {
            input,
            node,
            no_verify,
        } => {
            let node = NodeId::from_hex(node.trim())?;
            let options = options.verify_digests(!no_verify);
            let mut session = Session::in_memory(options)?;
            session.read_changegroup(open_input(&input)?)?;
            let text = session.resolve(&node)?;
            match cli.format {
                OutputFormat::Text => {
                    let mut out = io::stdout().lock();
                    out.write_all(&text)?;
                    out.flush()?;
                }
                OutputFormat::Json => {
                    let report = ResolveReport {
                        node: node.to_hex(),
                        len: text.len(),
                        text: String::from_utf8_lossy(&text).into_owned(),
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
        Command::CheckMetadata { path } => {
            let report = check_metadata(&path)?;
            emit(cli.format, &report, || print_metadata_text(&report))?;
            if report.state != Some(GateState::Current) {
                return Ok(2);
            }
        }
        Command::UpgradeMetadata { path } => {
            let outcome = MetadataStore::new(&path).upgrade()?;
            let report = UpgradeReport {
                path: path.display().to_string(),
                upgraded_from: match outcome {
                    UpgradeOutcome::Upgraded { from } => Some(from.get()),
                    UpgradeOutcome::AlreadyCurrent => None,
                },
                current: METADATA_VERSION,
            };
            emit(cli.format, &report, || match report.upgraded_from {
                Some(from) => println!("upgraded {} from format {from} to {METADATA_VERSION}", report.path),
                None => println!("{} is already at format {METADATA_VERSION}", report.path),
            })?;
        }
    }
    Ok(0)
}

fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn records(input: &Path, layout: Layout) -> Result<RecordsReport, Box<dyn Error>> {
    let cg = ChunkReader::new(open_input(input)?, layout).read_changegroup()?;
    let mut rows = Vec::with_capacity(cg.record_count());
    let mut push = |section: String, record: &RawRevChunk| -> hgbridge::Result<()> {
        rows.push(RecordRow {
            section,
            node: record.node()?.to_hex(),
            parents: record.parents()?.iter().map(NodeId::to_hex).collect(),
            delta_base: record.delta_node(&cg.bases)?.to_hex(),
            changeset: record.changeset()?.to_hex(),
            patch_len: record.patch()?.len(),
        });
        Ok(())
    };
    for record in &cg.changesets {
        push("changeset".into(), record)?;
    }
    for record in &cg.manifests {
        push("manifest".into(), record)?;
    }
    for file in &cg.files {
        for record in &file.revisions {
            push(format!("file:{}", file.path_lossy()), record)?;
        }
    }
    Ok(RecordsReport {
        layout,
        records: rows,
    })
}

fn check_metadata(path: &Path) -> Result<MetadataReport, Box<dyn Error>> {
    let store = MetadataStore::new(path);
    let version = store.probe_version()?;
    Ok(MetadataReport {
        path: path.display().to_string(),
        exists: version.is_some(),
        version: version.map(|v| v.get()),
        current: METADATA_VERSION,
        state: version.map(gate_state),
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_records_text(report: &RecordsReport) {
    println!("layout: {}", report.layout);
    for row in &report.records {
        println!(
            "{} {} parents=[{}] base={} changeset={} patch={}B",
            row.section,
            row.node,
            row.parents.join(","),
            row.delta_base,
            row.changeset,
            row.patch_len
        );
    }
    println!("{} records", report.records.len());
}

fn print_metadata_text(report: &MetadataReport) {
    match (report.version, report.state) {
        (Some(version), Some(state)) => {
            println!("{}: format {version} (current {})", report.path, report.current);
            let verdict = match state {
                GateState::Current => "ok",
                GateState::NeedsUpgrade => "needs upgrade",
                GateState::UnsupportedLegacy => "unsupported legacy format",
                GateState::TooNew => "written by a newer release",
            };
            println!("state: {verdict}");
        }
        _ => println!("{}: no metadata", report.path),
    }
}
