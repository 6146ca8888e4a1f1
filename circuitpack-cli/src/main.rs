//! CircuitPack CLI - package circuit drawings from the command line.

use circuitpack::model::Document;
use circuitpack::reader::{LoadedDocument, LoadedElement, TypeRef};
use circuitpack::{
    load_save_options, CircuitPackCore, EmbedComponents, FileLibrary, PackageSummary, SaveOptions,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "circuitpack")]
#[command(about = "Circuit drawing packaging tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Log packaging decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a JSON circuit document into a container directory
    Pack {
        /// Path to the JSON document
        #[arg(value_name = "DOCUMENT")]
        document: PathBuf,

        /// Output container directory (must not exist)
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Which component descriptions to embed
        #[arg(long, value_enum)]
        embed: Option<EmbedMode>,

        /// Omit component position, orientation, size and flip
        #[arg(long)]
        no_layout: bool,

        /// Omit named connection groups
        #[arg(long)]
        no_connections: bool,

        /// JSON file with save options; flags override its values
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print the contents of a container directory
    Inspect {
        /// Path to the container directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedMode {
    /// Embed every description
    All,
    /// Embed descriptions that are not commonly available
    Automatic,
    /// Embed only the descriptions listed in the config file
    Custom,
}

impl From<EmbedMode> for EmbedComponents {
    fn from(mode: EmbedMode) -> Self {
        match mode {
            EmbedMode::All => EmbedComponents::All,
            EmbedMode::Automatic => EmbedComponents::Automatic,
            EmbedMode::Custom => EmbedComponents::Custom,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// A document file: the document model plus the sources readers already have
#[derive(Deserialize)]
struct DocumentFile {
    #[serde(flatten)]
    document: Document,
    #[serde(default)]
    common_sources: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Pack {
            document,
            output,
            embed,
            no_layout,
            no_connections,
            config,
        } => handle_pack(&document, &output, embed, no_layout, no_connections, config.as_deref()),
        Commands::Inspect { dir, format } => handle_inspect(&dir, format),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_pack(
    document_path: &Path,
    output: &Path,
    embed: Option<EmbedMode>,
    no_layout: bool,
    no_connections: bool,
    config: Option<&Path>,
) -> i32 {
    let mut options = match config {
        Some(path) => match load_save_options(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => SaveOptions::default(),
    };
    if let Some(mode) = embed {
        options.embed_components = mode.into();
    }
    if no_layout {
        options.include_layout = false;
    }
    if no_connections {
        options.include_connections = false;
    }

    let file = match read_document(document_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    tracing::debug!(
        "Loaded {:?}: {} elements, {} descriptions, options {:?}",
        document_path,
        file.document.elements.len(),
        file.document.descriptions.len(),
        options
    );
    let library =
        FileLibrary::new(document_path, &file.document).with_common_sources(file.common_sources);

    match CircuitPackCore::package_to_dir(&file.document, &library, &options, output) {
        Ok(summary) => {
            output_summary(output, &summary);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn read_document(path: &Path) -> Result<DocumentFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("invalid document {}: {}", path.display(), e))
}

fn output_summary(output: &Path, summary: &PackageSummary) {
    println!("Packaged {}", output.display());
    println!("  Elements:          {}", summary.elements);
    println!("  Definitions:       {}", summary.definitions);
    println!("  Source groups:     {}", summary.source_groups);
    println!("  Connection groups: {}", summary.connection_groups);
    if !summary.embedded_parts.is_empty() {
        println!("  Embedded parts:");
        for part in &summary.embedded_parts {
            println!("    - {}", part);
        }
    }
}

fn handle_inspect(dir: &Path, format: OutputFormat) -> i32 {
    match CircuitPackCore::unpack_dir(dir) {
        Ok(document) => match format {
            OutputFormat::Human => {
                output_human(dir, &document);
                0
            }
            OutputFormat::Json => output_json(&document),
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn output_human(dir: &Path, document: &LoadedDocument) {
    println!("\nPackage: {}", dir.display());
    println!("{}", "─".repeat(60));
    println!("  Format version: {}", document.version);
    println!("  Size:           {} x {}", document.size.width, document.size.height);
    if let Some(title) = &document.metadata.title {
        println!("  Title:          {}", title);
    }

    println!("\n  DEFINITIONS:");
    if document.definitions.is_empty() {
        println!("    (none)");
    }
    for definition in &document.definitions {
        match &definition.target {
            Some(target) => println!("    {{{}}} {} -> {}", definition.id, definition.name, target),
            None => println!("    {{{}}} {} (referenced)", definition.id, definition.name),
        }
    }

    let wires = document
        .elements
        .iter()
        .filter(|e| matches!(e, LoadedElement::Wire { .. }))
        .count();
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut unresolved = 0;
    for component in document.components() {
        if component.type_ref == TypeRef::Missing {
            unresolved += 1;
        }
        for (id, name) in &component.connections {
            groups.entry(id.as_str()).or_default().push(name.as_str());
        }
    }

    println!("\n  ELEMENTS:");
    println!("    Wires:      {}", wires);
    println!("    Components: {}", document.elements.len() - wires);
    if unresolved > 0 {
        println!("    Without type: {}", unresolved);
    }

    if !groups.is_empty() {
        println!("\n  CONNECTION GROUPS:");
        for (id, names) in &groups {
            println!("    {}: {}", id, names.join(", "));
        }
    }
}

fn output_json(document: &LoadedDocument) -> i32 {
    match serde_json::to_string_pretty(document) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
