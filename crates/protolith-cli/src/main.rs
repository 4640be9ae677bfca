//! protolith - Recover protobuf and flatbuffer schemas from compiled .NET assemblies
//!
//! This tool reads JSON metadata dumps of an assembly, recognises the types
//! emitted by protobuf and flatbuffers code generators, and writes the
//! schema they were generated from.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protolith_core::emit::{
    emit_program, verify_descriptor_set, write_descriptor_set, write_files, EmittedFile,
};
use protolith_core::{
    Assembly, Decompiler, DecompilerConfig, ErrorCategory, FlatbuffersEmitter, PackagingRules,
    Pipeline, PipelineConfig, Program, ProtoConfig, ProtoEmitter, ProtoSyntax,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Recover protobuf and flatbuffer schemas from compiled .NET assemblies
#[derive(Parser, Debug)]
#[command(name = "protolith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for the recovered schema files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Schema language to emit
    #[arg(long, value_enum, default_value = "proto")]
    format: SchemaFormat,

    /// Emit proto3 instead of proto2
    #[arg(long)]
    proto3: bool,

    /// TOML file with manual packaging rules
    #[arg(long, value_name = "RULES")]
    manual_packaging: Option<PathBuf>,

    /// Merge namespaces that reference each other
    #[arg(long)]
    resolve_circular_dependencies: bool,

    /// Split shared namespace prefixes into packages
    #[arg(long)]
    automatic_packaging: bool,

    /// Minimum prefix length for automatic packaging
    #[arg(long, default_value = "4", requires = "automatic_packaging")]
    min_package_len: usize,

    /// Make type names unique across the whole program
    #[arg(long)]
    resolve_collisions: bool,

    /// Enums to emit even when no message references them
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    include_enums: Vec<String>,

    /// Also write a binary FileDescriptorSet (proto only)
    #[arg(long, value_name = "FILE")]
    descriptor_set: Option<PathBuf>,

    /// Check that the generated descriptors link (proto only)
    #[arg(long)]
    verify: bool,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Metadata dump of an assembly; repeat to merge several dumps
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Directory of metadata dumps (*.json) to merge
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Schema language
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SchemaFormat {
    /// Protocol buffers (.proto)
    Proto,
    /// FlatBuffers (.fbs)
    Flatbuffers,
}

fn main() -> ExitCode {
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

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Exit status for a failed run, by error category
fn exit_status(err: &anyhow::Error) -> u8 {
    let category = err
        .chain()
        .find_map(|e| e.downcast_ref::<protolith_core::Error>())
        .map(protolith_core::Error::category);
    match category {
        Some(ErrorCategory::UnrecognizedOutput) => 2,
        Some(ErrorCategory::CorruptBody) => 3,
        Some(ErrorCategory::MissingStructure) => 4,
        Some(ErrorCategory::UnsupportedEnum) => 5,
        Some(ErrorCategory::Pipeline) => 8,
        _ => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let assembly = load_assembly(&cli.input)?;

    let decompiler = Decompiler::new(&assembly)
        .with_config(DecompilerConfig::new().include_enums(cli.include_enums.iter().cloned()));
    let program = decompiler
        .decompile()
        .with_context(|| format!("Failed to decompile '{}'", assembly.name()))?;

    let program = Pipeline::from_config(&pipeline_config(cli)?)
        .run(program)
        .context("Failed to transform the recovered program")?;
    debug!("Recovered program:\n{}", program);

    let files = match cli.format {
        SchemaFormat::Proto => emit_proto(cli, &program)?,
        SchemaFormat::Flatbuffers => {
            if cli.proto3 || cli.verify || cli.descriptor_set.is_some() {
                warn!("--proto3, --verify and --descriptor-set only apply to protobuf output");
            }
            emit_program(&program, &FlatbuffersEmitter::new())
                .context("Failed to render flatbuffers schemas")?
        }
    };

    if cli.dry_run {
        for file in &files {
            println!("Would write: {}", cli.output.join(&file.path).display());
            if cli.verbose > 0 {
                println!("---");
                println!("{}", file.contents);
                println!("---");
            }
        }
        return Ok(());
    }

    let written = write_files(&cli.output, &files, cli.force)
        .with_context(|| format!("Failed to write schemas to {}", cli.output.display()))?;
    for path in &written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::new()
        .resolve_circular_dependencies(cli.resolve_circular_dependencies)
        .automatic_packaging(cli.automatic_packaging)
        .min_package_len(cli.min_package_len)
        .resolve_collisions(cli.resolve_collisions);

    if let Some(path) = &cli.manual_packaging {
        let rules = PackagingRules::from_path(path)
            .with_context(|| format!("Failed to load packaging rules: {}", path.display()))?;
        info!("Loaded {} packaging rules", rules.rules.len());
        config = config.manual_packaging(rules);
    }
    Ok(config)
}

fn emit_proto(cli: &Cli, program: &Program) -> Result<Vec<EmittedFile>> {
    let syntax = if cli.proto3 {
        ProtoSyntax::Proto3
    } else {
        ProtoSyntax::Proto2
    };
    let emitter = ProtoEmitter::new().with_config(ProtoConfig::new().syntax(syntax));

    if cli.verify || cli.descriptor_set.is_some() {
        let set = emitter
            .descriptor_set(program)
            .context("Failed to build descriptors")?;
        if cli.verify {
            verify_descriptor_set(&set)?;
            info!("Descriptors verified ({} files)", set.file.len());
        }
        if let Some(path) = &cli.descriptor_set {
            if cli.dry_run {
                println!("Would write: {}", path.display());
            } else {
                if path.exists() && !cli.force {
                    bail!(
                        "File already exists: {} (use --force to overwrite)",
                        path.display()
                    );
                }
                write_descriptor_set(path, &set)?;
                println!("Wrote {}", path.display());
            }
        }
    }

    Ok(emit_program(program, &emitter).context("Failed to render proto schemas")?)
}

/// Loads and merges every metadata dump named on the command line
fn load_assembly(input: &InputMode) -> Result<Assembly> {
    let paths = match &input.directory {
        Some(directory) => collect_dumps(directory)?,
        None => input.input.clone(),
    };
    if paths.is_empty() {
        bail!("No metadata dumps to process");
    }

    let mut assembly = Assembly::default();
    for path in &paths {
        if !path.is_file() {
            bail!("Input file does not exist: {}", path.display());
        }
        let dump = Assembly::from_path(path)
            .with_context(|| format!("Failed to load metadata dump: {}", path.display()))?;
        info!("Loaded {} types from {}", dump.types().len(), path.display());
        assembly.merge(dump);
    }
    Ok(assembly)
}

/// Finds metadata dumps below a directory, in a stable order
fn collect_dumps(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden && path.extension().is_some_and(|e| e == "json") {
            paths.push(path.to_path_buf());
        }
    }

    info!("Found {} metadata dumps in {}", paths.len(), directory.display());
    Ok(paths)
}
