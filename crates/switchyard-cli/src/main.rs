//! Switchyard CLI - route files through chains of format handlers

mod config;
mod errors;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use switchyard_core::{
    ConversionRequest, Engine, Error as EngineError, FileData, InitPolicy, Registry, RouteError,
};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Route files through chains of format converters", long_about = None)]
struct Cli {
    /// Verbose output (show debug logs)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Probe every handler before routing
    #[arg(long, global = true)]
    eager_init: bool,

    /// Maximum number of conversion steps
    #[arg(long, global = true)]
    max_hops: Option<usize>,

    /// Path to config file (default: ~/.config/switchyard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known formats
    Formats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered handlers
    Handlers {
        /// Run every capability probe and show the outcome
        #[arg(long)]
        probe: bool,
    },

    /// Show the conversion path between two formats
    Route {
        /// Source format id
        from: String,
        /// Target format id
        to: String,
    },

    /// Convert files
    Convert {
        /// Input files, directories, or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Target format id
        #[arg(long)]
        to: String,
        /// Source format id (default: detected from each file's extension)
        #[arg(long)]
        from: Option<String>,
        /// Directory for output files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Walk directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man page
    Manpage,
}

#[derive(Clone, Copy)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn log_level(self) -> tracing::Level {
        match self {
            Verbosity::Quiet => tracing::Level::ERROR,
            Verbosity::Normal => tracing::Level::WARN,
            Verbosity::Verbose => tracing::Level::DEBUG,
        }
    }

    fn info(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match cli.config {
        Some(ref path) => Config::load_from_path(Some(path)),
        None => Config::load(),
    };
    let (config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Apply config defaults, CLI flags override
    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let verbosity = Verbosity::from_flags(verbose, quiet);

    tracing_subscriber::fmt()
        .with_max_level(verbosity.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();

    if let Some(e) = config_error {
        tracing::warn!("ignoring config file: {:#}", e);
    }

    let policy = if cli.eager_init || config.defaults.eager_init {
        InitPolicy::Eager
    } else {
        InitPolicy::Lazy
    };
    let max_hops = cli.max_hops.or(config.defaults.max_hops);

    let engine = || build_engine(policy, max_hops);

    match cli.command {
        Commands::Formats { json } => cmd_formats(&engine()?, json, verbosity),
        Commands::Handlers { probe } => cmd_handlers(&engine()?, probe, verbosity),
        Commands::Route { from, to } => cmd_route(&engine()?, &from, &to, verbosity),
        Commands::Convert {
            inputs,
            to,
            from,
            output_dir,
            recursive,
        } => cmd_convert(
            &engine()?,
            inputs,
            &to,
            from.as_deref(),
            &output_dir,
            recursive,
            verbosity,
        ),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "switchyard", &mut std::io::stdout());
            Ok(())
        }
        Commands::Manpage => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
            Ok(())
        }
    }
}

fn build_engine(policy: InitPolicy, max_hops: Option<usize>) -> Result<Engine> {
    let mut registry = Registry::new();
    switchyard_handlers::register_all(&mut registry).context("Failed to register handlers")?;

    let mut engine = Engine::new(registry);
    if let Some(hops) = max_hops {
        engine = engine.max_hops(hops);
    }
    Ok(engine.init_policy(policy))
}

/// Turn an engine error into a user-facing one with suggestions.
fn explain(err: EngineError, engine: &Engine) -> anyhow::Error {
    match err {
        EngineError::Routing(RouteError::NoRoute { from, to }) => {
            anyhow::anyhow!(errors::no_path_error(&from, &to, engine))
        }
        EngineError::Routing(RouteError::UnknownFormat(id)) => {
            anyhow::anyhow!(errors::unknown_format_error(&id, engine.registry().catalog()))
        }
        other => other.into(),
    }
}

fn cmd_formats(engine: &Engine, json: bool, v: Verbosity) -> Result<()> {
    if json {
        let formats: Vec<_> = engine.formats().collect();
        println!("{}", serde_json::to_string_pretty(&formats)?);
        return Ok(());
    }

    v.info("Known formats:\n");
    for format in engine.formats() {
        let direction = match (format.can_be_source, format.can_be_target) {
            (true, true) => "from/to",
            (true, false) => "from",
            (false, true) => "to",
            (false, false) => "-",
        };
        println!(
            "  {:<10} .{:<6} {:<30} {:<8} {:<8} {}",
            format.internal_id,
            format.extension,
            format.mime_type,
            format.category,
            direction,
            if format.lossless { "lossless" } else { "lossy" },
        );
    }
    v.info(&format!("\nTotal: {} formats", engine.formats().count()));
    Ok(())
}

fn cmd_handlers(engine: &Engine, probe: bool, v: Verbosity) -> Result<()> {
    if probe {
        engine.initialize_all();
    }

    v.info("Registered handlers:\n");
    for slot in engine.registry().handlers() {
        let handler = slot.handler();
        println!("  {} [{}]", slot.name(), slot.state());

        let reads: Vec<_> = handler
            .supported_formats()
            .iter()
            .filter(|f| f.can_be_source)
            .map(|f| f.internal_id.as_str())
            .collect();
        let writes: Vec<_> = handler
            .supported_formats()
            .iter()
            .filter(|f| f.can_be_target)
            .map(|f| f.internal_id.as_str())
            .collect();

        if handler.supports_any_input() {
            println!("    reads:  any");
        } else {
            println!("    reads:  {}", reads.join(", "));
        }
        println!("    writes: {}", writes.join(", "));
    }
    v.info(&format!("\nTotal: {} handlers", engine.registry().len()));
    Ok(())
}

fn cmd_route(engine: &Engine, from: &str, to: &str, v: Verbosity) -> Result<()> {
    let path = engine.route(from, to).map_err(|e| explain(e, engine))?;

    v.info(&format!("Route: {} -> {}\n", from, to));
    if path.is_identity() {
        println!("Already at target format (no conversion needed)");
        return Ok(());
    }

    for (i, edge) in path.edges.iter().enumerate() {
        println!(
            "  {}. {} ({} -> {}){}",
            i + 1,
            edge.handler_name,
            edge.from.internal_id,
            edge.to.internal_id,
            if edge.is_lossy() { " [lossy]" } else { "" },
        );
    }
    v.info(&format!("\nTotal cost: {}", path.cost));
    Ok(())
}

fn cmd_convert(
    engine: &Engine,
    inputs: Vec<String>,
    to: &str,
    from: Option<&str>,
    output_dir: &Path,
    recursive: bool,
    v: Verbosity,
) -> Result<()> {
    let target = engine.format(to).map_err(|e| explain(e, engine))?;
    if let Some(from) = from {
        engine.format(from).map_err(|e| explain(e, engine))?;
    }

    let paths = collect_files(inputs, recursive);
    if paths.is_empty() {
        bail!("No input files found");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let source = match from {
            Some(id) => id.to_string(),
            None => detect_format(path, engine)
                .with_context(|| errors::format_detection_error(path, engine.registry().catalog()))?,
        };
        let bytes = std::fs::read(path).map_err(|e| anyhow::anyhow!(errors::file_read_error(path, &e)))?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        files.push((source, FileData::new(name, bytes)));
    }

    let requests: Vec<_> = group_by_format(files)
        .into_iter()
        .map(|(source, files)| ConversionRequest::new(source, &target.internal_id, files))
        .collect();
    let sources: Vec<String> = requests.iter().map(|r| r.from.clone()).collect();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut written = HashSet::new();
    for (source, result) in sources.iter().zip(engine.convert_batch(requests)) {
        let result = result
            .map_err(|e| explain(e, engine))
            .with_context(|| format!("Converting {} -> {}", source, target.internal_id))?;

        for file in result.files {
            let name = unique_name(&file.name, &mut written);
            if name != file.name {
                tracing::warn!("'{}' already written in this run, saving as '{}'", file.name, name);
            }
            let out_path = output_dir.join(&name);
            std::fs::write(&out_path, &file.bytes)
                .with_context(|| format!("Failed to write {}", out_path.display()))?;
            v.info(&format!("{} ({} bytes)", out_path.display(), file.len()));
        }
        tracing::debug!(
            from = %source,
            to = %target.internal_id,
            stages = result.stats.stages_executed,
            elapsed = ?result.stats.duration,
            "converted batch"
        );
    }

    v.info(&format!("\nWrote {} file(s)", written.len()));
    Ok(())
}

/// Detect a file's format id from its extension.
fn detect_format(path: &str, engine: &Engine) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?;
    engine
        .registry()
        .catalog()
        .by_extension(ext)
        .map(|f| f.internal_id.clone())
}

/// Collect files from paths, directories, and globs.
///
/// When `recursive` is true, directories are walked recursively.
fn collect_files(patterns: Vec<String>, recursive: bool) -> Vec<String> {
    let mut files = Vec::new();

    for pattern in patterns {
        let path = PathBuf::from(&pattern);

        if path.is_dir() {
            let depth = if recursive { usize::MAX } else { 1 };
            for entry in walkdir::WalkDir::new(&path)
                .max_depth(depth)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                files.push(entry.path().to_string_lossy().to_string());
            }
        } else if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            files.extend(expand_glob_pattern(&pattern));
        } else {
            files.push(pattern);
        }
    }

    files.sort();
    files.dedup();
    files
}

/// Expand a single glob pattern.
fn expand_glob_pattern(pattern: &str) -> Vec<String> {
    match glob::glob(pattern) {
        Ok(paths) => {
            let files: Vec<String> = paths
                .flatten()
                .filter(|entry| entry.is_file())
                .map(|entry| entry.to_string_lossy().to_string())
                .collect();
            if files.is_empty() {
                tracing::warn!("pattern '{}' matched no files", pattern);
            }
            files
        }
        Err(e) => {
            tracing::warn!("invalid glob pattern '{}': {}", pattern, e);
            Vec::new()
        }
    }
}

/// Reserve an output name, adding `-1`, `-2`, ... before the extension when
/// the name is already taken.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Group files by source format, keeping first-seen order.
fn group_by_format(files: Vec<(String, FileData)>) -> Vec<(String, Vec<FileData>)> {
    let mut groups: Vec<(String, Vec<FileData>)> = Vec::new();
    for (format, file) in files {
        match groups.iter_mut().find(|(id, _)| *id == format) {
            Some((_, batch)) => batch.push(file),
            None => groups.push((format, vec![file])),
        }
    }
    groups
}
