use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use audit_filter::{
    AuditEngine, CapturedArguments, FileSystem, HostFileSystem, fs::FileAttributes, wire,
};
use clap::{Args, Subcommand};

use crate::{config::VigilConfig, replay, rules, term_print::TermPrintable};

#[derive(Args, Debug, Clone)]
pub struct VigilOpts {
    /// Configuration file, defaults to /etc/vigil/vigil.ini
    #[clap(long)]
    pub config_file: Option<String>,

    /// Rules directory, overrides the configured ones
    #[clap(long)]
    pub rules: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print the loaded filters
    Filters,

    /// Print the configured policy slots
    Policy,

    /// Evaluate the events of a JSON-lines file
    Replay { events: PathBuf },

    /// Print the binary definition record of a filter
    Encode { id: u16 },
}

pub fn run(options: &VigilOpts) -> Result<()> {
    log::trace!("Vigil options: {:?}", options);

    let config = match &options.config_file {
        Some(config_file) => VigilConfig::with_custom_file(config_file)?,
        None => VigilConfig::new()?,
    };

    let engine = build_engine(&config)?;

    let rules_paths = match &options.rules {
        Some(path) => vec![path.clone()],
        None => config.rules_paths()?,
    };
    rules::load_rules(&engine, &rules_paths).context("Error loading rules")?;

    log::trace!("Command received: {:?}", options.command);

    match &options.command {
        Commands::Filters => engine.filters().term_print(),
        Commands::Policy => engine.policies().term_print(),
        Commands::Replay { events } => {
            let file = File::open(events)
                .with_context(|| format!("Error opening {}", events.display()))?;
            replay::replay(&engine, BufReader::new(file))?.term_print()
        }
        Commands::Encode { id } => {
            let definition = engine.describe_filter(*id)?;
            let record = wire::encode_filter(&definition)?;
            hex::encode(record).term_print()
        }
    }?;

    Ok(())
}

fn build_engine(config: &VigilConfig) -> Result<AuditEngine> {
    let fs: Box<dyn FileSystem> = if config.host_filesystem()? {
        Box::new(HostFileSystem)
    } else {
        Box::new(NoFileSystem)
    };
    Ok(AuditEngine::new(Box::new(CapturedArguments), fs))
}

/// Used when file attributes must not be read from the host: every lookup
/// fails, so file targets are undefined and `PREFIX` only matches by name.
struct NoFileSystem;

impl FileSystem for NoFileSystem {
    fn lookup(&self, _path: &Path) -> Option<FileAttributes> {
        None
    }
}
