//! Command-line interface for luadrv.
//!
//! `luadrv run` plays script files through the device as a host would: one
//! Open, a Write per chunk, and a Release per file. Only the Release status
//! is printed; script results go to the debug log.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use luadrv_config::{DeviceConfig, LogLevel};

use crate::device::{Device, FileId, ScriptedEvents};

/// luadrv - run Lua scripts written to a byte-stream device
#[derive(Parser)]
#[command(name = "luadrv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace); overrides RUST_LOG and the config
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run each file as one session (stdin when no files are given)
    Run {
        /// Script files; `-` reads stdin and may appear once
        files: Vec<PathBuf>,

        /// Bytes per write call
        #[arg(long, default_value_t = 4096, value_name = "BYTES")]
        chunk_size: usize,
    },
    /// Show the effective configuration
    Config {
        /// Print the config file path instead of its contents
        #[arg(long)]
        path: bool,
    },
}

/// Load the config named on the command line, or the default one.
pub fn load_config(cli: &Cli) -> Result<DeviceConfig> {
    match &cli.config {
        Some(path) => DeviceConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => DeviceConfig::load(),
    }
}

/// Execute the parsed command. Returns the process exit code.
pub fn run(cli: &Cli, config: &DeviceConfig) -> Result<i32> {
    match &cli.command {
        Commands::Run { files, chunk_size } => run_scripts(config, files, *chunk_size),
        Commands::Config { path } => {
            if *path {
                let path = cli.config.clone().unwrap_or_else(DeviceConfig::config_path);
                println!("{}", path.display());
            } else {
                print!("{}", serde_yaml_ng::to_string(config)?);
            }
            Ok(0)
        }
    }
}

fn run_scripts(config: &DeviceConfig, files: &[PathBuf], chunk_size: usize) -> Result<i32> {
    let stdin = [PathBuf::from("-")];
    let files = if files.is_empty() { &stdin[..] } else { files };
    if files.iter().filter(|p| p.as_path() == Path::new("-")).count() > 1 {
        bail!("stdin (`-`) can only be given once");
    }

    let device = Device::new(config).context("failed to initialise device")?;
    let mut events = ScriptedEvents::new();
    for (file, path) in (0..).zip(files) {
        let source = read_source(path)?;
        events.push_script(file, &source, chunk_size);
    }

    device.serve(&mut events);

    let mut exit_code = 0;
    for (file, path) in (0 as FileId..).zip(files) {
        let status = events.release_status(file).unwrap_or(-1);
        if status == 0 {
            println!("{}: ok", path.display());
        } else {
            println!("{}: failed (status {})", path.display(), status);
            exit_code = 1;
        }
    }
    Ok(exit_code)
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut source = Vec::new();
        io::stdin()
            .read_to_end(&mut source)
            .context("failed to read script from stdin")?;
        Ok(source)
    } else {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}
