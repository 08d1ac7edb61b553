use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod shutdown;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "rigscope")]
#[command(about = "Live player rig tracker", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(
        short,
        long,
        global = true,
        default_value = "rigscope.toml",
        env = "RIGSCOPE_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Which process to attach to and how to read it
#[derive(Args)]
struct Target {
    /// Executable name of the target process (exact match)
    #[arg(short, long, env = "RIGSCOPE_PROCESS")]
    process: Option<String>,

    /// Offset table JSON file (defaults to the built-in table)
    #[arg(short, long)]
    offsets: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Attach and report player entities every tick
    Watch {
        #[command(flatten)]
        target: Target,

        /// Milliseconds between ticks
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Print every snapshot as one JSON line
        #[arg(long)]
        json: bool,

        /// Leave the local player out of snapshots
        #[arg(long)]
        exclude_local: bool,
    },

    /// Print the instance tree below the data model
    Tree {
        #[command(flatten)]
        target: Target,

        /// Levels below the data model to descend
        #[arg(short, long, default_value_t = 2)]
        depth: usize,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the built-in offset table to a file
    Offsets {
        /// Output path
        #[arg(default_value = "offsets.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Target {
    fn apply(self, config: &mut CliConfig) {
        if let Some(process) = self.process {
            config.process_name = process;
        }
        if let Some(offsets) = self.offsets {
            config.offsets = Some(offsets);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rigscope=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = CliConfig::load_or_default(&cli.config);

    match cli.command {
        Command::Watch {
            target,
            interval_ms,
            json,
            exclude_local,
        } => {
            target.apply(&mut config);
            if let Some(interval_ms) = interval_ms {
                config.tick_interval_ms = interval_ms;
            }
            if exclude_local {
                config.include_local_player = false;
            }
            commands::watch::run(&config, json)
        }
        Command::Tree {
            target,
            depth,
            no_color,
        } => {
            target.apply(&mut config);
            commands::tree::run(&config, depth, !no_color)
        }
        Command::Offsets { output, force } => commands::offsets::run(&output, force),
    }
}
