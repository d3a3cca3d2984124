use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spust")]
#[command(about = "Rebuilds and hot-swaps a development server on every source change")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory holding spust.toml; the build command runs here
    #[arg(long, global = true, default_value = ".")]
    pub work_dir: PathBuf,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Build the server once
    Build {
        /// Source directory, relative to the work directory
        #[arg(default_value = "src")]
        src_dir: PathBuf,

        /// Print a JSON build summary and write it to server.stats.json
        #[arg(long)]
        stats: bool,
    },

    /// Build, serve, and rebuild on every change until interrupted
    Start {
        /// Source directory to watch, relative to the work directory
        #[arg(default_value = "src")]
        src_dir: PathBuf,
    },
}
