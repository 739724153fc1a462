use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate text through the backend chain
    Translate {
        /// Source language (ISO 639-1)
        #[arg(short, long)]
        src: String,

        /// Target language (ISO 639-1)
        #[arg(short, long)]
        tgt: String,

        /// Text to translate; each line of stdin is translated when omitted
        text: Vec<String>,
    },

    /// Show the provisioning state of every catalog asset
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download, verify and install assets
    Provision {
        /// Asset ids (default: everything the enabled backends need)
        ids: Vec<String>,
    },

    /// List configured backends in priority order
    Backends,
}
