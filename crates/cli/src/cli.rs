use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "fuzzdex",
    version,
    about = "Index files by content fingerprint and find near duplicates"
)]
pub struct Cli {
    /// YAML or TOML config file (defaults to $FUZZDEX_CONFIG, $CONFIG_PATH, then fuzzdex.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Append log to read and write, overriding storage.log_path
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fingerprint files and append them to the log
    Index {
        #[arg(required = true, value_delimiter = ',')]
        files: Vec<PathBuf>,
        /// Keep a copy of each file in the content store
        #[arg(long, action = ArgAction::SetTrue)]
        store: bool,
        #[arg(long)]
        compression: Option<String>,
        #[arg(long)]
        threads: Option<usize>,
        /// whole or sampled
        #[arg(long)]
        mode: Option<String>,
    },
    /// Find indexed files similar to each query file
    Search {
        #[arg(required = true, value_delimiter = ',')]
        files: Vec<PathBuf>,
        #[command(flatten)]
        tolerance: ToleranceArgs,
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List indexed files similar to one file
    Similar {
        file: PathBuf,
        #[command(flatten)]
        tolerance: ToleranceArgs,
    },
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ToleranceArgs {
    /// Fraction of differing bits tolerated, e.g. 0.1 or 10%
    #[arg(long = "error-rate")]
    pub error_rate: Option<String>,
    /// Same tolerance given as a percentage
    #[arg(long = "error-percent")]
    pub error_percent: Option<f64>,
}
