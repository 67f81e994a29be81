use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use cask_types::Digest;

#[derive(Parser)]
#[command(
    name = "cask",
    about = "Cask: a content-addressable, deduplicating file store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory
    #[arg(long, global = true, env = "CASK_ROOT", default_value = ".cask")]
    pub root: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new store
    Init,
    /// Ingest files into the store
    Add(AddArgs),
    /// Show deduplication savings
    Stats,
    /// List stored objects
    Ls,
    /// Show every upload of one object
    Refs(DigestArg),
    /// List declared media types
    Types,
    /// Write an object's bytes to stdout
    Cat(DigestArg),
    /// Delete an object, its references and its bytes
    Rm(DigestArg),
    /// Delete stored bytes that no object names
    Gc,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Declared media type (guessed from each file's extension if omitted)
    #[arg(long = "type")]
    pub declared_type: Option<String>,
    /// Descend into directories
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct DigestArg {
    /// Full hex digest of the object
    pub digest: Digest,
}
