use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Lay down an empty file system on an image file
    Format {
        image: PathBuf,

        /// Disk size in sectors
        #[arg(long, short, default_value_t = 1024)]
        sectors: u32,
    },

    /// Verify the consistency of an image file
    Check { image: PathBuf },

    /// List every file and directory in an image file
    List { image: PathBuf },
}
