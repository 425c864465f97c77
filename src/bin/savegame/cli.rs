use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Инспекция и обслуживание каталога сохранений
#[derive(Parser, Debug)]
#[command(name = "savegame", version, about = "SaveGame slot directory tool")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// List slots (header info only)
    List {
        #[arg(long)]
        path: PathBuf,
        /// Print one JSON array instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show header and decoded document of one slot
    Inspect {
        #[arg(long)]
        path: PathBuf,
        /// Slot: "3", "auto:1" or a name
        #[arg(long)]
        slot: String,
    },
    /// Dump the slot document as JSON
    Export {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        slot: String,
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a slot together with its backup
    Delete {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        slot: String,
    },
    /// Check header and payload checksums of every slot
    Verify {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove staging files left by interrupted writes
    Sweep {
        #[arg(long)]
        path: PathBuf,
    },
}
