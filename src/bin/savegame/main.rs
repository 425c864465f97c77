use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_list;
mod cmd_inspect;
mod cmd_export;
mod cmd_delete;
mod cmd_verify;
mod cmd_sweep;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::List { path, json } =>
            cmd_list::exec(path, json),

        cli::Cmd::Inspect { path, slot } =>
            cmd_inspect::exec(path, slot),

        cli::Cmd::Export { path, slot, out } =>
            cmd_export::exec(path, slot, out),

        cli::Cmd::Delete { path, slot } =>
            cmd_delete::exec(path, slot),

        cli::Cmd::Verify { path, json } =>
            cmd_verify::exec(path, json),

        cli::Cmd::Sweep { path } =>
            cmd_sweep::exec(path),
    }
}
