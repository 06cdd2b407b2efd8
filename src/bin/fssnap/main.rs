use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod util;
mod cmd_mkfs;
mod cmd_snapshot;
mod cmd_restore;
mod cmd_geometry;
mod cmd_session;
mod cmd_metrics;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=debug fssnap session ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Mkfs { path, size, ninodes, nlog, no_reserve, force } =>
            cmd_mkfs::exec(path, size, ninodes, nlog, no_reserve, force),

        // Raw mirror of the leading blocks
        cli::Cmd::Snapshot { path } =>
            cmd_snapshot::exec(path),

        cli::Cmd::Restore { path } =>
            cmd_restore::exec(path),

        cli::Cmd::Geometry { path, json } =>
            cmd_geometry::exec(path, json),

        // Phased engine with an in-process slot
        cli::Cmd::Session { path, script, cmd, in_memory, json } =>
            cmd_session::exec(path, script, cmd, in_memory, json),

        cli::Cmd::Metrics { path, json } =>
            cmd_metrics::exec(path, json),
    }
}
