use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod bundle;
mod cli;
mod codec;
mod commands;
mod config;
mod credential;
mod dispatch;
mod manifest;
mod prologue;
mod staging;
mod workflow;

use cli::{Command, RootArgs};

/// Log filter for scriptpack's own diagnostics.
const LOG_ENV: &str = "SCRIPTPACK_LOG";

fn main() -> ExitCode {
    init_tracing();
    let args = RootArgs::parse();

    let result = match args.command {
        Command::Build(args) => workflow::run_build(args).map(|()| 0),
        Command::Run(args) => workflow::run_dispatch(args),
        Command::List(args) => workflow::run_list(args).map(|()| 0),
    };

    match result {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
