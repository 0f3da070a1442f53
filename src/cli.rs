//! CLI argument parsing for building and running bundles.
//!
//! The CLI is thin: it collects inputs and hands them to the workflow
//! handlers, which own validation and exit codes.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "scriptpack",
    version,
    about = "Bundle shell scripts into one self-extracting executable",
    after_help = "Examples:\n  scriptpack build --commands speak:speak.sh,moo:moo.sh --output tools\n  scriptpack build --config bundle.json --password --force\n  ./tools speak hi\n  scriptpack run ./tools moo\n  scriptpack list ./tools --json\n\nEnvironment:\n  SCRIPTPACK_PASSWORD  password for protected bundles (build and run)\n  SCRIPTPACK_LOG       log filter for scriptpack itself (default: warn)",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Build(BuildArgs),
    Run(RunArgs),
    List(ListArgs),
}

/// Build command inputs.
#[derive(Parser, Debug)]
#[command(about = "Build a bundle from command:path pairs")]
pub struct BuildArgs {
    /// Comma-separated command:path pairs (e.g. speak:speak.sh,moo:moo.sh)
    #[arg(long, short = 'c', value_name = "LIST")]
    pub commands: Option<String>,

    /// JSON bundle definition with commands and an optional output path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output path for the bundle
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Prompt for a password and encrypt every bundled script with it
    #[arg(long, short = 'p')]
    pub password: bool,

    /// Emit a machine-readable build summary
    #[arg(long)]
    pub json: bool,
}

/// Run command inputs for the native runtime.
#[derive(Parser, Debug)]
#[command(about = "Run a bundled command without the embedded shell runtime")]
pub struct RunArgs {
    /// Bundle to run
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Command name followed by its arguments
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

/// List command inputs.
#[derive(Parser, Debug)]
#[command(about = "List the commands packaged in a bundle")]
pub struct ListArgs {
    /// Bundle to inspect
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
