use crate::bundle::{self, BuildSummary};
use crate::cli::{BuildArgs, ListArgs, RunArgs};
use crate::commands::{self, CommandSpec};
use crate::config;
use crate::credential::{self, CredentialSource};
use crate::dispatch::{self, Bundle};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

pub fn run_build(args: BuildArgs) -> Result<()> {
    let (commands, output) = resolve_build_inputs(&args)?;
    let plan = bundle::validate(commands, &output, args.force)?;

    let password = if args.password {
        let (password, source) = credential::resolve_build()?;
        match (&password, source) {
            (None, _) => {
                eprintln!("warning: empty password; building an unprotected bundle");
                tracing::warn!("empty build password, protection disabled");
            }
            (Some(_), CredentialSource::Environment) => {
                tracing::info!("using build password from SCRIPTPACK_PASSWORD");
            }
            (Some(_), CredentialSource::Prompt) => {}
        }
        password
    } else {
        None
    };

    let summary = bundle::assemble(&plan, password.as_ref())
        .with_context(|| format!("build {}", plan.output().display()))?;
    print_build_summary(&summary, args.json)
}

fn resolve_build_inputs(args: &BuildArgs) -> Result<(CommandSpec, PathBuf)> {
    let mut commands = CommandSpec::new();
    let mut output = None;
    if let Some(path) = &args.config {
        let loaded = config::load_config(path)?;
        commands = loaded.commands;
        output = loaded.output;
    }
    if let Some(list) = &args.commands {
        commands = commands::merge(commands, commands::parse_command_list(list)?)?;
    }
    let output = args
        .output
        .clone()
        .or(output)
        .ok_or_else(|| anyhow!("missing output path (use --output or set output in --config)"))?;
    Ok((commands, output))
}

fn print_build_summary(summary: &BuildSummary, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(summary).context("serialize build summary")?;
        println!("{text}");
        return Ok(());
    }
    let protection = if summary.protected {
        "password protected"
    } else {
        "unprotected"
    };
    println!(
        "wrote {} ({} commands, {} bytes, {protection})",
        summary.output.display(),
        summary.commands.len(),
        summary.bytes
    );
    Ok(())
}

pub fn run_dispatch(args: RunArgs) -> Result<i32> {
    dispatch::run(&args.bundle, &args.args)
}

#[derive(Serialize)]
struct ListReport<'a> {
    bundle: PathBuf,
    protected: bool,
    commands: &'a [crate::manifest::ManifestEntry],
}

pub fn run_list(args: ListArgs) -> Result<()> {
    let bundle = Bundle::open(&args.bundle)?;
    let credential = dispatch::resolve_credential(&bundle)?;
    let manifest = bundle.manifest(credential.as_ref())?;
    if args.json {
        let report = ListReport {
            bundle: bundle.path().to_path_buf(),
            protected: bundle.is_protected(),
            commands: manifest.entries(),
        };
        let text = serde_json::to_string_pretty(&report).context("serialize command list")?;
        println!("{text}");
        return Ok(());
    }
    for entry in manifest.entries() {
        println!("{}\t{}", entry.command, entry.member);
    }
    Ok(())
}
