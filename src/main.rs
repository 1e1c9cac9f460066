//! Keyroller - batch rotation of per-project encryption keys.
//!
//! A single invocation performs one full batch run: select eligible
//! projects, rotate each one's key, and print the end-of-run report.

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyroller::api::{CodeshipClient, Credentials};
use keyroller::config::CONFIG_FILE;
use keyroller::ledger::LEDGER_FILE;
use keyroller::pipeline::{RemoteKeyResetter, RemoteProjects};
use keyroller::{Config, ConfigError, Ledger, Pipeline};

/// Rotate per-project encryption keys across CI-managed repositories
#[derive(Parser)]
#[command(name = "keyroller")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Skip the bail-out pause before the batch starts mutating
    #[arg(short = 'y', long)]
    yes: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "keyroller=debug" } else { "keyroller=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_target(false))
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = match Config::load(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e @ ConfigError::TemplateCreated(_)) => {
            println!("{e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("failed to load configuration"),
    };

    let credentials = credentials_from_env()?;
    let client =
        CodeshipClient::authenticate(&credentials).context("failed to authenticate")?;
    let org = client.organization(&credentials.organization)?;

    let base_dir = env::current_dir().context("unable to get current working directory")?;
    let source = RemoteProjects::new(&client, &org);
    let resetter = RemoteKeyResetter::new(&client, &org);
    let ledger = Ledger::new(base_dir.join(LEDGER_FILE));

    let pipeline = Pipeline::new(&config, &source, &resetter, ledger, &base_dir);
    let pipeline = if cli.yes { pipeline.with_pause(None) } else { pipeline };

    let report = pipeline.run()?;
    println!("\n{report}");
    println!("adios amigo");
    Ok(ExitCode::SUCCESS)
}

fn credentials_from_env() -> anyhow::Result<Credentials> {
    let var = |name: &str| env::var(name).with_context(|| format!("{name} must be set"));
    Ok(Credentials {
        username: var("CODESHIP_USERNAME")?,
        password: var("CODESHIP_PASSWORD")?,
        organization: var("CODESHIP_ORGANIZATION")?,
    })
}
