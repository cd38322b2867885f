// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use tagroute::{
    auth::{Credential, TOKEN_FALLBACK_VAR, TOKEN_VAR},
    config::Taxonomy,
    dispatch::{DispatchOptions, DispatchReport, Dispatcher},
    mirror::{Git2Backend, GitHub},
    path::DEFAULT_TAXONOMY,
};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "tagroute [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub globals: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let taxonomy = self.globals.load()?;
        match self.command {
            Command::Resolve => run_resolve(&taxonomy),
            Command::Sync(opts) => run_sync(&taxonomy, opts),
            Command::Dispatch(opts) => run_dispatch(&taxonomy, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show which destinations each tagged file routes to.
    #[command(override_usage = "tagroute resolve [options]")]
    Resolve,

    /// Rebuild and commit local mirrors without touching any remote.
    #[command(override_usage = "tagroute sync [options]")]
    Sync(SyncOptions),

    /// Rebuild local mirrors and mirror-push them to managed remotes.
    #[command(override_usage = "tagroute dispatch [options]")]
    Dispatch(DispatchArgs),
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Path to taxonomy file, TOML or YAML.
    #[arg(short, long, global = true, value_name = "path", default_value = DEFAULT_TAXONOMY)]
    pub taxonomy: PathBuf,

    /// Override content root to scan for tags.
    #[arg(short, long, global = true, value_name = "path")]
    pub content_root: Option<PathBuf>,

    /// Override workspace holding local mirrors.
    #[arg(short, long, global = true, value_name = "path")]
    pub workspace: Option<PathBuf>,
}

impl GlobalOptions {
    fn load(&self) -> Result<Taxonomy> {
        let mut taxonomy = Taxonomy::load(&self.taxonomy)?;
        if let Some(content_root) = &self.content_root {
            taxonomy.settings.content_root = content_root.clone();
        }
        if let Some(workspace) = &self.workspace {
            taxonomy.settings.workspace = workspace.clone();
        }

        Ok(taxonomy)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Keep going after a destination fails.
    #[arg(short, long)]
    pub keep_going: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DispatchArgs {
    /// Keep going after a destination fails.
    #[arg(short, long)]
    pub keep_going: bool,

    /// Claim every existing remote that lacks the ownership marker.
    #[arg(long)]
    pub adopt: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_resolve(taxonomy: &Taxonomy) -> Result<()> {
    let backend = Git2Backend::anonymous();
    let dispatcher = Dispatcher::new(taxonomy, &backend, DispatchOptions::default());
    let resolution = dispatcher.resolve()?;
    print!("{resolution}");

    Ok(())
}

fn run_sync(taxonomy: &Taxonomy, opts: SyncOptions) -> Result<()> {
    let backend = Git2Backend::anonymous();
    let options = DispatchOptions {
        keep_going: opts.keep_going,
        adopt: false,
    };
    let dispatcher = Dispatcher::new(taxonomy, &backend, options);
    let resolution = dispatcher.resolve()?;
    let report = dispatcher.sync_local(&resolution)?;

    summarize(report)
}

fn run_dispatch(taxonomy: &Taxonomy, opts: DispatchArgs) -> Result<()> {
    // INVARIANT: Fail on missing credentials before any destination is touched.
    let credential = Credential::from_env([TOKEN_VAR, TOKEN_FALLBACK_VAR])?;
    let hosting = GitHub::new(credential.clone())?;
    let backend = Git2Backend::new(&credential);

    let options = DispatchOptions {
        keep_going: opts.keep_going,
        adopt: opts.adopt,
    };
    let dispatcher = Dispatcher::new(taxonomy, &backend, options);
    let resolution = dispatcher.resolve()?;
    let report = dispatcher.dispatch(&hosting, &resolution)?;

    summarize(report)
}

fn summarize(report: DispatchReport) -> Result<()> {
    print!("{report}");
    if report.has_failures() {
        bail!("some destinations failed");
    }

    Ok(())
}
