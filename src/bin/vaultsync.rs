// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use vaultsync::{
    config::ConfigFile,
    event::{Event, EventSink, Level},
    exec::SystemExecutor,
    path::{default_config_path, ssh_dir},
    prompt::InquireDecider,
    setup::{SetupOptions, Wizard, KEY_SETTINGS_URL},
    sync::Orchestrator,
    trust::SshPaths,
    watch::cancellation,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{future::Future, path::PathBuf, process::exit};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "vaultsync [options] [<command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Run setup if it was never finished, or sync otherwise.
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut file = ConfigFile::load(path)?;

        match self.command {
            Some(Command::Setup(opts)) => run_setup(&mut file, opts).await,
            Some(Command::Sync) => run_sync(&file).await,
            Some(Command::Retest) => run_retest(&mut file).await,
            Some(Command::Keygen(opts)) => run_keygen(opts).await,
            Some(Command::ShowKey) => run_show_key(),
            None if file.config().is_setup_complete() => run_sync(&file).await,
            None => run_setup(&mut file, SetupArgs::default()).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run first-time setup.
    #[command(override_usage = "vaultsync setup [options]")]
    Setup(SetupArgs),

    /// Run one sync cycle around an editing session.
    Sync,

    /// Test SSH connectivity again, and finish setup if it works.
    Retest,

    /// Generate SSH key pair unless one exists.
    #[command(override_usage = "vaultsync keygen [options]")]
    Keygen(KeygenOptions),

    /// Print SSH public key.
    ShowKey,
}

#[derive(Parser, Clone, Debug, Default)]
#[command(author, about, long_about)]
struct SetupArgs {
    /// Path to vault folder.
    #[arg(short, long, value_name = "path")]
    pub vault: Option<PathBuf>,

    /// Path to editor executable.
    #[arg(short, long, value_name = "path")]
    pub editor: Option<PathBuf>,

    /// URL of remote repository to link.
    #[arg(short, long, value_name = "url")]
    pub remote: Option<String>,
}

impl From<SetupArgs> for SetupOptions {
    fn from(args: SetupArgs) -> Self {
        Self {
            vault: args.vault,
            editor: args.editor,
            remote: args.remote,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct KeygenOptions {
    /// Email address to tag the key with.
    #[arg(short, long, value_name = "email")]
    pub email: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_setup(file: &mut ConfigFile, opts: SetupArgs) -> Result<()> {
    let ssh = SshPaths::new(ssh_dir()?);
    with_progress(|sink, bar| async move {
        let executor = SystemExecutor;
        let decider = InquireDecider::new(bar);
        let wizard = Wizard::new(&executor, &decider, &sink, &ssh);
        wizard.run(file, &opts.into()).await?;

        Ok(())
    })
    .await
}

async fn run_sync(file: &ConfigFile) -> Result<()> {
    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            handle.cancel();
        }
    });

    with_progress(|sink, _| async move {
        let orchestrator = Orchestrator::from_config(SystemExecutor, sink, file.config())?
            .with_cancellation(cancel);
        orchestrator.run().await?;

        Ok(())
    })
    .await
}

async fn run_retest(file: &mut ConfigFile) -> Result<()> {
    let ssh = SshPaths::new(ssh_dir()?);
    with_progress(|sink, bar| async move {
        let executor = SystemExecutor;
        let decider = InquireDecider::new(bar);
        let wizard = Wizard::new(&executor, &decider, &sink, &ssh);
        wizard.retest(file).await?;

        Ok(())
    })
    .await
}

async fn run_keygen(opts: KeygenOptions) -> Result<()> {
    let ssh = SshPaths::new(ssh_dir()?);
    with_progress(|sink, bar| async move {
        let executor = SystemExecutor;
        let decider = InquireDecider::new(bar);
        let wizard = Wizard::new(&executor, &decider, &sink, &ssh);
        wizard.generate_key(opts.email.as_deref()).await?;

        Ok(())
    })
    .await
}

fn run_show_key() -> Result<()> {
    let ssh = SshPaths::new(ssh_dir()?);
    let executor = SystemExecutor;
    let decider = InquireDecider::new(ProgressBar::hidden());
    let (sink, _rx) = EventSink::channel();
    let wizard = Wizard::new(&executor, &decider, &sink, &ssh);

    println!("{}", wizard.public_key()?);
    println!("\nAdd it to your Git host account, e.g., {KEY_SETTINGS_URL}");

    Ok(())
}

/// Run work while rendering its events on a progress bar.
async fn with_progress<F, Fut>(work: F) -> Result<()>
where
    F: FnOnce(EventSink, ProgressBar) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("[{wide_bar:.yellow/blue}] {pos:>3}%")?
        .progress_chars("-Cco.");
    bar.set_style(style);

    let (sink, rx) = EventSink::channel();
    let renderer = tokio::spawn(render(rx, bar.clone()));

    // INVARIANT: Renderer stops once the last sink is dropped with the work.
    let result = work(sink, bar).await;
    renderer.await?;

    result
}

async fn render(mut rx: UnboundedReceiver<Event>, bar: ProgressBar) {
    while let Some(event) = rx.recv().await {
        match event.level {
            Level::Detail => bar.println(format!("{} {}", event.level, event.message)),
            level => bar.println(format!("{level}: {}", event.message)),
        }
        bar.set_position(event.progress.into());
    }
    bar.finish_and_clear();
}
