use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

mod completion;
mod config;
mod dispatch;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "enhancer")]
#[command(about = "Patch the TIDAL desktop app resources", long_about = None)]
struct Cli {
    /// Resources directory holding app.asar.
    #[arg(long, global = true, conflicts_with = "install_root")]
    resources: Option<PathBuf>,
    /// Install root containing app-<version> directories.
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply every enabled step, reverting an earlier patch first.
    Patch {
        #[arg(long)]
        dev_tools: bool,
        #[arg(long)]
        downloader: bool,
        #[arg(long)]
        keep_source: bool,
        #[arg(long)]
        skip_dependency: bool,
    },
    /// Restore the original archive.
    Unpatch,
    /// Extract the archive into the source tree without patching.
    Extract {
        #[arg(long)]
        backup: bool,
    },
    Status,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

impl From<CliCompletionShell> for Shell {
    fn from(value: CliCompletionShell) -> Self {
        match value {
            CliCompletionShell::Bash => Shell::Bash,
            CliCompletionShell::Zsh => Shell::Zsh,
            CliCompletionShell::Fish => Shell::Fish,
            CliCompletionShell::Powershell => Shell::PowerShell,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum OutputStyle {
    Plain,
    Rich,
}

fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}
