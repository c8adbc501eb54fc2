mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use cmd::{RunOptions, cmd_plan, cmd_run};
use output::{OutputFormat, error_chain, print_error};

/// artifactor - build and publish deployable artifacts for a repository commit
#[derive(Parser)]
#[command(name = "artifactor")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build artifacts described by a repository's builds.yaml
  Build {
    #[command(subcommand)]
    command: BuildCommands,
  },
}

#[derive(Subcommand)]
enum BuildCommands {
  /// Check out a repository at a commit and run every configured build task
  Run {
    /// Repository as owner/name
    repository: String,

    /// Commit to build
    commit: String,

    /// Cancel the whole run after this long (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Region to publish to (default: from the AWS configuration)
    #[arg(long)]
    region: Option<String>,

    /// Secret store key holding the source access token
    #[arg(long)]
    token_secret: Option<String>,
  },

  /// Validate a local builds.yaml and list the tasks a run would execute
  Plan {
    /// Directory containing builds.yaml
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build { command } => match command {
      BuildCommands::Run {
        repository,
        commit,
        timeout,
        region,
        token_secret,
      } => cmd_run(
        &repository,
        &commit,
        RunOptions {
          timeout,
          region,
          token_secret,
        },
      ),
      BuildCommands::Plan { dir, output } => cmd_plan(&dir, output),
    },
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      let message = error_chain(&e);
      error!(error = %message, "command failed");
      print_error(&message);
      ExitCode::FAILURE
    }
  }
}
