//! gpuops CLI
//!
//! Operator command line for the GPU cluster: one action per invocation

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use gpuops_core::maintenance::DEFAULT_SERVICE;
use gpuops_core::{MapProvider, OpsContext, ProviderChain};

mod commands;

use commands::{Action, Request};

#[derive(Parser, Debug)]
#[command(name = "gpuops", version)]
#[command(about = "Inspect and operate the GPU cluster", long_about = None)]
struct Cli {
    /// Action to perform
    #[arg(value_enum)]
    action: Action,

    /// Comma-separated node names
    #[arg(short, long, value_delimiter = ',')]
    nodes: Vec<String>,

    /// Comma-separated job ids
    #[arg(short, long, value_delimiter = ',')]
    jobs: Vec<String>,

    /// Job owner to filter on
    #[arg(short, long)]
    user: Option<String>,

    /// Comma-separated virtual cluster names
    #[arg(long, value_delimiter = ',')]
    vc: Vec<String>,

    /// systemd unit for `restart`
    #[arg(long, default_value = DEFAULT_SERVICE)]
    service: String,

    /// Shell command for `exec`
    #[arg(short = 'c', long = "command")]
    remote_command: Option<String>,

    /// Maximum simultaneous SSH sessions (default: one per node)
    #[arg(long)]
    parallel: Option<usize>,

    /// Per-node SSH command timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file (TOML or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Filter used when `RUST_LOG` is unset
///
/// `gpuops` prefix-matches the library targets too.
fn default_directives(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("warn,gpuops={level}")
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let mut overrides = MapProvider::new("command line");
    overrides.set_opt("ssh.max_parallel", cli.parallel);
    overrides.set_opt("ssh.command_timeout_secs", cli.timeout);

    let chain = ProviderChain::standard(overrides, cli.config.as_deref())?;
    let ctx = OpsContext::new(chain);

    let request = Request {
        nodes: cli.nodes,
        jobs: cli.jobs,
        user: cli.user,
        vcs: cli.vc,
        service: cli.service,
        command: cli.remote_command,
    };

    commands::dispatch(&ctx, cli.action, &request).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(0), "warn,gpuops=info");
        assert_eq!(default_directives(1), "warn,gpuops=debug");
        assert_eq!(default_directives(5), "warn,gpuops=trace");
        assert!(EnvFilter::try_new(default_directives(2)).is_ok());
    }

    #[test]
    fn test_cli_parses_lists_and_action() {
        let cli = Cli::try_parse_from(["gpuops", "exec", "-n", "gpu-1,gpu-2", "-c", "uptime", "-vv"])
            .unwrap();

        assert_eq!(cli.action, Action::Exec);
        assert_eq!(cli.nodes, ["gpu-1", "gpu-2"]);
        assert_eq!(cli.remote_command.as_deref(), Some("uptime"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.service, DEFAULT_SERVICE);
    }
}
