mod config;
mod logging;
mod statsd;

use clap::{Parser, Subcommand};
use config::Config;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jira-relay", version, about = "Jira issue gateway")]
struct Cli {
    /// YAML config file. Without one, configuration comes from the environment.
    #[arg(long, env = "JIRA_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Default)]
enum CliCommand {
    /// Run the HTTP gateway (default)
    #[default]
    Serve,
    /// Load and validate the configuration, then print it without secrets
    CheckConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        CliCommand::CheckConfig => {
            println!("Configuration is valid\n{}", config.summary());
            Ok(())
        }
        CliCommand::Serve => serve(config),
    }
}

fn serve(config: Config) -> Result<(), Box<dyn Error>> {
    let _sentry = logging::init(&config.common.logging)?;
    statsd::init(config.common.metrics.as_ref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        tokio::select! {
            result = jira_gateway::run(config.gateway) => {
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Gateway stopped");
                }
                result.map_err(Into::into)
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                Ok(())
            }
        }
    })
}
