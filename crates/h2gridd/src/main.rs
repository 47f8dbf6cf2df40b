//! h2gridd — the h2grid daemon.
//!
//! Watches `H2Database` resources and the deployments and services they
//! own, and runs a convergence pass per resource whenever any of them
//! changes.
//!
//! # Usage
//!
//! ```text
//! h2gridd run --config /etc/h2grid/h2gridd.toml --namespace databases
//! h2gridd crd | kubectl apply -f -
//! ```

mod controller;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use kube::CustomResourceExt;
use tracing::info;

use h2grid_api::H2Database;
use h2grid_reconcile::OperatorConfig;

#[derive(Parser)]
#[command(name = "h2gridd", about = "H2Database controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller against the current cluster context.
    Run {
        /// TOML config file. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only watch this namespace (default: all namespaces).
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Print the H2Database CustomResourceDefinition as YAML.
    Crd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,h2gridd=debug,h2grid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Crd => {
            print!("{}", serde_yaml::to_string(&H2Database::crd())?);
            Ok(())
        }
        Command::Run { config, namespace } => {
            init_tracing(cli.log_format);
            let config = match config {
                Some(path) => {
                    let config = OperatorConfig::from_file(&path)?;
                    info!(path = %path.display(), "config loaded");
                    config
                }
                None => OperatorConfig::default(),
            };
            controller::run(config, namespace).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_options() {
        let cli = Cli::parse_from([
            "h2gridd",
            "run",
            "--config",
            "/etc/h2grid/h2gridd.toml",
            "--namespace",
            "databases",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Run { config, namespace } => {
                assert_eq!(config, Some(PathBuf::from("/etc/h2grid/h2gridd.toml")));
                assert_eq!(namespace.as_deref(), Some("databases"));
            }
            Command::Crd => panic!("expected run"),
        }
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["h2gridd", "run"]);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(matches!(
            cli.command,
            Command::Run {
                config: None,
                namespace: None
            }
        ));
    }

    #[test]
    fn crd_yaml_names_the_kind() {
        let yaml = serde_yaml::to_string(&H2Database::crd()).unwrap();
        assert!(yaml.contains("h2databases.h2.example.com"));
        assert!(yaml.contains("kind: H2Database"));
    }
}
