use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use node_store::{NodeStorage, OpenSearchClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use ::tracing::{info, info_span, Instrument};

mod config;
mod tracing;
use crate::tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index template and alias unless they already exist.
    Bootstrap,
    /// Write the payload stored under an id to stdout or a file.
    Get {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store stdin or a file under an id, generating one if omitted.
    Set {
        id: Option<String>,
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Delete one or more ids from every partition.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Drop partitions older than the given number of days.
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::load(cli.config.as_deref()).context("loading config")?;
    setup_tracing(&config)?;

    let client = OpenSearchClient::new(&config.opensearch).context("building opensearch client")?;
    let nodes = NodeStorage::new(Arc::new(client), config.node_store.clone())?;

    let root_span = info_span!("nodestore", env = %config.env);
    run(&nodes, cli.command).instrument(root_span).await
}

async fn run(nodes: &NodeStorage, command: Command) -> Result<()> {
    match command {
        Command::Bootstrap => {
            let status = nodes.bootstrap().await?;
            info!(status = ?status, "bootstrap finished");
        }
        Command::Get { id, output } => {
            let data = nodes
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("node {} not found", id))?;
            match output {
                Some(path) => tokio::fs::write(&path, &data)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Set { id, input } => {
            let data = match input {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    tokio::io::stdin().read_to_end(&mut data).await?;
                    data
                }
            };
            let id = id.unwrap_or_else(NodeStorage::generate_id);
            nodes.set(&id, &data).await?;
            println!("{}", id);
        }
        Command::Delete { ids } => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            match ids.as_slice() {
                [id] => nodes.delete(id).await?,
                _ => nodes.delete_multi(&ids).await?,
            }
        }
        Command::Cleanup { days } => {
            let cutoff = cleanup_cutoff(Utc::now(), days)?;
            let report = nodes.cleanup(cutoff).await?;
            info!(
                cutoff = %cutoff,
                deleted = report.deleted.len(),
                retained = report.retained.len(),
                already_gone = report.already_gone.len(),
                unparsable = report.unparsable.len(),
                "cleanup finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn cleanup_cutoff(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| anyhow!("--days {} is out of range", days))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cleanup() {
        let cli = Cli::try_parse_from(["opensearch-nodestore", "cleanup", "--days", "90"]).unwrap();
        assert!(matches!(cli.command, Command::Cleanup { days: 90 }));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_delete_requires_ids() {
        assert!(Cli::try_parse_from(["opensearch-nodestore", "delete"]).is_err());
    }

    #[test]
    fn test_cleanup_cutoff() {
        let now = DateTime::parse_from_rfc3339("2024-05-31T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let cutoff = cleanup_cutoff(now, 30).unwrap();
        assert_eq!(cutoff.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(cleanup_cutoff(now, 0).unwrap(), now);
        assert!(cleanup_cutoff(now, 4_000_000_000).is_err());
        assert!(cleanup_cutoff(now, u32::MAX).is_err());
    }
}
