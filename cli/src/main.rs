/*!

This is the command line interface for converging cluster infrastructure with a stored cluster
specification.

!*/

mod apply;
mod create;
mod delete;
mod list;

use anyhow::{Context, Result};
use clap::Parser;
use cluster_model::constants::DEFAULT_STATE_STORE_PATH;
use cluster_model::FileSystemStore;
use digitalocean_provider::{DigitalOceanProvider, HttpClient, HttpClientConfig};
use env_logger::Builder;
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

/// The crates whose log output `--log-level` controls.
const LOGGING_CRATES: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "cluster_model",
    "resource_reconciler",
    "digitalocean_provider",
];

/// The command line interface for creating, converging and tearing down clusters.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// The directory that holds stored cluster specifications.
    #[clap(
        long = "state-store-path",
        env = "CLUSTER_STATE_STORE_PATH",
        default_value = DEFAULT_STATE_STORE_PATH
    )]
    state_store_path: PathBuf,

    /// The DigitalOcean API access token.
    #[clap(
        long = "access-token",
        env = "DIGITALOCEAN_ACCESS_TOKEN",
        hide_env_values = true
    )]
    access_token: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// List the stored clusters.
    List(list::List),
    /// Validate a cluster specification and store it.
    Create(create::Create),
    /// Converge the infrastructure of a stored cluster with its specification.
    Apply(apply::Apply),
    /// Tear down the infrastructure of a stored cluster.
    Delete(delete::Delete),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let store = FileSystemStore::new(expand_home(args.state_store_path));
    let token = args.access_token;
    match args.command {
        Command::List(list) => list.run(&store),
        Command::Create(create) => create.run(&store),
        Command::Apply(apply) => apply.run(&store, provider(token)?).await,
        Command::Delete(delete) => delete.run(&store, provider(token)?).await,
    }
}

/// A DigitalOcean provider backed by the REST API.
fn provider(token: Option<String>) -> Result<DigitalOceanProvider> {
    let token = token.context(
        "An access token is required, pass '--access-token' or set DIGITALOCEAN_ACCESS_TOKEN",
    )?;
    let client = HttpClient::new(HttpClientConfig::new(token))
        .context("Unable to create the DigitalOcean client")?;
    Ok(DigitalOceanProvider::new(Arc::new(client)))
}

/// Replace a leading `~` with the home directory.
fn expand_home(path: PathBuf) -> PathBuf {
    let home = match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home),
        None => return path,
    };
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path,
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use the log level for this workspace's crates only.
            let mut builder = Builder::new();
            builder.filter_level(LevelFilter::Error);
            for name in LOGGING_CRATES {
                builder.filter(Some(*name), level);
            }
            builder.init();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn home_is_expanded() {
        let home = match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home),
            None => return,
        };
        assert_eq!(expand_home(PathBuf::from("~/state")), home.join("state"));
        assert_eq!(expand_home(PathBuf::from("./_state")), PathBuf::from("./_state"));
        assert_eq!(expand_home(PathBuf::from("/a/~")), PathBuf::from("/a/~"));
    }

    #[test]
    fn token_is_required() {
        assert!(provider(None).is_err());
    }
}
