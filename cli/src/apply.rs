use anyhow::{Context, Result};
use clap::Parser;
use cluster_model::ClusterStore;
use resource_reconciler::{converge, Provider, ReconcilerConfig};
use std::time::Duration;

/// Converge the infrastructure of a stored cluster and store the rendered result.
#[derive(Debug, Parser)]
pub(crate) struct Apply {
    /// Name of the stored cluster.
    name: String,

    /// How many seconds a single resource operation may take.
    #[clap(long = "timeout", default_value = "600")]
    timeout: u64,

    /// Keep going when a resource cannot be tagged.
    #[clap(long = "ignore-tag-errors")]
    ignore_tag_errors: bool,
}

impl Apply {
    pub(crate) async fn run<S, P>(self, store: &S, provider: P) -> Result<()>
    where
        S: ClusterStore,
        P: Provider,
    {
        let cluster = store
            .read(&self.name)
            .context(format!("Unable to read cluster '{}'", self.name))?;
        let config = ReconcilerConfig {
            operation_timeout: Some(Duration::from_secs(self.timeout)),
            tag_errors_are_fatal: !self.ignore_tag_errors,
        };
        // the partially rendered specification has been stored when this fails
        converge(provider, store, cluster, config)
            .await
            .context(format!("Unable to apply cluster '{}'", self.name))?;
        println!("Cluster '{}' is up to date.", self.name);
        Ok(())
    }
}
