use anyhow::{Context, Result};
use clap::Parser;
use cluster_model::ClusterStore;
use resource_reconciler::{teardown, Provider, ReconcilerConfig};

/// Tear down the infrastructure of a stored cluster. Every resource is attempted even when some
/// fail.
#[derive(Debug, Parser)]
pub(crate) struct Delete {
    /// Name of the stored cluster.
    name: String,

    /// Also remove the stored specification once everything has been deleted.
    #[clap(long = "purge")]
    purge: bool,
}

impl Delete {
    pub(crate) async fn run<S, P>(self, store: &S, provider: P) -> Result<()>
    where
        S: ClusterStore,
        P: Provider,
    {
        teardown(provider, store, &self.name, ReconcilerConfig::default())
            .await
            .context(format!("Unable to delete cluster '{}'", self.name))?;
        if self.purge {
            store
                .destroy(&self.name)
                .context(format!("Unable to remove stored cluster '{}'", self.name))?;
            println!("Cluster '{}' was deleted and purged.", self.name);
        } else {
            println!("Cluster '{}' was deleted.", self.name);
        }
        Ok(())
    }
}
