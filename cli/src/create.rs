use anyhow::{ensure, Context, Result};
use clap::{value_parser, Parser};
use cluster_model::{Cluster, ClusterStore};
use std::path::PathBuf;

/// Store the cluster specification in a YAML file at `path`.
#[derive(Debug, Parser)]
pub(crate) struct Create {
    /// Path to the cluster specification YAML file.
    #[clap(long = "file", short = 'f', value_parser = value_parser!(PathBuf))]
    path: PathBuf,

    /// Replace a stored cluster of the same name.
    #[clap(long = "force")]
    force: bool,
}

impl Create {
    pub(crate) fn run<S>(self, store: &S) -> Result<()>
    where
        S: ClusterStore,
    {
        let contents = std::fs::read_to_string(&self.path)
            .context(format!("Unable to read '{}'", self.path.display()))?;
        let cluster: Cluster = serde_yaml::from_str(&contents).context(format!(
            "Unable to parse a cluster specification from '{}'",
            self.path.display()
        ))?;
        cluster
            .validate()
            .context(format!("Cluster '{}' is not valid", cluster.name))?;
        ensure!(
            self.force || !store.exists(&cluster.name)?,
            "Cluster '{}' already exists, pass '--force' to replace it",
            cluster.name
        );
        store
            .write(&cluster)
            .context(format!("Unable to store cluster '{}'", cluster.name))?;
        println!("Successfully stored '{}'.", cluster.name);
        Ok(())
    }
}
