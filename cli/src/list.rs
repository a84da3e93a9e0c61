use anyhow::{Context, Result};
use clap::Parser;
use cluster_model::ClusterStore;

/// Print the name of every stored cluster.
#[derive(Debug, Parser)]
pub(crate) struct List {}

impl List {
    pub(crate) fn run<S>(self, store: &S) -> Result<()>
    where
        S: ClusterStore,
    {
        let names = store.list().context("Unable to list the stored clusters")?;
        for name in names {
            println!("{}", name);
        }
        Ok(())
    }
}
