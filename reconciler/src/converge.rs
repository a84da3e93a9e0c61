/*!

End-to-end passes that combine a [`Reconciler`] with a [`ClusterStore`]: the specification is
read or given, converged (or torn down), and the rendered result is written back to the store.

!*/

use crate::error::{self, PartialApply, PartialDestroy};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::resource::Provider;
use cluster_model::{Cluster, ClusterStore};
use log::{error, info};
use snafu::ResultExt;

/// Run a full pass that converges the infrastructure with `cluster` and persist the rendered
/// specification. When the pass stops early the partially rendered specification is still written
/// so that the progress is not lost.
pub async fn converge<P, S>(
    provider: P,
    store: &S,
    cluster: Cluster,
    config: ReconcilerConfig,
) -> Result<Cluster, PartialApply>
where
    P: Provider,
    S: ClusterStore + ?Sized,
{
    if let Err(error) = cluster.validate().context(error::ValidationSnafu) {
        return Err(PartialApply {
            rendered: cluster,
            error,
        });
    }
    info!("Converging cluster '{}'", cluster.name);
    let mut reconciler = Reconciler::new(provider, cluster.clone(), config);
    let result = async {
        reconciler.init()?;
        let expected = reconciler.get_expected().await?;
        let actual = reconciler.get_actual().await?;
        Ok::<_, crate::Error>((actual, expected))
    }
    .await;
    let (actual, expected) = match result {
        Ok(ok) => ok,
        Err(error) => {
            return Err(PartialApply {
                rendered: cluster,
                error,
            })
        }
    };

    match reconciler.reconcile(&actual, &expected).await {
        Ok(rendered) => match write(store, &rendered) {
            Ok(()) => Ok(rendered),
            Err(error) => Err(PartialApply { rendered, error }),
        },
        Err(partial) => {
            if let Err(e) = write(store, &partial.rendered) {
                error!(
                    "Unable to persist the partially reconciled cluster '{}': {}",
                    partial.rendered.name, e
                );
            }
            Err(partial)
        }
    }
}

/// Tear down the infrastructure of the stored cluster `name`. When every resource is deleted the
/// rendered specification, which no longer holds provider identifiers, is written back. Otherwise
/// the specification reflecting the deletions that did succeed is written and the errors are
/// returned.
pub async fn teardown<P, S>(
    provider: P,
    store: &S,
    name: &str,
    config: ReconcilerConfig,
) -> Result<Cluster, PartialDestroy>
where
    P: Provider,
    S: ClusterStore + ?Sized,
{
    let cluster = match store.read(name).context(error::StoreSnafu {
        action: format!("read cluster '{}'", name),
    }) {
        Ok(cluster) => cluster,
        Err(e) => {
            return Err(PartialDestroy {
                rendered: Cluster {
                    name: name.to_string(),
                    ..Default::default()
                },
                errors: vec![e],
            })
        }
    };
    info!("Tearing down cluster '{}'", cluster.name);
    let mut reconciler = Reconciler::new(provider, cluster.clone(), config);
    let observed = async {
        reconciler.init()?;
        reconciler.get_actual().await
    }
    .await;
    if let Err(e) = observed {
        return Err(PartialDestroy {
            rendered: cluster,
            errors: vec![e],
        });
    }

    match reconciler.destroy().await {
        Ok(rendered) => match write(store, &rendered) {
            Ok(()) => Ok(rendered),
            Err(e) => Err(PartialDestroy {
                rendered,
                errors: vec![e],
            }),
        },
        Err(mut partial) => {
            if let Err(e) = write(store, &partial.rendered) {
                partial.errors.push(e);
            }
            Err(partial)
        }
    }
}

fn write<S>(store: &S, cluster: &Cluster) -> crate::Result<()>
where
    S: ClusterStore + ?Sized,
{
    store.write(cluster).context(error::StoreSnafu {
        action: format!("write cluster '{}'", cluster.name),
    })
}
