/// The tag key that every resource of a cluster carries, with the cluster name as its value.
pub const CLUSTER_TAG_KEY: &str = "KubernetesCluster";

/// The file that holds a cluster specification inside its state store directory.
pub const CLUSTER_FILE_NAME: &str = "cluster.yaml";

/// The state store directory used when none is given.
pub const DEFAULT_STATE_STORE_PATH: &str = "./_state";
