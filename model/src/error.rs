use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the cluster model and its state store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to create directory '{}': {}", path.display(), source))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Cluster name '{}' cannot be used as a directory name", name))]
    InvalidName { name: String },

    #[snafu(display("Invalid CIDR '{}': {}", cidr, reason))]
    InvalidCidr { cidr: String, reason: String },

    #[snafu(display("Unable to list contents of directory '{}': {}", path.display(), source))]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to find cluster '{}'", name))]
    NotFound { name: String },

    #[snafu(display("Unable to read file '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to remove '{}': {}", path.display(), source))]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    SerdeJson {
        action: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    SerdeYaml {
        action: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("Invalid cluster '{}': {}", cluster, reason))]
    Validation { cluster: String, reason: String },

    #[snafu(display("Unable to write file '{}': {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
