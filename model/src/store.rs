use crate::constants::CLUSTER_FILE_NAME;
use crate::error::{self, Result};
use crate::validate::is_directory_name;
use crate::Cluster;
use log::{debug, trace};
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists cluster specifications between reconciliation passes. The reconciler assumes that it
/// is the only writer of a given cluster for the duration of a pass; mutual exclusion between
/// passes is up to the store.
pub trait ClusterStore: Send + Sync {
    /// The names of all stored clusters.
    fn list(&self) -> Result<Vec<String>>;

    fn exists(&self, name: &str) -> Result<bool>;

    fn read(&self, name: &str) -> Result<Cluster>;

    /// Create or overwrite the stored specification for `cluster.name`.
    fn write(&self, cluster: &Cluster) -> Result<()>;

    /// Remove the stored specification for `name`.
    fn destroy(&self, name: &str) -> Result<()>;
}

/// A [`ClusterStore`] that keeps one directory per cluster under `base_path`, each holding a
/// `cluster.yaml` file.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    pub fn new<P>(base_path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The directory of cluster `name`, which must stay directly under `base_path`.
    fn cluster_dir(&self, name: &str) -> Result<PathBuf> {
        ensure!(is_directory_name(name), error::InvalidNameSnafu { name });
        Ok(self.base_path.join(name))
    }

    fn cluster_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.cluster_dir(name)?.join(CLUSTER_FILE_NAME))
    }
}

impl ClusterStore for FileSystemStore {
    fn list(&self) -> Result<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let read_dir = fs::read_dir(&self.base_path).context(error::ListDirectorySnafu {
            path: &self.base_path,
        })?;
        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.context(error::ListDirectorySnafu {
                path: &self.base_path,
            })?;
            let path = entry.path();
            if !path.join(CLUSTER_FILE_NAME).is_file() {
                trace!("Skipping '{}', it holds no cluster", path.display());
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.cluster_file(name)?.is_file())
    }

    fn read(&self, name: &str) -> Result<Cluster> {
        let path = self.cluster_file(name)?;
        ensure!(path.is_file(), error::NotFoundSnafu { name });
        debug!("Reading cluster '{}' from '{}'", name, path.display());
        let contents = fs::read_to_string(&path).context(error::ReadFileSnafu { path: &path })?;
        serde_yaml::from_str(&contents).context(error::SerdeYamlSnafu {
            action: format!("deserialize '{}'", path.display()),
        })
    }

    fn write(&self, cluster: &Cluster) -> Result<()> {
        let dir = self.cluster_dir(&cluster.name)?;
        fs::create_dir_all(&dir).context(error::CreateDirSnafu { path: &dir })?;
        let path = dir.join(CLUSTER_FILE_NAME);
        let contents = serde_yaml::to_string(cluster).context(error::SerdeYamlSnafu {
            action: format!("serialize cluster '{}'", cluster.name),
        })?;
        debug!("Writing cluster '{}' to '{}'", cluster.name, path.display());
        fs::write(&path, contents).context(error::WriteFileSnafu { path: &path })
    }

    fn destroy(&self, name: &str) -> Result<()> {
        let dir = self.cluster_dir(name)?;
        ensure!(dir.is_dir(), error::NotFoundSnafu { name });
        debug!("Removing cluster '{}' from '{}'", name, dir.display());
        fs::remove_dir_all(&dir).context(error::RemoveSnafu { path: &dir })
    }
}
