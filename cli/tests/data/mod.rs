use std::path::PathBuf;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
}

/// A DigitalOcean cluster named `prod` with a master pool and a node pool.
pub fn prod_path() -> PathBuf {
    data_dir().join("prod.yaml")
}
