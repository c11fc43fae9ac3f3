//! Resolving path specifications to local files.

use std::path::PathBuf;

use anyhow::Context;

use crate::options::{PathSpec, StorageOptions};

pub trait FileSystem: Send + Sync {
    /// Local paths of the files in `spec`, in order. Globs expand to the
    /// sorted list of matching files.
    fn open_local(
        &self,
        spec: &PathSpec,
        storage_options: &StorageOptions,
    ) -> anyhow::Result<Vec<PathBuf>>;
}

/// The local filesystem. Paths may carry a `file://` prefix, other protocols
/// are not supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

fn protocol(path: &str) -> Option<&str> {
    let (proto, _) = path.split_once("://")?;
    (!proto.is_empty() && proto.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)))
        .then_some(proto)
}

fn absolute(p: PathBuf) -> anyhow::Result<PathBuf> {
    if p.is_absolute() {
        Ok(p)
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}

/// Files matching `pattern`, sorted.
pub fn expand_glob(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
        let p = entry.with_context(|| format!("error reading glob entry for: {pattern}"))?;
        if p.is_file() {
            paths.push(p);
        }
    }

    ensure!(!paths.is_empty(), "no files match: {pattern}");
    paths.sort();

    Ok(paths)
}

impl LocalFileSystem {
    fn resolve(&self, path: &str) -> anyhow::Result<Vec<PathBuf>> {
        let path = match protocol(path) {
            Some("file") => &path["file://".len()..],
            Some(proto) => {
                return Err(anyhow!(
                    "protocol '{proto}' is not supported, only local files can be opened: {path}"
                ))
            }
            None => path,
        };

        let paths = if path.contains(['*', '?', '[']) {
            expand_glob(path)?
        } else {
            let p = PathBuf::from(path);
            ensure!(p.exists(), "no such file: {path}");
            vec![p]
        };

        paths.into_iter().map(absolute).collect()
    }
}

impl FileSystem for LocalFileSystem {
    fn open_local(
        &self,
        spec: &PathSpec,
        storage_options: &StorageOptions,
    ) -> anyhow::Result<Vec<PathBuf>> {
        if !storage_options.is_empty() {
            log::debug!("ignoring storage options for local files: {storage_options:?}");
        }

        let mut paths = Vec::new();
        for p in spec.as_slice() {
            paths.extend(self.resolve(p)?);
        }

        log::debug!("resolved {} file(s) from {spec:?}", paths.len());

        Ok(paths)
    }
}
