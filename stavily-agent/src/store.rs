//! Plugin Store: the on-disk index of installed plugins.
//!
//! A flat directory with one subdirectory per plugin id. The store is
//! read-only from the perspective of every caller except the Downloader;
//! it exposes only two predicates: is a plugin installed, and where does
//! it live on disk.

use std::path::{Path, PathBuf};

/// Name of the optional plugin manifest, checked for layout validation.
const MANIFEST_FILE: &str = "plugin.yaml";

#[derive(Debug, Clone)]
pub struct PluginStore {
    base: PathBuf,
}

impl PluginStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path(&self, plugin_id: &str) -> PathBuf {
        self.base.join(plugin_id)
    }

    /// True iff `plugin_id` has a root directory containing either the
    /// manifest or the given entrypoint.
    pub fn is_installed(&self, plugin_id: &str, entrypoint: Option<&str>) -> bool {
        validate_layout(&self.path(plugin_id), entrypoint)
    }
}

/// A directory is a valid plugin root iff it contains `plugin.yaml` or
/// the configured entrypoint file.
pub fn validate_layout(root: &Path, entrypoint: Option<&str>) -> bool {
    if !root.is_dir() {
        return false;
    }
    if root.join(MANIFEST_FILE).is_file() {
        return true;
    }
    match entrypoint {
        Some(entry) => root.join(entry).is_file(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absent_directory_is_not_installed() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        assert!(!store.is_installed("missing", Some("main.py")));
    }

    #[test]
    fn directory_with_manifest_is_installed() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        let plugin_dir = store.path("p1");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.yaml"), "entrypoint: main.py").unwrap();
        assert!(store.is_installed("p1", None));
    }

    #[test]
    fn directory_with_only_entrypoint_is_installed() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        let plugin_dir = store.path("p2");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("main.py"), "print('hi')").unwrap();
        assert!(store.is_installed("p2", Some("main.py")));
        assert!(!store.is_installed("p2", Some("other.py")));
    }
}
