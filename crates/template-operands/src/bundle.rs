//! # Template bundle cache
//!
//! The bundle for a release is read from
//! `<bundle_dir>/common-templates-<version>.yaml` the first time any reconcile
//! asks for it. The outcome, success or failure, is latched for the lifetime
//! of the cache: later calls never re-read the file, even when they pass a
//! different version.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::template::Template;

pub const BUNDLE_COMPONENT: &str = "common-templates";
pub const BUNDLE_EXTENSION: &str = "yaml";

/// Fatal bundle faults; the operand cannot make progress without templates
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("failed to read template bundle {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("no templates could be found in the installed bundle {path}")]
    Empty { path: PathBuf },
}

/// Location of the bundle file for `version`.
#[must_use]
pub fn bundle_path(dir: &Path, version: &str) -> PathBuf {
    dir.join(format!("{BUNDLE_COMPONENT}-{version}.{BUNDLE_EXTENSION}"))
}

/// Where bundle contents come from
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<Template>, BundleError>;
}

/// Reads a multi-document YAML file of templates from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlBundleSource;

#[async_trait]
impl BundleSource for YamlBundleSource {
    async fn read(&self, path: &Path) -> Result<Vec<Template>, BundleError> {
        let unreadable = |reason: String| BundleError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;

        let mut templates = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&raw) {
            let value = serde_yaml::Value::deserialize(document)
                .map_err(|e| unreadable(format!("invalid YAML: {e}")))?;
            if value.is_null() {
                continue;
            }
            let template: Template = serde_yaml::from_value(value)
                .map_err(|e| unreadable(format!("invalid template: {e}")))?;
            templates.push(template);
        }
        Ok(templates)
    }
}

/// Outcome of the single bundle read, with the version it was read for
struct Loaded {
    version: String,
    outcome: Result<Arc<[Template]>, BundleError>,
}

/// One-time loader for the template bundle
pub struct BundleCache<S = YamlBundleSource> {
    dir: PathBuf,
    source: S,
    cell: OnceCell<Loaded>,
}

impl BundleCache<YamlBundleSource> {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_source(dir, YamlBundleSource)
    }
}

impl<S: BundleSource> BundleCache<S> {
    #[must_use]
    pub fn with_source(dir: impl Into<PathBuf>, source: S) -> Self {
        Self {
            dir: dir.into(),
            source,
            cell: OnceCell::new(),
        }
    }

    /// Returns the bundle, reading it on the first call only.
    ///
    /// Concurrent first callers wait for the single read and share its result.
    /// `version` only matters for that first read.
    pub async fn load(&self, version: &str) -> Result<Arc<[Template]>, BundleError> {
        if let Some(loaded) = self.cell.get() {
            if loaded.version != version {
                warn!(
                    loaded = %loaded.version,
                    requested = %version,
                    "Template bundle already loaded; ignoring requested version"
                );
            }
            return loaded.outcome.clone();
        }

        self.cell
            .get_or_init(|| async {
                let path = bundle_path(&self.dir, version);
                let outcome = self.read_once(&path).await;
                match &outcome {
                    Ok(templates) => info!(
                        path = %path.display(),
                        count = templates.len(),
                        "Loaded template bundle"
                    ),
                    Err(e) => error!(error = %e, "Error reading from template bundle"),
                }
                Loaded {
                    version: version.to_string(),
                    outcome,
                }
            })
            .await
            .outcome
            .clone()
    }

    /// Templates from a successful load, if one has happened.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<[Template]>> {
        match self.cell.get().map(|loaded| &loaded.outcome) {
            Some(Ok(templates)) => Some(Arc::clone(templates)),
            _ => None,
        }
    }

    /// Version the bundle was first requested for, whether or not it loaded.
    #[must_use]
    pub fn loaded_version(&self) -> Option<&str> {
        self.cell.get().map(|loaded| loaded.version.as_str())
    }

    async fn read_once(&self, path: &Path) -> Result<Arc<[Template]>, BundleError> {
        let templates = self.source.read(path).await?;
        if templates.is_empty() {
            return Err(BundleError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(templates.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        reads: AtomicUsize,
        templates: Vec<Template>,
    }

    #[async_trait]
    impl BundleSource for CountingSource {
        async fn read(&self, _path: &Path) -> Result<Vec<Template>, BundleError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.templates.clone())
        }
    }

    fn counting(templates: Vec<Template>) -> CountingSource {
        CountingSource {
            reads: AtomicUsize::new(0),
            templates,
        }
    }

    #[test]
    fn bundle_path_follows_component_version_pattern() {
        assert_eq!(
            bundle_path(Path::new("/data/bundle"), "v0.16.2"),
            PathBuf::from("/data/bundle/common-templates-v0.16.2.yaml")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_callers_share_one_read() {
        let cache = Arc::new(BundleCache::with_source(
            "/bundle",
            counting(vec![Template::new("a"), Template::new("b")]),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.load("v1").await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(cache.source.reads.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(results[0].len(), 2);
    }

    #[tokio::test]
    async fn later_versions_return_the_first_load() {
        let cache = BundleCache::with_source("/bundle", counting(vec![Template::new("a")]));

        let first = cache.load("v1").await.unwrap();
        let second = cache.load("v2").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_requested_version_is_recorded_without_labels() {
        let cache = BundleCache::with_source("/bundle", counting(vec![Template::new("a")]));
        assert_eq!(cache.loaded_version(), None);

        cache.load("v1").await.unwrap();
        cache.load("v2").await.unwrap();

        assert_eq!(cache.loaded_version(), Some("v1"));
    }

    #[tokio::test]
    async fn failed_load_still_records_its_version() {
        let cache = BundleCache::with_source("/bundle", counting(Vec::new()));

        assert!(cache.load("v3").await.is_err());

        assert_eq!(cache.loaded_version(), Some("v3"));
    }

    #[tokio::test]
    async fn empty_bundle_is_latched_as_fatal() {
        let cache = BundleCache::with_source("/bundle", counting(Vec::new()));

        let err = cache.load("v1").await.unwrap_err();
        assert!(matches!(err, BundleError::Empty { .. }));
        assert_eq!(cache.load("v1").await.unwrap_err(), err);
        assert_eq!(cache.source.reads.load(Ordering::SeqCst), 1);
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn reads_multi_document_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r"
apiVersion: template.openshift.io/v1
kind: Template
metadata:
  name: fedora-server-small
  labels:
    template.kubevirt.io/type: base
objects:
  - apiVersion: kubevirt.io/v1
    kind: VirtualMachine
parameters:
  - name: NAME
    generate: expression
---
apiVersion: template.openshift.io/v1
kind: Template
metadata:
  name: rhel9-server-small
---
";
        std::fs::write(bundle_path(dir.path(), "v1"), yaml).unwrap();

        let cache = BundleCache::new(dir.path());
        let templates = cache.load("v1").await.unwrap();

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].objects.len(), 1);
        assert_eq!(templates[0].parameters[0].generate.as_deref(), Some("expression"));
        assert_eq!(templates[1].metadata.name.as_deref(), Some("rhel9-server-small"));
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(dir.path());

        assert!(matches!(
            cache.load("v404").await,
            Err(BundleError::Unreadable { .. })
        ));
    }
}
