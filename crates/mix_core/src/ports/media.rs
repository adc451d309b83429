//! Input resolution: from a job's `media_ref` to named stem byte buffers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::orchestrator::errors::{PipelineError, PipelineResult};

use super::JobStore;

/// Resolves an opaque media reference into named byte buffers.
pub trait MediaSource: Send + Sync {
    fn resolve(&self, job_id: &str, media_ref: &str) -> PipelineResult<BTreeMap<String, Vec<u8>>>;
}

/// Media source backed by the job store's input buffers (the upload path
/// stores stems there; `media_ref` is unused).
pub struct StoreMediaSource {
    store: Arc<dyn JobStore>,
}

impl StoreMediaSource {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

impl MediaSource for StoreMediaSource {
    fn resolve(&self, job_id: &str, _media_ref: &str) -> PipelineResult<BTreeMap<String, Vec<u8>>> {
        let inputs = self.store.get_inputs(job_id);
        if inputs.is_empty() {
            return Err(PipelineError::input_missing(format!(
                "no inputs stored for job '{job_id}'"
            )));
        }
        Ok(inputs)
    }
}

/// Media source reading a local directory; `media_ref` names a directory
/// under the configured root (or an absolute path). Backed by
/// `MIX_MEDIA_DIR` in the worker settings.
pub struct DirMediaSource {
    root: PathBuf,
}

impl DirMediaSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_for(&self, media_ref: &str) -> PathBuf {
        let path = PathBuf::from(media_ref);
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

impl MediaSource for DirMediaSource {
    fn resolve(&self, _job_id: &str, media_ref: &str) -> PipelineResult<BTreeMap<String, Vec<u8>>> {
        let dir = self.dir_for(media_ref);
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            PipelineError::input_missing(format!("cannot read media dir {}: {e}", dir.display()))
        })?;

        let mut out = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match std::fs::read(&path) {
                Ok(bytes) => {
                    out.insert(name.to_string(), bytes);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), "skipping unreadable input: {e}");
                }
            }
        }

        if out.is_empty() {
            return Err(PipelineError::input_missing(format!(
                "no files in media dir {}",
                dir.display()
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MemoryJobStore;

    #[test]
    fn store_source_requires_inputs() {
        let store = Arc::new(MemoryJobStore::new());
        let source = StoreMediaSource::new(store.clone());
        assert!(matches!(
            source.resolve("j", "ignored"),
            Err(PipelineError::InputMissing { .. })
        ));

        store.put_input("j", "kick.wav", vec![1, 2]);
        let inputs = source.resolve("j", "ignored").unwrap();
        assert_eq!(inputs["kick.wav"], vec![1, 2]);
    }

    #[test]
    fn dir_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"bytes").unwrap();

        let source = DirMediaSource::new(dir.path());
        let inputs = source.resolve("j", ".").unwrap();
        assert_eq!(inputs["a.wav"], b"bytes".to_vec());
    }

    #[test]
    fn missing_dir_is_input_missing() {
        let source = DirMediaSource::new("/definitely/not/here");
        assert!(matches!(
            source.resolve("j", "nope"),
            Err(PipelineError::InputMissing { .. })
        ));
    }
}
