//! Per-location reading sources

mod jsonl;

pub use jsonl::JsonlSource;

use crate::types::{Reading, Result, TimeReference};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces the readings of a single location
pub trait LocationSource: Send + Sync {
    /// Location name every loaded reading is tagged with
    fn location(&self) -> &str;

    /// Load all readings. Blocking; the combiner runs it off the async runtime.
    fn load(&self) -> Result<Vec<Reading>>;
}

/// Registry of configured sources, in configuration order
pub struct SourceRegistry {
    sources: Vec<Arc<dyn LocationSource>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Arc<dyn LocationSource>>) -> Self {
        Self { sources }
    }

    /// One JSONL source per `*.jsonl` file in `data_dir`, named after the file stem
    pub fn discover(data_dir: &Path, time_ref: TimeReference) -> Self {
        let pattern = data_dir.join("*.jsonl");
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|paths| paths.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        files.sort();

        let sources = files
            .into_iter()
            .filter_map(|path| {
                let location = path.file_stem()?.to_string_lossy().into_owned();
                Some(Arc::new(JsonlSource::new(location, path, time_ref)) as Arc<dyn LocationSource>)
            })
            .collect();

        Self { sources }
    }

    /// Sources for an explicit location list. Files need not exist yet;
    /// a missing file surfaces later as a load failure.
    pub fn for_locations<S: AsRef<str>>(
        data_dir: &Path,
        locations: &[S],
        time_ref: TimeReference,
    ) -> Self {
        let sources = locations
            .iter()
            .map(|location| {
                let location = location.as_ref();
                let path = data_dir.join(format!("{}.jsonl", location));
                Arc::new(JsonlSource::new(location, path, time_ref)) as Arc<dyn LocationSource>
            })
            .collect();

        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn LocationSource>] {
        &self.sources
    }

    pub fn get(&self, location: &str) -> Option<&dyn LocationSource> {
        self.sources
            .iter()
            .find(|s| s.location() == location)
            .map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
