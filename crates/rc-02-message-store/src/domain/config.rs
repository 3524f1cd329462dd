//! Store configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for the message store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for a file-backed store. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,

    /// Destructively clear the store when a node starts.
    pub reset_on_start: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}
