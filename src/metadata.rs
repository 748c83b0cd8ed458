use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cmd;
use crate::runner;
use crate::{EngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, rename = "_type")]
    pub kind: String,
    #[serde(default)]
    pub playlist_count: Option<i64>,
    #[serde(default)]
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl MediaMetadata {
    pub fn is_playlist(&self) -> bool {
        self.kind == "playlist"
    }

    pub fn entry_total(&self) -> usize {
        match self.playlist_count {
            Some(count) if count > 0 => count as usize,
            _ => self.entries.len(),
        }
    }
}

// Single-shot probe; callers deal with failures, there is no retry here.
pub fn probe_url(binary: &Path, url: &str) -> Result<MediaMetadata> {
    let tool = runner::tool_name(binary);

    let output = cmd::command(binary)
        .args(["--dump-single-json", "--flat-playlist"])
        .arg(url)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ExternalToolMissing { tool: tool.clone() },
            _ => EngineError::Io(e),
        })?;

    if !output.status.success() {
        return Err(EngineError::ExternalToolFailed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| EngineError::MetadataInvalid(e.to_string()))
}
