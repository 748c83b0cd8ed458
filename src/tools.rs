use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cmd;
use crate::paths::{AppPaths, YT_DLP_TOOL};
use crate::{EngineError, Result};

pub const YT_DLP_DOWNLOAD_URL_BASE: &str =
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";

const MIN_BINARY_BYTES: u64 = 512 * 1024;

pub fn yt_dlp_download_url() -> String {
    if cfg!(windows) {
        format!("{YT_DLP_DOWNLOAD_URL_BASE}.exe")
    } else {
        YT_DLP_DOWNLOAD_URL_BASE.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub managed_installed: bool,
    pub managed_path: String,
    pub resolved_path: String,
    pub version: Option<String>,
}

pub struct BinaryManager {
    paths: AppPaths,
}

impl BinaryManager {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    pub fn managed_path(&self) -> PathBuf {
        self.paths.yt_dlp_bin_path()
    }

    // Managed copy wins; otherwise the first PATH hit; otherwise the managed
    // location anyway so callers always get a deterministic answer.
    pub fn resolved_path(&self) -> PathBuf {
        resolve_tool(self.managed_path(), YT_DLP_TOOL)
    }

    pub fn status(&self) -> ToolStatus {
        let managed = self.managed_path();
        let resolved = self.resolved_path();
        let version = tool_version_first_line(&resolved, "--version");

        ToolStatus {
            managed_installed: managed.exists(),
            managed_path: managed.to_string_lossy().to_string(),
            resolved_path: resolved.to_string_lossy().to_string(),
            version,
        }
    }

    pub fn update_binary<F>(&self, report: F) -> Result<PathBuf>
    where
        F: FnMut(&str),
    {
        self.update_binary_from(&yt_dlp_download_url(), report)
    }

    fn update_binary_from<F>(&self, url: &str, mut report: F) -> Result<PathBuf>
    where
        F: FnMut(&str),
    {
        self.paths.ensure_dirs()?;

        let destination = self.managed_path();
        let tmp_path = destination.with_extension("download");

        report(&format!("Fetching from: {url}"));
        log::info!("fetching {YT_DLP_TOOL} from {url}");

        let resp = ureq::get(url)
            .call()
            .map_err(|e| EngineError::InstallFailed(format!("yt-dlp download failed: {e}")))?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(EngineError::InstallFailed(format!(
                "yt-dlp download failed (status={status})"
            )));
        }

        {
            let mut reader = resp.into_body().into_reader();
            let mut file = std::fs::File::create(&tmp_path)?;
            std::io::copy(&mut reader, &mut file)?;
            file.flush()?;
        }

        let downloaded_size = std::fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if downloaded_size < MIN_BINARY_BYTES {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(EngineError::InstallFailed(
                "downloaded yt-dlp is unexpectedly small".to_string(),
            ));
        }

        if destination.exists() {
            let _ = std::fs::remove_file(&destination);
        }
        if std::fs::rename(&tmp_path, &destination).is_err() {
            std::fs::copy(&tmp_path, &destination)?;
            let _ = std::fs::remove_file(&tmp_path);
        }

        mark_executable(&destination)?;

        report(&format!(
            "Updated successfully to: {}",
            destination.to_string_lossy()
        ));
        log::info!("installed {YT_DLP_TOOL} at {}", destination.to_string_lossy());
        Ok(destination)
    }
}

fn resolve_tool(managed: PathBuf, name: &str) -> PathBuf {
    if managed.exists() {
        return managed;
    }
    if let Some(found) = cmd::find_on_path(&cmd::executable_name(name)) {
        return found;
    }
    managed
}

fn tool_version_first_line(program: &Path, arg: &str) -> Option<String> {
    let output = cmd::command(program).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

#[cfg(unix)]
pub(crate) fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
