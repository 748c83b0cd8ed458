use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cmd;
use crate::tools::mark_executable;
use crate::{EngineError, Result};

pub const APP_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub const RELEASE_API_URL: &str =
    "https://api.github.com/repos/tubefetch-app/tubefetch/releases/latest";

const WINDOWS_ASSET: &str = "tubefetch-windows-amd64.exe";
const LINUX_ASSET: &str = "tubefetch-linux-amd64";
const APPIMAGE_SUFFIX: &str = ".AppImage";

const UPDATE_COPY_BUF: usize = 32 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageMode {
    Binary,
    AppImage,
}

impl PackageMode {
    pub fn detect() -> Self {
        match std::env::var("APPIMAGE") {
            Ok(v) if !v.trim().is_empty() => PackageMode::AppImage,
            _ => PackageMode::Binary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStrategy {
    // Rename straight over the live file.
    Rename,
    // Park the live file under .old first; Windows refuses to replace a
    // running image in place. The .old file is left behind.
    RenameWithBackup,
}

impl SwapStrategy {
    pub fn for_current_platform() -> Self {
        if cfg!(windows) {
            SwapStrategy::RenameWithBackup
        } else {
            SwapStrategy::Rename
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateCheck {
    pub version: String,
    pub download_url: String,
}

pub struct AppUpdater {
    api_url: String,
    current_version: String,
    package: PackageMode,
    swap: SwapStrategy,
}

impl Default for AppUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl AppUpdater {
    pub fn new() -> Self {
        Self {
            api_url: RELEASE_API_URL.to_string(),
            current_version: APP_VERSION.to_string(),
            package: PackageMode::detect(),
            swap: SwapStrategy::for_current_platform(),
        }
    }

    pub fn check_for_update(&self) -> Result<Option<UpdateCheck>> {
        log::info!("checking release feed at {}", self.api_url);
        let release = fetch_release(&self.api_url)?;

        // An empty tag reads as "nothing published"; same tag means current.
        if release.tag_name.is_empty() || release.tag_name == self.current_version {
            return Ok(None);
        }

        let Some(download_url) = select_asset_url(&release, self.package) else {
            return Err(EngineError::UpdateFailed(
                "no compatible release asset found".to_string(),
            ));
        };

        Ok(Some(UpdateCheck {
            version: release.tag_name,
            download_url,
        }))
    }

    pub fn apply_update<F>(&self, download_url: &str, on_progress: F) -> Result<()>
    where
        F: FnMut(f64),
    {
        let target = self.update_target()?;
        stage_and_swap(download_url, &target, self.swap, on_progress)
    }

    pub fn restart(&self) -> Result<()> {
        let target = self.update_target()?;
        log::info!("restarting into {}", target.to_string_lossy());
        cmd::command(&target).spawn()?;
        std::process::exit(0);
    }

    fn update_target(&self) -> Result<PathBuf> {
        match self.package {
            PackageMode::AppImage => {
                let path = std::env::var("APPIMAGE").map_err(|_| {
                    EngineError::UpdateFailed(
                        "APPIMAGE environment variable is not set".to_string(),
                    )
                })?;
                Ok(PathBuf::from(path))
            }
            PackageMode::Binary => Ok(std::env::current_exe()?),
        }
    }
}

fn fetch_release(api_url: &str) -> Result<Release> {
    let mut config = ureq::Agent::config_builder();
    config = config
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(25)));
    let agent: ureq::Agent = config.build().into();

    let mut resp = agent
        .get(api_url)
        .call()
        .map_err(|e| EngineError::UpdateFailed(format!("release check failed: {e}")))?;
    let status = resp.status();
    if status.as_u16() >= 400 {
        return Err(EngineError::UpdateFailed(format!(
            "release check failed (status={status})"
        )));
    }

    let mut body = String::new();
    resp.body_mut().as_reader().read_to_string(&mut body)?;
    serde_json::from_str(&body)
        .map_err(|e| EngineError::UpdateFailed(format!("release feed decode failed: {e}")))
}

fn select_asset_url(release: &Release, package: PackageMode) -> Option<String> {
    match package {
        PackageMode::AppImage => release
            .assets
            .iter()
            .find(|asset| asset.name.ends_with(APPIMAGE_SUFFIX))
            .map(|asset| asset.browser_download_url.clone()),
        PackageMode::Binary => {
            let wanted = if cfg!(windows) {
                WINDOWS_ASSET
            } else {
                LINUX_ASSET
            };
            release
                .assets
                .iter()
                .find(|asset| asset.name == wanted)
                .map(|asset| asset.browser_download_url.clone())
        }
    }
}

fn stage_and_swap<F>(
    download_url: &str,
    target: &Path,
    strategy: SwapStrategy,
    on_progress: F,
) -> Result<()>
where
    F: FnMut(f64),
{
    let staged = sibling_with_suffix(target, ".new");

    if let Err(err) = stage_update(download_url, &staged, on_progress) {
        let _ = std::fs::remove_file(&staged);
        return Err(err);
    }
    if let Err(err) = swap_into_place(target, &staged, strategy) {
        let _ = std::fs::remove_file(&staged);
        return Err(err);
    }
    Ok(())
}

fn stage_update<F>(download_url: &str, staged: &Path, mut on_progress: F) -> Result<()>
where
    F: FnMut(f64),
{
    log::info!("downloading update from {download_url}");

    let resp = ureq::get(download_url)
        .call()
        .map_err(|e| EngineError::UpdateFailed(format!("update download failed: {e}")))?;
    let status = resp.status();
    if status.as_u16() >= 400 {
        return Err(EngineError::UpdateFailed(format!(
            "update download failed (status={status})"
        )));
    }

    let total_bytes = resp
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let mut reader = resp.into_body().into_reader();
    let mut file = std::fs::File::create(staged)?;

    let mut buf = [0u8; UPDATE_COPY_BUF];
    let mut downloaded = 0_u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        downloaded += n as u64;
        // Without a known length there is no meaningful fraction.
        if total_bytes > 0 {
            on_progress(downloaded as f64 / total_bytes as f64);
        }
    }
    file.flush()?;
    drop(file);

    mark_executable(staged)?;
    Ok(())
}

fn swap_into_place(target: &Path, staged: &Path, strategy: SwapStrategy) -> Result<()> {
    match strategy {
        SwapStrategy::Rename => {
            std::fs::rename(staged, target)?;
        }
        SwapStrategy::RenameWithBackup => {
            let backup = sibling_with_suffix(target, ".old");
            // The live file may already be gone; only the second rename
            // decides success.
            let _ = std::fs::rename(target, &backup);
            std::fs::rename(staged, target)?;
        }
    }
    Ok(())
}

fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}
