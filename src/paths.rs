use std::path::PathBuf;

use crate::cmd;

pub const YT_DLP_TOOL: &str = "yt-dlp";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.base_dir.join("bin")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.base_dir.join("db")
    }

    pub fn yt_dlp_bin_path(&self) -> PathBuf {
        self.bin_dir().join(cmd::executable_name(YT_DLP_TOOL))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.bin_dir())?;
        std::fs::create_dir_all(self.db_dir())?;
        Ok(())
    }

    pub fn default_base_dir() -> Option<PathBuf> {
        if let Ok(v) = std::env::var("TUBEFETCH_BASE_DIR") {
            let t = v.trim();
            if !t.is_empty() {
                return Some(PathBuf::from(t));
            }
        }

        if cfg!(windows) {
            if let Ok(appdata) = std::env::var("APPDATA") {
                let t = appdata.trim();
                if !t.is_empty() {
                    return Some(PathBuf::from(t).join("tubefetch"));
                }
            }
            return None;
        }

        let home = std::env::var("HOME").ok()?;
        let t = home.trim();
        if t.is_empty() {
            return None;
        }
        Some(PathBuf::from(t).join(".config").join("tubefetch"))
    }

    pub fn default_download_dir() -> Option<PathBuf> {
        let home = if cfg!(windows) {
            std::env::var("USERPROFILE").ok()?
        } else {
            std::env::var("HOME").ok()?
        };
        let t = home.trim();
        if t.is_empty() {
            return None;
        }
        Some(PathBuf::from(t).join("Downloads"))
    }
}
