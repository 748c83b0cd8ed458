use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
pub const SAFE_OUTPUT_TEMPLATE: &str = "safe_%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    Video,
    Audio,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Video => "video",
            DownloadMode::Audio => "audio",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "video" => Some(DownloadMode::Video),
            "audio" => Some(DownloadMode::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub mode: DownloadMode,
    pub quality: String,
    pub trim_start: Option<String>,
    pub trim_end: Option<String>,
    pub playlist: bool,
    pub playlist_items: Option<String>,
    pub embed_subs: bool,
    pub auto_subs: bool,
    pub sub_language: String,
    pub sponsorblock: bool,
    pub safe_mode: bool,
    pub client: String,
    pub cookies_path: Option<PathBuf>,
}

impl Default for DownloadRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            output_dir: PathBuf::from("."),
            mode: DownloadMode::Video,
            quality: "Best".to_string(),
            trim_start: None,
            trim_end: None,
            playlist: false,
            playlist_items: None,
            embed_subs: false,
            auto_subs: false,
            sub_language: "en".to_string(),
            sponsorblock: false,
            safe_mode: false,
            client: "Web".to_string(),
            cookies_path: None,
        }
    }
}

impl DownloadRequest {
    pub fn with_url(self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let template = self.output_dir.join(OUTPUT_TEMPLATE);

        // Safe mode keeps the command minimal for sources that choke on
        // post-processing flags.
        if self.safe_mode {
            let safe_template = self.output_dir.join(SAFE_OUTPUT_TEMPLATE);
            return vec![
                self.url.clone(),
                "-o".to_string(),
                safe_template.to_string_lossy().into_owned(),
                "-f".to_string(),
                "best".to_string(),
            ];
        }

        let mut args = vec![
            self.url.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-mtime".to_string(),
            "--newline".to_string(),
            "--add-metadata".to_string(),
            "--embed-thumbnail".to_string(),
        ];

        if self.playlist {
            args.push("--yes-playlist".to_string());
            if let Some(items) = self.playlist_items.as_deref().filter(|s| !s.is_empty()) {
                args.push("--playlist-items".to_string());
                args.push(items.to_string());
            }
        } else {
            args.push("--no-playlist".to_string());
        }

        if self.embed_subs {
            args.push("--embed-subs".to_string());
            args.push("--convert-subs".to_string());
            args.push("srt".to_string());
            if self.auto_subs {
                args.push("--write-auto-subs".to_string());
            }
            let langs = match self.sub_language.as_str() {
                "de" => "de.*,en.*",
                "all" => "all",
                _ => "en.*",
            };
            args.push("--sub-langs".to_string());
            args.push(langs.to_string());
        }

        match self.mode {
            DownloadMode::Audio => {
                args.push("-x".to_string());
                match self.quality.as_str() {
                    "mp3" => {
                        args.push("--audio-format".to_string());
                        args.push("mp3".to_string());
                        args.push("--audio-quality".to_string());
                        args.push("0".to_string());
                    }
                    "m4a" => {
                        args.push("--audio-format".to_string());
                        args.push("m4a".to_string());
                    }
                    _ => {
                        args.push("--audio-format".to_string());
                        args.push("best".to_string());
                    }
                }
            }
            DownloadMode::Video => {
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
                let filter = match self.quality.as_str() {
                    "4k" => "bestvideo[height<=2160]+bestaudio/best",
                    "1080p" => "bestvideo[height<=1080]+bestaudio/best",
                    "720p" => "bestvideo[height<=720]+bestaudio/best",
                    _ => "bestvideo+bestaudio/best",
                };
                args.push("-f".to_string());
                args.push(filter.to_string());
            }
        }

        if let Some(start) = self.trim_start.as_deref().filter(|s| !s.is_empty()) {
            let section = match self.trim_end.as_deref().filter(|s| !s.is_empty()) {
                Some(end) => format!("*{start}-{end}"),
                None => format!("*{start}-inf"),
            };
            args.push("--download-sections".to_string());
            args.push(section);
            args.push("--force-keyframes-at-cuts".to_string());
        }

        if self.sponsorblock {
            args.push("--sponsorblock-remove".to_string());
            args.push("all".to_string());
        }

        // "Web" is the extractor default; only spoofs need the flag.
        if !self.client.is_empty() && self.client != "Web" {
            args.push("--extractor-args".to_string());
            args.push(format!(
                "youtube:player_client={}",
                self.client.to_uppercase()
            ));
        }

        if let Some(cookies) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args
    }
}
