use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::metadata::{self, MediaMetadata};
use crate::request::DownloadRequest;
use crate::runner::{ProcessRunner, ProgressEvent, ToolRunner};
use crate::{EngineError, Result};

pub const RATE_LIMIT_MARKER: &str = "HTTP Error 429";
pub const AUTH_MARKER: &str = "Sign in required";
pub const FRAGMENT_MARKER: &str = "fragment not found";

pub const UNKNOWN_TITLE: &str = "Unknown Video";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    AuthRequired,
    FragmentMissing,
    Other,
}

impl FailureKind {
    // Marker priority is fixed; a 429 page that also mentions signing in
    // is still a rate limit.
    pub fn classify(text: &str) -> Self {
        if text.contains(RATE_LIMIT_MARKER) {
            FailureKind::RateLimited
        } else if text.contains(AUTH_MARKER) {
            FailureKind::AuthRequired
        } else if text.contains(FRAGMENT_MARKER) {
            FailureKind::FragmentMissing
        } else {
            FailureKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(30),
        }
    }
}

fn rate_limit_notice(cooldown: Duration) -> String {
    format!("Rate limited. Waiting {}s...", cooldown.as_secs())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemOutcome {
    pub index: usize,
    pub url: String,
    pub title: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub fn normalize_batch_input(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(parsed) = Url::parse(trimmed) else {
            continue;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            continue;
        }
        urls.push(trimmed.to_string());
    }
    urls
}

pub struct Engine<R = ProcessRunner> {
    binary: PathBuf,
    policy: RetryPolicy,
    runner: R,
}

impl Engine<ProcessRunner> {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self::with_runner(binary, ProcessRunner)
    }
}

impl<R: ToolRunner> Engine<R> {
    pub fn with_runner(binary: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            policy: RetryPolicy::default(),
            runner,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    pub fn download<F>(&self, request: &DownloadRequest, mut on_event: F) -> Result<()>
    where
        F: FnMut(ProgressEvent),
    {
        let mut last_error: Option<EngineError> = None;

        for attempt in 1..=self.policy.max_attempts {
            let args = request.to_args();
            log::debug!(
                "download attempt {attempt}/{} for {}",
                self.policy.max_attempts,
                request.url
            );

            match self
                .runner
                .run(&self.binary, &args, &mut |event| on_event(event))
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let kind = FailureKind::classify(&err.to_string());
                    if kind == FailureKind::AuthRequired {
                        log::warn!("authentication wall for {}", request.url);
                        return Err(EngineError::AuthRequired);
                    }

                    // No notice and no sleep once the budget is spent.
                    if attempt < self.policy.max_attempts {
                        let (notice, delay) = match kind {
                            FailureKind::RateLimited => (
                                rate_limit_notice(self.policy.rate_limit_cooldown),
                                self.policy.rate_limit_cooldown,
                            ),
                            FailureKind::FragmentMissing => (
                                "Fragment missing, retrying...".to_string(),
                                self.policy.retry_delay,
                            ),
                            _ => (format!("Error: {err}. Retrying..."), self.policy.retry_delay),
                        };
                        on_event(ProgressEvent::retrying(notice));
                        std::thread::sleep(delay);
                    }

                    last_error = Some(err);
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Err(EngineError::Abandoned {
            attempts: self.policy.max_attempts,
            last,
        })
    }

    pub fn get_metadata(&self, url: &str) -> Result<MediaMetadata> {
        metadata::probe_url(&self.binary, url)
    }

    pub fn resolve_title(&self, url: &str) -> String {
        match self.get_metadata(url) {
            Ok(meta) if !meta.title.trim().is_empty() => meta.title,
            _ => UNKNOWN_TITLE.to_string(),
        }
    }

    pub fn run_batch<FEvent, FItem>(
        &self,
        urls: &[String],
        base: &DownloadRequest,
        mut on_event: FEvent,
        mut on_item: FItem,
    ) -> BatchSummary
    where
        FEvent: FnMut(usize, usize, ProgressEvent),
        FItem: FnMut(&BatchItemOutcome),
    {
        let total = urls.len();
        let mut summary = BatchSummary {
            total,
            succeeded: 0,
            failed: 0,
        };

        for (index, url) in urls.iter().enumerate() {
            let request = base.clone().with_url(url.clone());

            // Display title for the record; the raw URL stands in when the
            // probe has nothing usable.
            let title = match self.get_metadata(url) {
                Ok(meta) if !meta.title.trim().is_empty() => meta.title,
                _ => url.clone(),
            };

            let result = self.download(&request, |event| on_event(index, total, event));
            let outcome = BatchItemOutcome {
                index,
                url: url.clone(),
                title,
                error: result.as_ref().err().map(|e| e.to_string()),
            };
            match result {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    log::warn!("batch item {} of {total} failed: {err}", index + 1);
                    summary.failed += 1;
                }
            }
            on_item(&outcome);
        }

        summary
    }
}
