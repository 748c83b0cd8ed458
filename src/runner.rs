use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::Stdio;
use std::thread;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cmd;
use crate::{EngineError, Result};

pub const PROGRESS_PATTERN: &str = r"\[download\]\s+(\d+\.?\d*)%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downloading,
    Retrying,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Retrying => "retrying",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: f64,
    pub text: String,
    pub stage: Stage,
}

impl ProgressEvent {
    pub fn downloading(percent: f64, text: impl Into<String>) -> Self {
        Self {
            percent,
            text: text.into(),
            stage: Stage::Downloading,
        }
    }

    pub fn retrying(text: impl Into<String>) -> Self {
        Self {
            percent: 0.0,
            text: text.into(),
            stage: Stage::Retrying,
        }
    }
}

pub trait ToolRunner {
    fn run(
        &self,
        binary: &Path,
        args: &[String],
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        binary: &Path,
        args: &[String],
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<()> {
        run_tool(binary, args, |event| on_event(event))
    }
}

pub fn run_tool<F>(binary: &Path, args: &[String], mut on_event: F) -> Result<()>
where
    F: FnMut(ProgressEvent),
{
    let progress_re = Regex::new(PROGRESS_PATTERN).expect("valid progress regex");
    let tool = tool_name(binary);

    log::debug!("running {tool} with {} arg(s)", args.len());

    let mut child = cmd::command(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ExternalToolMissing { tool: tool.clone() },
            _ => EngineError::Io(e),
        })?;

    let mut stderr = child.stderr.take().ok_or_else(|| {
        EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "stderr pipe missing",
        ))
    })?;
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    if let Some(stdout) = child.stdout.take() {
        let reader = BufReader::new(stdout);
        for line in reader.lines().flatten() {
            let percent = progress_re
                .captures(&line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|value| value / 100.0)
                .unwrap_or(0.0);
            on_event(ProgressEvent {
                percent,
                text: line,
                stage: Stage::Downloading,
            });
        }
    }

    let status = child.wait()?;
    let stderr_buf = stderr_handle.join().unwrap_or_default();

    if !status.success() {
        let stderr_text = String::from_utf8_lossy(&stderr_buf).trim().to_string();
        log::debug!("{tool} exited with code {:?}", status.code());
        return Err(EngineError::ExternalToolFailed {
            tool,
            code: status.code(),
            stderr: stderr_text,
        });
    }

    Ok(())
}

pub(crate) fn tool_name(binary: &Path) -> String {
    binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.to_string_lossy().into_owned())
}
