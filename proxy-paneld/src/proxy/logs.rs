use std::path::PathBuf;
use std::process::Stdio;
use async_trait::async_trait;
use tokio::process::Command;
use crate::collaborators::{LogSelector, LogSource};
use crate::config::ProxyConfig;

/// Proxy log levels, least severe first
const LEVELS: [&str; 4] = ["debug", "info", "warning", "error"];

fn severity(level: &str) -> Option<usize> {
    LEVELS.iter().position(|l| l.eq_ignore_ascii_case(level))
}

/// Severity of a proxy log line, read from its `[Level]` tag
fn line_severity(line: &str) -> Option<usize> {
    let start = line.find('[')?;
    let end = start + line[start..].find(']')?;
    severity(&line[start + 1..end])
}

/// Keep the last `count` lines at or above `level`. An empty level keeps everything.
fn filter_lines<'a>(lines: impl Iterator<Item = &'a str>, count: usize, level: &str) -> Vec<String> {
    let min = severity(level);
    let kept: Vec<&str> = lines
        .filter(|line| !line.trim().is_empty())
        .filter(|line| match min {
            None => true,
            Some(min) => line_severity(line).is_some_and(|s| s >= min),
        })
        .collect();

    kept[kept.len().saturating_sub(count)..]
        .iter()
        .map(|line| line.to_string())
        .collect()
}

/// journalctl priority for a proxy level
fn journal_priority(level: &str) -> &'static str {
    match severity(level) {
        Some(0) => "debug",
        Some(2) => "warning",
        Some(3) => "err",
        _ => "info",
    }
}

/// Reads proxy logs from its log file or from the systemd journal.
pub struct LogReader {
    log_file: PathBuf,
    unit: String,
}

impl LogReader {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            log_file: config.log_file.clone(),
            unit: config.unit.clone(),
        }
    }

    async fn from_file(&self, count: usize, level: &str) -> Vec<String> {
        match tokio::fs::read_to_string(&self.log_file).await {
            Ok(contents) => filter_lines(contents.lines(), count, level),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.log_file.display(), e);
                Vec::new()
            }
        }
    }

    async fn from_journal(&self, count: usize, level: &str) -> Vec<String> {
        let count = count.to_string();
        let output = Command::new("journalctl")
            .args(["-u", self.unit.as_str(), "--no-pager", "-o", "short-iso"])
            .args(["-n", count.as_str()])
            .args(["-p", journal_priority(level)])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Ok(output) => {
                tracing::warn!("journalctl exited with {}", output.status);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Failed to run journalctl: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl LogSource for LogReader {
    async fn read_logs(&self, count: usize, level: &str, selector: LogSelector) -> Vec<String> {
        match selector {
            LogSelector::File => self.from_file(count, level).await,
            LogSelector::Journal => self.from_journal(count, level).await,
        }
    }
}
