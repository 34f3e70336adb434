//! FileSink - append-only JSON-lines event log

use contracts::{ContractError, EventSink, JobEvent};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Event log file, created if missing
    pub path: PathBuf,
}

impl FileSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/events.jsonl"));

        Self { path }
    }
}

pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ContractError> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| ContractError::sink(name, "file sink closed"))
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, job_id = %event.job_id)
    )]
    async fn write(&mut self, event: &JobEvent) -> Result<(), ContractError> {
        let mut line =
            serde_json::to_vec(event).map_err(|e| ContractError::sink(&self.name, e.to_string()))?;
        line.push(b'\n');
        let name = self.name.clone();
        self.writer()?
            .write_all(&line)
            .map_err(|e| ContractError::sink(name, e.to_string()))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        let name = self.name.clone();
        self.writer()?
            .flush()
            .map_err(|e| ContractError::sink(name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::event;
    use contracts::JobStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log").join("events.jsonl");
        let config = FileSinkConfig { path: path.clone() };

        let mut sink = FileSink::new("audit", config.clone()).unwrap();
        sink.write(&event(JobStatus::Pending)).await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&event(JobStatus::Failed)).await.is_err());

        // reopening appends
        let mut sink = FileSink::new("audit", config).unwrap();
        sink.write(&event(JobStatus::Completed)).await.unwrap();
        sink.flush().await.unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let statuses: Vec<JobStatus> = contents
            .lines()
            .map(|l| serde_json::from_str::<JobEvent>(l).unwrap().status)
            .collect();
        assert_eq!(statuses, vec![JobStatus::Pending, JobStatus::Completed]);
    }
}
