//! LogSink - job events as tracing records

use contracts::{ContractError, EventSink, JobEvent};
use tracing::{info, instrument};

pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, job_id = %event.job_id)
    )]
    async fn write(&mut self, event: &JobEvent) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            patient = %event.patient_id,
            clinician = %event.clinician_id,
            status = %event.status,
            detail = event.detail.as_deref().unwrap_or(""),
            "job event"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
