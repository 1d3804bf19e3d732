use crate::errors::CodeboxError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One user-triggered execution. Built only from source text that passed
/// validation, so holding one means the input is non-blank.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    id: Uuid,
    source_text: String,
    requested_at: DateTime<Utc>,
}

impl ExecutionRequest {
    pub fn new(source_text: &str, max_source_bytes: usize) -> Result<Self, CodeboxError> {
        if source_text.trim().is_empty() {
            return Err(CodeboxError::validation(
                "Please enter some code before running.",
            ));
        }
        if source_text.len() > max_source_bytes {
            return Err(CodeboxError::validation(format!(
                "Source is {} bytes, the limit is {} bytes",
                source_text.len(),
                max_source_bytes
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            source_text: source_text.to_string(),
            requested_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// First segment of the id, enough to tell concurrent requests apart in logs.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..12].to_string()
    }
}
