use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Static provisioning data for one upstream LLM credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: u32,
    pub credential: String,
    pub daily_limit_tokens: u64,
    pub daily_limit_requests: u32,
    pub minute_limit_requests: u32,
}

impl ApiKeyRecord {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.credential.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "api key {}: credential must not be empty",
                self.id
            )));
        }
        if self.minute_limit_requests == 0
            || self.daily_limit_requests == 0
            || self.daily_limit_tokens == 0
        {
            return Err(AppError::Configuration(format!(
                "api key {}: limits must be greater than zero",
                self.id
            )));
        }
        Ok(())
    }
}
