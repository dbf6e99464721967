use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use common::error::AppError;

use crate::usage::ApiKeyUsage;

/// Usage event handed to the recorder after every finalized call.
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub usage: ApiKeyUsage,
    pub tokens_used: u64,
    pub success: bool,
}

/// Persistence seam for usage accounting. The pool's own counters are
/// authoritative within the process; implementations only need to make
/// usage eventually visible elsewhere.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, event: UsageEvent) -> Result<(), AppError>;
}

#[derive(Debug, Default)]
pub struct NoopRecorder;

#[async_trait]
impl UsageRecorder for NoopRecorder {
    async fn record(&self, _event: UsageEvent) -> Result<(), AppError> {
        Ok(())
    }
}

/// Keeps every event in memory; test and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    events: Mutex<Vec<UsageEvent>>,
}

#[async_trait]
impl UsageRecorder for InMemoryRecorder {
    async fn record(&self, event: UsageEvent) -> Result<(), AppError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

impl InMemoryRecorder {
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
