/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Audit trail
//!
//! Records are handed to an [`AuditLog`] handle, which queues them for a
//! single background worker. The worker is the only writer to the sink, so
//! sinks never see concurrent appends and callers never wait on storage.

pub mod jsonl;
pub mod memory;
pub mod sled_store;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{AuditBackend, AuditConfig};
use crate::errors::{AuditError, AuditResult, GatewayResult};
use crate::types::AuditRecord;

pub use jsonl::JsonlAuditSink;
pub use memory::MemoryAuditSink;
pub use sled_store::SledAuditSink;

/// Append-only storage for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// Non-blocking handle for submitting audit records
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditRecord>,
}

/// Background writer draining the audit queue into a sink
pub struct AuditWorker {
    handle: JoinHandle<u64>,
}

impl AuditLog {
    /// Start the background writer. The worker runs until every `AuditLog`
    /// clone has been dropped and the queue is empty.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, AuditWorker) {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(record) = rx.recv().await {
                match sink.append(&record).await {
                    Ok(()) => {
                        written += 1;
                        debug!(request_id = %record.request_id, "audit record appended");
                    }
                    Err(e) => {
                        error!(request_id = %record.request_id, error = %e, "audit write failed");
                    }
                }
            }
            info!(written, "audit worker drained");
            written
        });

        (Self { tx }, AuditWorker { handle })
    }

    /// Queue a record without waiting. Fails only when the queue is full or
    /// the worker is gone; the record is dropped in that case.
    pub fn submit(&self, record: AuditRecord) -> AuditResult<()> {
        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(record) => AuditError::QueueFull {
                request_id: record.request_id,
            },
            TrySendError::Closed(record) => AuditError::QueueClosed {
                request_id: record.request_id,
            },
        })
    }
}

impl AuditWorker {
    /// Wait for the queue to drain. Returns the number of records written.
    pub async fn finish(self) -> u64 {
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "audit worker terminated abnormally");
                0
            }
        }
    }
}

/// Open the sink selected by `config`
pub async fn build_sink(config: &AuditConfig) -> GatewayResult<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match config.backend {
        AuditBackend::Jsonl => Arc::new(JsonlAuditSink::open(config.resolved_path()).await?),
        AuditBackend::Sled => Arc::new(SledAuditSink::open(config.resolved_path())?),
        AuditBackend::Memory => {
            warn!("memory audit backend keeps records only in process memory; they are lost on restart");
            Arc::new(MemoryAuditSink::new())
        }
    };

    Ok(sink)
}
