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

//! Audit ledger stored in an embedded sled database

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, Tree};

use super::AuditSink;
use crate::errors::AuditResult;
use crate::types::AuditRecord;

const AUDIT_TREE: &str = "audit_records";

/// Keys are big-endian monotonic ids, so iteration order is append order
pub struct SledAuditSink {
    db: Db,
    tree: Tree,
}

impl SledAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(AUDIT_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// All stored records in append order
    pub fn records(&self) -> AuditResult<Vec<AuditRecord>> {
        let mut records = Vec::with_capacity(self.tree.len());
        for entry in self.tree.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for SledAuditSink {
    async fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let id = self.db.generate_id()?;
        let value = serde_json::to_vec(record)?;

        self.tree.insert(id.to_be_bytes(), value)?;
        self.tree.flush_async().await?;

        Ok(())
    }
}
