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

//! JSON Lines audit ledger, one record per line

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use super::AuditSink;
use crate::errors::AuditResult;
use crate::types::AuditRecord;

pub struct JsonlAuditSink {
    path: PathBuf,
    ledger: Mutex<Ledger>,
}

struct Ledger {
    file: File,
    /// The file may end in an unterminated line
    torn: bool,
}

impl JsonlAuditSink {
    /// Open (or create) the ledger in append mode, creating parent directories
    pub async fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        let torn = ends_mid_line(&mut file).await?;
        if torn {
            warn!(path = %path.display(), "audit ledger ends in a partial line");
        }

        Ok(Self {
            path,
            ledger: Mutex::new(Ledger { file, torn }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let record = serde_json::to_vec(record)?;

        let mut ledger = self.ledger.lock().await;

        let mut line = Vec::with_capacity(record.len() + 2);
        if ledger.torn {
            line.push(b'\n');
        }
        line.extend_from_slice(&record);
        line.push(b'\n');

        // A failed write may leave part of the line behind
        ledger.torn = true;
        ledger.file.write_all(&line).await?;
        ledger.file.flush().await?;
        ledger.torn = false;

        Ok(())
    }
}

async fn ends_mid_line(file: &mut File) -> AuditResult<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(len - 1)).await?;
    let last = file.read_u8().await?;
    Ok(last != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::tests::record;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");

        let sink = JsonlAuditSink::open(&path).await.unwrap();
        sink.append(&record("r1")).await.unwrap();
        sink.append(&record("r2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.request_id, "r1");
        assert_eq!(first.validations.len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_reopen_keeps_existing_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let sink = JsonlAuditSink::open(&path).await.unwrap();
            sink.append(&record("r1")).await.unwrap();
        }

        let sink = JsonlAuditSink::open(&path).await.unwrap();
        sink.append(&record("r2")).await.unwrap();
        assert_eq!(sink.path(), path.as_path());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_partial_line_does_not_swallow_next_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        tokio::fs::write(&path, b"{\"request_id\":\"r0\",\"partial").await.unwrap();

        let sink = JsonlAuditSink::open(&path).await.unwrap();
        sink.append(&record("r1")).await.unwrap();
        sink.append(&record("r2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(serde_json::from_str::<AuditRecord>(lines[0]).is_err());

        let ids: Vec<String> = lines[1..]
            .iter()
            .map(|line| serde_json::from_str::<AuditRecord>(line).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }
}
