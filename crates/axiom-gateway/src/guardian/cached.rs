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

//! Caching wrapper for checkers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::Checker;
use crate::errors::StageResult;
use crate::types::{StageId, ValidationResult};

const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Wrapper that remembers verdicts of any Checker for a fixed TTL.
///
/// Only verdicts are cached. Errors always go back to the inner checker.
pub struct CachedChecker {
    inner: Arc<dyn Checker>,
    cache: MokaCache<String, ValidationResult>,
}

impl CachedChecker {
    pub fn new(inner: Arc<dyn Checker>, ttl: Duration) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(DEFAULT_MAX_ENTRIES)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    fn cache_key(&self, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.stage().as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(input.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl Checker for CachedChecker {
    fn stage(&self) -> StageId {
        self.inner.stage()
    }

    async fn check(&self, input: &str) -> StageResult<ValidationResult> {
        let key = self.cache_key(input);

        if let Some(cached) = self.cache.get(&key).await {
            debug!(stage = %cached.stage, "verdict cache hit");
            return Ok(cached);
        }

        let verdict = self.inner.check(input).await?;
        self.cache.insert(key, verdict.clone()).await;

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;
    use mockall::mock;

    mock! {
        TestChecker {}

        #[async_trait]
        impl Checker for TestChecker {
            fn stage(&self) -> StageId;
            async fn check(&self, input: &str) -> StageResult<ValidationResult>;
        }
    }

    #[tokio::test]
    async fn test_cached_checker_caches_verdicts() {
        let mut mock_checker = MockTestChecker::new();
        mock_checker
            .expect_stage()
            .returning(|| StageId::GuardianSafety);
        mock_checker
            .expect_check()
            .withf(|input: &str| input == "same input")
            .times(1)
            .returning(|_| Ok(ValidationResult::valid(StageId::GuardianSafety, "ok")));

        let cached = CachedChecker::new(Arc::new(mock_checker), Duration::from_secs(60));

        // Second call must be served from the cache (mock expects a single call)
        let first = cached.check("same input").await.unwrap();
        let second = cached.check("same input").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cached_checker_does_not_cache_errors() {
        let mut mock_checker = MockTestChecker::new();
        mock_checker
            .expect_stage()
            .returning(|| StageId::GuardianLegal);
        mock_checker.expect_check().times(2).returning(|_| {
            Err(StageError::Unavailable {
                message: "connection refused".to_string(),
            })
        });

        let cached = CachedChecker::new(Arc::new(mock_checker), Duration::from_secs(60));

        assert!(cached.check("input").await.is_err());
        assert!(cached.check("input").await.is_err());
    }
}
