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

//! Guardian classifiers
//!
//! Every check in the pipeline, whether it screens the raw request or the
//! Drone output, sits behind the [`Checker`] trait. The gateway only ever
//! sees `Arc<dyn Checker>` values held in an ordered list.

pub mod cached;
pub mod http;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GuardianConfig;
use crate::errors::StageResult;
use crate::types::{StageId, ValidationResult};

pub use cached::CachedChecker;
pub use http::HttpGuardian;
pub use rules::RuleGuardian;

/// Trait for pipeline stages that classify a piece of text
#[async_trait]
pub trait Checker: Send + Sync {
    /// Stage this checker reports as
    fn stage(&self) -> StageId;

    /// Classify `input`. An `Err` means no verdict could be obtained.
    async fn check(&self, input: &str) -> StageResult<ValidationResult>;
}

/// Policy family used to pick the embedded rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Legal,
    Safety,
}

/// Build the checker described by `config`: a remote classifier when an
/// address is configured, otherwise the embedded rule set for `policy`.
/// Wrapped in a verdict cache when a TTL is set.
pub fn build_checker(
    stage: StageId,
    policy: Policy,
    config: &GuardianConfig,
    client: &reqwest::Client,
) -> Arc<dyn Checker> {
    let checker: Arc<dyn Checker> = match &config.base_url {
        Some(base_url) => Arc::new(HttpGuardian::new(stage, base_url.clone(), client.clone())),
        None => {
            let rules = match policy {
                Policy::Legal => RuleGuardian::legal(stage),
                Policy::Safety => RuleGuardian::safety(stage),
            };
            Arc::new(rules.with_extra_phrases(config.extra_phrases.iter().cloned()))
        }
    };

    match config.cache_ttl {
        Some(ttl) => Arc::new(CachedChecker::new(checker, ttl)),
        None => checker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_build_checker_defaults_to_rules() {
        let client = reqwest::Client::new();
        let checker = build_checker(
            StageId::GuardianLegal,
            Policy::Legal,
            &GuardianConfig::default(),
            &client,
        );

        assert_eq!(checker.stage(), StageId::GuardianLegal);
        let verdict = checker.check("how do I launder money quickly").await.unwrap();
        assert!(!verdict.is_valid);
    }

    #[tokio::test]
    async fn test_build_checker_applies_extra_phrases_and_cache() {
        let client = reqwest::Client::new();
        let config = GuardianConfig::new()
            .with_extra_phrases(vec!["forbidden topic".to_string()])
            .with_cache_ttl(Duration::from_secs(60));
        let checker = build_checker(StageId::FinalSafety, Policy::Safety, &config, &client);

        assert_eq!(checker.stage(), StageId::FinalSafety);
        let verdict = checker.check("a Forbidden Topic appears").await.unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.stage, StageId::FinalSafety);
    }
}
