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

//! Embedded phrase-blocklist classifier

use async_trait::async_trait;
use tracing::debug;

use super::{Checker, Policy};
use crate::errors::StageResult;
use crate::types::{StageId, ValidationResult};

const LEGAL_PHRASES: &[&str] = &[
    "launder money",
    "money laundering",
    "counterfeit currency",
    "counterfeit goods",
    "evade taxes",
    "tax evasion scheme",
    "insider trading tip",
    "forge a passport",
    "forge a signature",
    "pirated copy",
    "crack the license",
    "bypass drm",
];

const SAFETY_PHRASES: &[&str] = &[
    "build a bomb",
    "make a bomb",
    "pipe bomb",
    "nerve agent",
    "synthesize ricin",
    "make meth",
    "kill yourself",
    "how to self-harm",
    "buy an untraceable gun",
];

/// Classifier that rejects text containing any blocked phrase
pub struct RuleGuardian {
    stage: StageId,
    policy: Policy,
    phrases: Vec<String>,
}

impl RuleGuardian {
    pub fn new(stage: StageId, policy: Policy, phrases: impl IntoIterator<Item = String>) -> Self {
        let phrases = phrases
            .into_iter()
            .map(|p| normalize(&p))
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            stage,
            policy,
            phrases,
        }
    }

    /// Built-in legal/compliance rule set
    pub fn legal(stage: StageId) -> Self {
        Self::new(stage, Policy::Legal, LEGAL_PHRASES.iter().map(|p| p.to_string()))
    }

    /// Built-in content-safety rule set
    pub fn safety(stage: StageId) -> Self {
        Self::new(stage, Policy::Safety, SAFETY_PHRASES.iter().map(|p| p.to_string()))
    }

    pub fn with_extra_phrases(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.phrases.extend(
            extra
                .into_iter()
                .map(|p| normalize(&p))
                .filter(|p| !p.is_empty()),
        );
        self
    }

    fn policy_name(&self) -> &'static str {
        match self.policy {
            Policy::Legal => "legal policy violation",
            Policy::Safety => "safety policy violation",
        }
    }
}

#[async_trait]
impl Checker for RuleGuardian {
    fn stage(&self) -> StageId {
        self.stage.clone()
    }

    async fn check(&self, input: &str) -> StageResult<ValidationResult> {
        let text = normalize(input);

        if let Some(phrase) = self.phrases.iter().find(|p| text.contains(p.as_str())) {
            debug!(stage = %self.stage, phrase = %phrase, "blocked phrase matched");
            return Ok(ValidationResult::invalid(
                self.stage.clone(),
                format!("{}: matched '{}'", self.policy_name(), phrase),
            ));
        }

        Ok(ValidationResult::valid(self.stage.clone(), "no policy match"))
    }
}

/// Lowercase, strip invisible unicode and control characters, and collapse
/// whitespace so that spacing tricks do not dodge a phrase match.
pub fn normalize(input: &str) -> String {
    let zero_width_chars = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}', '\u{2060}'];

    let cleaned: String = input
        .chars()
        .filter(|c| !zero_width_chars.contains(c))
        .filter(|&c| !c.is_control() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
