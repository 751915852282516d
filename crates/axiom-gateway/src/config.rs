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

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GUARDIAN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DRONE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_AUDIT_JSONL_PATH: &str = "./audit/audit-ledger.jsonl";
pub const DEFAULT_AUDIT_SLED_PATH: &str = "./audit/ledger.sled";

/// Stage deadlines and retry pacing for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Deadline for each guardian call
    pub guardian_timeout: Duration,
    /// Deadline for a single Drone attempt
    pub drone_timeout: Duration,
    /// Pause before the single retry on a transient Drone failure
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            guardian_timeout: DEFAULT_GUARDIAN_TIMEOUT,
            drone_timeout: DEFAULT_DRONE_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl PipelineConfig {
    pub fn with_guardian_timeout(mut self, timeout: Duration) -> Self {
        self.guardian_timeout = timeout;
        self
    }

    pub fn with_drone_timeout(mut self, timeout: Duration) -> Self {
        self.drone_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Settings for a guardian (input or output classifier)
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Remote classifier address; the embedded rule set is used when absent
    pub base_url: Option<String>,
    /// Extra blocked phrases for the embedded rule set
    pub extra_phrases: Vec<String>,
    /// Verdict cache TTL, `None` disables caching
    pub cache_ttl: Option<Duration>,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            extra_phrases: Vec::new(),
            cache_ttl: None,
        }
    }
}

impl GuardianConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_extra_phrases(mut self, phrases: Vec<String>) -> Self {
        self.extra_phrases = phrases;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Which backend performs the Drone work
#[derive(Debug, Clone, PartialEq)]
pub enum DroneBackend {
    Http {
        base_url: String,
    },
    OpenAi {
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    },
}

/// Settings for the Drone stage
#[derive(Debug, Clone)]
pub struct DroneConfig {
    pub backend: DroneBackend,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl DroneConfig {
    pub fn new(backend: DroneBackend) -> Self {
        Self {
            backend,
            temperature: 0.0,
            max_tokens: 2048,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Where audit records are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    Jsonl,
    Sled,
    Memory,
}

impl FromStr for AuditBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(AuditBackend::Jsonl),
            "sled" => Ok(AuditBackend::Sled),
            "memory" => Ok(AuditBackend::Memory),
            _ => Err(format!("Invalid audit backend: {}", s)),
        }
    }
}

/// Settings for the audit trail
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    pub path: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Jsonl,
            path: None,
            queue_capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
        }
    }
}

impl AuditConfig {
    pub fn new(backend: AuditBackend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Storage path, falling back to the backend default
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, AuditBackend::Sled) => PathBuf::from(DEFAULT_AUDIT_SLED_PATH),
            (None, _) => PathBuf::from(DEFAULT_AUDIT_JSONL_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardian_config_default() {
        let config = GuardianConfig::default();
        assert!(config.base_url.is_none());
        assert!(config.cache_ttl.is_none());
    }

    #[test]
    fn test_pipeline_config_builders() {
        let config = PipelineConfig::default();
        assert_eq!(config.guardian_timeout, Duration::from_secs(2));
        assert_eq!(config.drone_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_backoff, Duration::from_millis(250));

        let config = config
            .with_guardian_timeout(Duration::from_millis(500))
            .with_drone_timeout(Duration::from_secs(5))
            .with_retry_backoff(Duration::from_millis(10));
        assert_eq!(config.guardian_timeout, Duration::from_millis(500));
        assert_eq!(config.drone_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_audit_backend_parsing() {
        assert_eq!("JSONL".parse::<AuditBackend>(), Ok(AuditBackend::Jsonl));
        assert_eq!("sled".parse::<AuditBackend>(), Ok(AuditBackend::Sled));
        assert!("kafka".parse::<AuditBackend>().is_err());
    }

    #[test]
    fn test_audit_path_defaults_per_backend() {
        let jsonl = AuditConfig::new(AuditBackend::Jsonl);
        assert_eq!(jsonl.resolved_path(), PathBuf::from(DEFAULT_AUDIT_JSONL_PATH));

        let sled = AuditConfig::new(AuditBackend::Sled);
        assert_eq!(sled.resolved_path(), PathBuf::from(DEFAULT_AUDIT_SLED_PATH));

        let custom = AuditConfig::new(AuditBackend::Sled).with_path("/tmp/x");
        assert_eq!(custom.resolved_path(), PathBuf::from("/tmp/x"));
    }
}
