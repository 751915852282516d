use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use axiom_gateway::{
    config::{
        DEFAULT_AUDIT_QUEUE_CAPACITY, DEFAULT_DRONE_TIMEOUT, DEFAULT_GUARDIAN_TIMEOUT,
        DEFAULT_RETRY_BACKOFF,
    },
    AuditBackend, AuditConfig, DroneBackend, DroneConfig, GuardianConfig, PipelineConfig,
};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bind host for both listeners
    #[serde(default = "default_host")]
    pub host: String,

    /// gRPC port
    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON mirror port, disabled when unset
    pub http_port: Option<u16>,

    /// Remote legal classifier
    pub guardian_legal_url: Option<String>,

    /// Remote safety classifier
    pub guardian_safety_url: Option<String>,

    /// Remote classifier for Drone output, defaults to the safety classifier
    pub final_safety_url: Option<String>,

    pub extra_legal_phrases: Vec<String>,
    pub extra_safety_phrases: Vec<String>,

    pub guardian_timeout_ms: u64,

    /// Verdict cache TTL, 0 disables caching
    pub guardian_cache_ttl_secs: u64,

    /// HTTP Drone endpoint, takes precedence over OpenAI
    pub drone_url: Option<String>,

    /// OpenAI API key
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,

    /// OpenAI base URL (optional)
    pub openai_base_url: Option<String>,

    /// Model name for the OpenAI Drone
    pub model_name: Option<String>,

    pub drone_timeout_ms: u64,
    pub drone_retry_backoff_ms: u64,

    pub audit_backend: AuditBackend,
    pub audit_path: Option<PathBuf>,
    pub audit_queue_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn phrase_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let drone_url = non_empty(lookup("DRONE_URL"));
        let openai_api_key = non_empty(lookup("OPENAI_API_KEY"));
        if drone_url.is_none() && openai_api_key.is_none() {
            return Err(anyhow!(
                "either DRONE_URL or OPENAI_API_KEY environment variable is required"
            ));
        }

        let audit_backend = match lookup("AUDIT_BACKEND") {
            Some(value) => value.parse::<AuditBackend>().map_err(|e| anyhow!(e))?,
            None => AuditBackend::Jsonl,
        };

        let settings = Settings {
            host: lookup("HOST").unwrap_or_else(default_host),
            port: parse_or(lookup("PORT"), default_port()),
            http_port: lookup("HTTP_PORT").and_then(|p| p.trim().parse().ok()),
            guardian_legal_url: non_empty(lookup("GUARDIAN_LEGAL_URL")),
            guardian_safety_url: non_empty(lookup("GUARDIAN_SAFETY_URL")),
            final_safety_url: non_empty(lookup("FINAL_SAFETY_URL")),
            extra_legal_phrases: phrase_list(lookup("GUARDIAN_EXTRA_LEGAL_PHRASES")),
            extra_safety_phrases: phrase_list(lookup("GUARDIAN_EXTRA_SAFETY_PHRASES")),
            guardian_timeout_ms: parse_or(
                lookup("GUARDIAN_TIMEOUT_MS"),
                DEFAULT_GUARDIAN_TIMEOUT.as_millis() as u64,
            ),
            guardian_cache_ttl_secs: parse_or(lookup("GUARDIAN_CACHE_TTL_SECS"), 0),
            drone_url,
            openai_api_key,
            openai_base_url: non_empty(lookup("OPENAI_BASE_URL")),
            model_name: non_empty(lookup("MODEL_NAME")),
            drone_timeout_ms: parse_or(
                lookup("DRONE_TIMEOUT_MS"),
                DEFAULT_DRONE_TIMEOUT.as_millis() as u64,
            ),
            drone_retry_backoff_ms: parse_or(
                lookup("DRONE_RETRY_BACKOFF_MS"),
                DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            ),
            audit_backend,
            audit_path: non_empty(lookup("AUDIT_PATH")).map(PathBuf::from),
            audit_queue_capacity: parse_or(
                lookup("AUDIT_QUEUE_CAPACITY"),
                DEFAULT_AUDIT_QUEUE_CAPACITY,
            ),
        };

        Ok(settings)
    }

    /// Get the gRPC address as a string
    pub fn grpc_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// JSON mirror address, if enabled
    pub fn http_address(&self) -> Option<String> {
        self.http_port.map(|port| format!("{}:{}", self.host, port))
    }

    fn guardian(&self, base_url: Option<&String>, extra_phrases: &[String]) -> GuardianConfig {
        let mut config = GuardianConfig::new().with_extra_phrases(extra_phrases.to_vec());
        if let Some(url) = base_url {
            config = config.with_base_url(url.clone());
        }
        if self.guardian_cache_ttl_secs > 0 {
            config = config.with_cache_ttl(Duration::from_secs(self.guardian_cache_ttl_secs));
        }
        config
    }

    pub fn legal_guardian(&self) -> GuardianConfig {
        self.guardian(self.guardian_legal_url.as_ref(), &self.extra_legal_phrases)
    }

    pub fn safety_guardian(&self) -> GuardianConfig {
        self.guardian(self.guardian_safety_url.as_ref(), &self.extra_safety_phrases)
    }

    pub fn final_safety_guardian(&self) -> GuardianConfig {
        let url = self
            .final_safety_url
            .as_ref()
            .or(self.guardian_safety_url.as_ref());
        self.guardian(url, &self.extra_safety_phrases)
    }

    pub fn drone(&self) -> Result<DroneConfig, anyhow::Error> {
        let backend = match (&self.drone_url, &self.openai_api_key) {
            (Some(base_url), _) => DroneBackend::Http {
                base_url: base_url.clone(),
            },
            (None, Some(api_key)) => DroneBackend::OpenAi {
                api_key: api_key.clone(),
                base_url: self.openai_base_url.clone(),
                model: self.model_name.clone(),
            },
            (None, None) => return Err(anyhow!("no Drone backend configured")),
        };

        Ok(DroneConfig::new(backend))
    }

    /// Stage deadlines and Drone retry pacing
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_guardian_timeout(Duration::from_millis(self.guardian_timeout_ms))
            .with_drone_timeout(Duration::from_millis(self.drone_timeout_ms))
            .with_retry_backoff(Duration::from_millis(self.drone_retry_backoff_ms))
    }

    pub fn audit(&self) -> AuditConfig {
        let mut config =
            AuditConfig::new(self.audit_backend).with_queue_capacity(self.audit_queue_capacity);
        if let Some(path) = &self.audit_path {
            config = config.with_path(path.clone());
        }
        config
    }
}
