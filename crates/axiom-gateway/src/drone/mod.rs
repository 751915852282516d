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

//! Drone workers that carry out validated requests

pub mod http;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DroneBackend, DroneConfig};
use crate::errors::{GatewayResult, StageResult};
use crate::types::{Request, ValidationResult};

pub use http::HttpDrone;
pub use openai::OpenAiDrone;

/// What a Drone produced for a request
#[derive(Debug, Clone, PartialEq)]
pub struct DroneOutput {
    pub output: String,
    pub validation: ValidationResult,
}

/// Trait for workers that execute a validated request
#[async_trait]
pub trait Drone: Send + Sync {
    /// Execute the request. A negative `validation` is an explicit
    /// rejection; `Err` covers transport and execution failures.
    async fn execute(&self, request: &Request) -> StageResult<DroneOutput>;
}

/// Build the Drone described by `config`, sharing the pooled HTTP client
pub fn build_drone(config: &DroneConfig, client: &reqwest::Client) -> GatewayResult<Arc<dyn Drone>> {
    let drone: Arc<dyn Drone> = match &config.backend {
        DroneBackend::Http { base_url } => Arc::new(HttpDrone::new(base_url.clone(), client.clone())),
        DroneBackend::OpenAi {
            api_key,
            base_url,
            model,
        } => Arc::new(
            OpenAiDrone::new(api_key.clone(), client.clone())?
                .with_base_url(base_url.clone())
                .with_model(model.clone())
                .with_sampling(config.temperature, config.max_tokens),
        ),
    };

    Ok(drone)
}
