use tracing::debug;

use super::azure::AzureOpenAIClient;
use super::retry::RetryingClient;
use super::traits::CompletionClient;
use super::types::CompletionOptions;
use crate::app::Config;
use crate::constants::DEFAULT_SYSTEM_PROMPT;
use crate::utils::Result;

/// Factory for creating completion clients from configuration
pub struct ClientFactory;

impl ClientFactory {
    /// Build the Azure-backed client wrapped in the configured retry policy
    /// and request deadline
    pub fn create(config: &Config) -> Result<Box<dyn CompletionClient>> {
        let timeout = config.request.timeout();
        let azure = AzureOpenAIClient::new(&config.azure, timeout)?;
        debug!(
            deployment = %config.azure.deployment,
            timeout_secs = config.request.timeout_secs,
            max_retries = config.request.max_retries,
            "Created Azure OpenAI client"
        );

        Ok(Box::new(RetryingClient::new(
            azure,
            config.request.retry_policy(),
            timeout,
        )))
    }

    /// Generation options from configuration, with an optional temperature
    /// override
    pub fn options(config: &Config, temperature: Option<f32>) -> CompletionOptions {
        CompletionOptions {
            temperature: temperature.unwrap_or(config.model.temperature),
            max_tokens: config.model.max_tokens,
            system_prompt: config
                .model
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}
