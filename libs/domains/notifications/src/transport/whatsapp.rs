//! WhatsApp HTTP gateway transport.

use super::{MessagingTransport, SentMessage, TransportError};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::phone::mask_phone;

#[derive(Clone)]
pub struct WhatsAppConfig {
    /// Gateway base URL, without trailing slash.
    pub api_url: String,
    pub api_key: String,
    /// Gateway instance (session) name.
    pub instance: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("instance", &self.instance)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WhatsAppConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            instance: instance.into(),
            timeout_secs: 30,
        }
    }
}

impl FromEnv for WhatsAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            env_required("WHATSAPP_API_URL")?,
            env_required("WHATSAPP_API_KEY")?,
            env_required("WHATSAPP_INSTANCE")?,
        );
        config.timeout_secs = env_parse("WHATSAPP_TIMEOUT_SECS", config.timeout_secs)?;
        Ok(config)
    }
}

pub struct WhatsAppApiTransport {
    config: WhatsAppConfig,
    client: Client,
}

impl WhatsAppApiTransport {
    pub fn new(config: WhatsAppConfig) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn send_url(&self) -> String {
        format!("{}/message/sendText/{}", self.config.api_url, self.config.instance)
    }

    fn state_url(&self) -> String {
        format!(
            "{}/instance/connectionState/{}",
            self.config.api_url, self.config.instance
        )
    }
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTextResponse {
    key: Option<MessageKey>,
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    instance: Option<ConnectionState>,
}

#[derive(Debug, Deserialize)]
struct ConnectionState {
    state: Option<String>,
}

fn network_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError(format!("Network timeout: {}", err))
    } else if err.is_connect() {
        TransportError(format!("Connection error: {}", err))
    } else {
        TransportError(format!("Network error: {}", err))
    }
}

fn message_id(body: &str) -> Option<String> {
    let parsed: SendTextResponse = serde_json::from_str(body).unwrap_or_default();
    parsed.key.and_then(|k| k.id).or(parsed.message_id)
}

#[async_trait]
impl MessagingTransport for WhatsAppApiTransport {
    async fn send_text(&self, number: &str, text: &str) -> Result<SentMessage, TransportError> {
        debug!(to = %mask_phone(number), length = text.chars().count(), "Sending WhatsApp message");

        let response = self
            .client
            .post(self.send_url())
            .header("apikey", &self.config.api_key)
            .json(&SendTextRequest { number, text })
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = response.text().await.map_err(network_error)?;

        if status.is_success() {
            let message_id = message_id(&body);
            info!(to = %mask_phone(number), message_id = ?message_id, "WhatsApp message accepted");
            Ok(SentMessage { message_id })
        } else {
            error!(to = %mask_phone(number), status = %status, "WhatsApp gateway rejected message");
            Err(TransportError(format!("HTTP {}: {}", status.as_u16(), body.trim())))
        }
    }

    fn name(&self) -> &'static str {
        "WhatsApp"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        let response = self
            .client
            .get(self.state_url())
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(|e| NotificationError::TransportError(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(false);
        }
        let state: ConnectionStateResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::TransportError(e.to_string()))?;
        Ok(state
            .instance
            .and_then(|i| i.state)
            .is_some_and(|s| s == "open"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_strips_trailing_slash() {
        let config = WhatsAppConfig::new("https://wa.example.com/", "key", "loja-1");
        assert_eq!(config.api_url, "https://wa.example.com");
        let transport = WhatsAppApiTransport::new(config).unwrap();
        assert_eq!(
            transport.send_url(),
            "https://wa.example.com/message/sendText/loja-1"
        );
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = WhatsAppConfig::new("https://wa.example.com", "super-secret", "loja-1");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("WHATSAPP_API_URL", Some("http://localhost:8080")),
                ("WHATSAPP_API_KEY", Some("k")),
                ("WHATSAPP_INSTANCE", Some("main")),
                ("WHATSAPP_TIMEOUT_SECS", None),
            ],
            || {
                let config = WhatsAppConfig::from_env().unwrap();
                assert_eq!(config.instance, "main");
                assert_eq!(config.timeout_secs, 30);
            },
        );
        temp_env::with_var_unset("WHATSAPP_API_URL", || {
            assert!(matches!(
                WhatsAppConfig::from_env(),
                Err(ConfigError::MissingEnvVar(_))
            ));
        });
    }

    #[test]
    fn test_message_id_parsing() {
        assert_eq!(
            message_id(r#"{"key":{"id":"3EB0ABC"},"status":"PENDING"}"#),
            Some("3EB0ABC".to_string())
        );
        assert_eq!(message_id(r#"{"messageId":"wamid.1"}"#), Some("wamid.1".to_string()));
        assert_eq!(message_id("not json"), None);
    }
}
