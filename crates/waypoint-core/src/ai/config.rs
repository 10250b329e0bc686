//! AI client configuration

use std::str::FromStr;
use std::time::Duration;

/// Default Anthropic-compatible messages endpoint.
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Default model for identifier extraction (small and fast is enough).
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How the API key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthHeader {
    /// `x-api-key: <key>`
    #[default]
    XApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

impl FromStr for AuthHeader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x-api-key" | "x_api_key" | "api_key" => Ok(AuthHeader::XApiKey),
            "bearer" => Ok(AuthHeader::Bearer),
            other => Err(format!("unknown auth header style: {}", other)),
        }
    }
}

/// Configuration for the AI client
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Model ID to use for API calls
    pub model: String,
    /// Optional base URL override (defaults to the Anthropic endpoint)
    pub base_url: Option<String>,
    /// How to send authentication header
    pub auth_header: AuthHeader,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            auth_header: AuthHeader::XApiKey,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AiClientConfig {
    /// Get the API URL to use
    pub fn api_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_prefers_override() {
        let mut config = AiClientConfig::default();
        assert_eq!(config.api_url(), DEFAULT_API_URL);

        config.base_url = Some("http://localhost:8080/v1/messages".to_string());
        assert_eq!(config.api_url(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn auth_header_parses_case_insensitively() {
        assert_eq!("Bearer".parse::<AuthHeader>(), Ok(AuthHeader::Bearer));
        assert_eq!(" x-api-key ".parse::<AuthHeader>(), Ok(AuthHeader::XApiKey));
        assert!("basic".parse::<AuthHeader>().is_err());
    }
}
