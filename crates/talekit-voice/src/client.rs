//! Synthesis client — remote-service configuration, request validation,
//! and the engine-agnostic [`SynthesisBackend`] trait.
//!
//! The client owns credentials and voice selection, gates requests on its
//! own lifecycle ({Uninitialized, Ready, Disabled}), validates and
//! truncates input, and delegates the actual network call to a backend
//! trait object so tests (and alternative transports) can swap the HTTP
//! implementation out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Duration;

use crate::error::NarrateError;
use crate::stream;

/// Longest text the service accepts; longer input is truncated, not
/// rejected.
pub const MAX_TEXT_CHARS: usize = 3000;

/// Per-call deadline for the remote synthesis call.
pub const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ──────────────────────────────────────────────────

/// Remote synthesis service configuration.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Service region, e.g. `"eu-west-1"`. Required.
    pub region: String,

    /// API key. Required.
    pub api_key: String,

    /// Voice identifier sent with every request.
    pub voice: String,

    /// Encoded output format requested from the service.
    pub output_format: String,

    /// Synthesis engine selector (e.g. `"neural"`).
    pub engine: String,

    /// Full endpoint override; when unset the endpoint is derived from the
    /// region.
    pub endpoint: Option<String>,
}

impl SynthesisConfig {
    /// Config for a region/key pair with default voice and format.
    #[must_use]
    pub fn new(region: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            api_key: api_key.into(),
            voice: "amber".to_string(),
            output_format: "mp3".to_string(),
            engine: "neural".to_string(),
            endpoint: None,
        }
    }

    /// The endpoint this config resolves to.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://speech.{}.talekit.dev/v1/synthesize", self.region)
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.region.trim().is_empty() {
            return Err("region is empty".to_string());
        }
        if self.api_key.trim().is_empty() {
            return Err("api key is empty".to_string());
        }
        if self.voice.trim().is_empty() {
            return Err("voice is empty".to_string());
        }
        if self.output_format.trim().is_empty() {
            return Err("output format is empty".to_string());
        }
        Ok(())
    }
}

// ── Wire request ───────────────────────────────────────────────────

/// One synthesis request as sent to the service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    /// Text to speak (≤ [`MAX_TEXT_CHARS`] after truncation).
    pub text: String,
    /// Voice identifier.
    pub voice: String,
    /// Encoded output format.
    pub output_format: String,
    /// Engine selector.
    pub engine: String,
}

// ── Backend trait ──────────────────────────────────────────────────

/// Transport-agnostic synthesis backend.
///
/// Implementations perform exactly one remote call per request and return
/// the fully assembled encoded audio payload. Failures must already be
/// classified into the [`NarrateError`] taxonomy.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize `request` into an encoded audio buffer.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, NarrateError>;
}

// ── Client lifecycle ───────────────────────────────────────────────

/// Lifecycle of the synthesis client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No configuration accepted yet.
    Uninitialized,

    /// Configured and usable.
    Ready,

    /// A credentials failure shut the client down; terminal until a fresh
    /// `initialize`.
    Disabled,
}

/// Owns remote-service configuration and gates every request.
pub struct SynthesisClient {
    state: ClientState,
    config: Option<SynthesisConfig>,
    backend: Option<Arc<dyn SynthesisBackend>>,
}

impl Default for SynthesisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisClient {
    /// An uninitialized client; `speak` fails `ClientUnavailable` until
    /// [`initialize`](Self::initialize) succeeds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ClientState::Uninitialized,
            config: None,
            backend: None,
        }
    }

    /// Accept configuration and construct the HTTP backend.
    ///
    /// On any missing/blank field this logs a warning and leaves the
    /// client unavailable — the host runs narration-free rather than
    /// failing. Returns the resulting state.
    pub fn initialize(&mut self, config: SynthesisConfig) -> ClientState {
        match config.validate() {
            Ok(()) => {
                let backend = Arc::new(HttpSynthesisBackend::new(&config));
                self.install(config, backend)
            }
            Err(reason) => {
                tracing::warn!(%reason, "Synthesis config invalid — narration disabled");
                self.state = ClientState::Uninitialized;
                self.config = None;
                self.backend = None;
                self.state
            }
        }
    }

    /// Accept configuration with an explicit backend (tests, alternative
    /// transports). The config is still validated.
    pub fn initialize_with_backend(
        &mut self,
        config: SynthesisConfig,
        backend: Arc<dyn SynthesisBackend>,
    ) -> ClientState {
        match config.validate() {
            Ok(()) => self.install(config, backend),
            Err(reason) => {
                tracing::warn!(%reason, "Synthesis config invalid — narration disabled");
                self.state = ClientState::Uninitialized;
                self.config = None;
                self.backend = None;
                self.state
            }
        }
    }

    fn install(
        &mut self,
        config: SynthesisConfig,
        backend: Arc<dyn SynthesisBackend>,
    ) -> ClientState {
        tracing::info!(
            region = %config.region,
            voice = %config.voice,
            format = %config.output_format,
            "Synthesis client ready"
        );
        self.config = Some(config);
        self.backend = Some(backend);
        self.state = ClientState::Ready;
        self.state
    }

    /// Drop configuration and return to `Uninitialized`.
    pub fn dispose(&mut self) {
        self.state = ClientState::Uninitialized;
        self.config = None;
        self.backend = None;
    }

    /// Shut the client down after a credentials failure.
    pub fn disable(&mut self) {
        tracing::warn!("Synthesis client disabled — credentials rejected; re-initialize to recover");
        self.state = ClientState::Disabled;
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Whether the client can issue requests.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ClientState::Ready
    }

    /// Whether a credentials failure disabled the client.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.state == ClientState::Disabled
    }

    /// Validate and truncate request text.
    ///
    /// Empty input is `InvalidInput`; text over [`MAX_TEXT_CHARS`] is
    /// truncated on a char boundary and the truncation logged.
    pub fn prepare_text(&self, text: &str) -> Result<String, NarrateError> {
        if text.trim().is_empty() {
            return Err(NarrateError::InvalidInput("empty text".to_string()));
        }

        let mut chars = text.char_indices();
        match chars.nth(MAX_TEXT_CHARS) {
            None => Ok(text.to_string()),
            Some((byte_offset, _)) => {
                tracing::warn!(
                    original_chars = text.chars().count(),
                    limit = MAX_TEXT_CHARS,
                    "Narration text over service limit — truncating"
                );
                Ok(text[..byte_offset].to_string())
            }
        }
    }

    /// Build the wire request for prepared text.
    ///
    /// Fails `ClientUnavailable` unless the client is `Ready`.
    pub fn request(&self, text: String) -> Result<SynthesisRequest, NarrateError> {
        if self.state != ClientState::Ready {
            return Err(NarrateError::ClientUnavailable);
        }
        let config = self.config.as_ref().ok_or(NarrateError::ClientUnavailable)?;
        Ok(SynthesisRequest {
            text,
            voice: config.voice.clone(),
            output_format: config.output_format.clone(),
            engine: config.engine.clone(),
        })
    }

    /// Handle to the active backend for use outside the state lock.
    pub fn backend(&self) -> Result<Arc<dyn SynthesisBackend>, NarrateError> {
        self.backend.clone().ok_or(NarrateError::ClientUnavailable)
    }
}

// ── HTTP backend ───────────────────────────────────────────────────

/// Production backend: one HTTPS POST per request, streamed response.
pub struct HttpSynthesisBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSynthesisBackend {
    /// Backend for the given config.
    #[must_use]
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.resolved_endpoint(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesisBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, NarrateError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &detail));
        }

        stream::assemble(response.bytes_stream()).await
    }
}

/// Map a transport-level failure into the taxonomy.
fn classify_transport_error(e: reqwest::Error) -> NarrateError {
    if e.is_timeout() {
        NarrateError::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        NarrateError::Network(e.to_string())
    } else {
        NarrateError::Unknown(e.to_string())
    }
}

/// Map a non-2xx service response into the taxonomy.
#[must_use]
pub fn classify_status(status: u16, detail: &str) -> NarrateError {
    let detail = truncate_detail(detail);
    match status {
        401 | 403 => NarrateError::Credentials(detail),
        408 => NarrateError::Timeout,
        429 => NarrateError::RateLimited,
        500..=599 => NarrateError::ServiceUnavailable(format!("HTTP {status}: {detail}")),
        400..=499 => NarrateError::InvalidParameter(format!("HTTP {status}: {detail}")),
        _ => NarrateError::Unknown(format!("HTTP {status}: {detail}")),
    }
}

/// Keep error bodies loggable without dragging whole payloads around.
fn truncate_detail(detail: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = detail.trim();
    if trimmed.len() <= LIMIT {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .nth(LIMIT)
            .map_or(trimmed.len(), |(i, _)| i);
        format!("{}…", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SynthesisConfig {
        SynthesisConfig::new("eu-west-1", "test-key")
    }

    #[test]
    fn initialize_with_valid_config_is_ready() {
        let mut client = SynthesisClient::new();
        assert_eq!(client.initialize(valid_config()), ClientState::Ready);
        assert!(client.is_ready());
    }

    #[test]
    fn blank_credentials_leave_client_unavailable() {
        let mut client = SynthesisClient::new();
        let mut config = valid_config();
        config.api_key = "   ".to_string();
        assert_eq!(client.initialize(config), ClientState::Uninitialized);
        assert!(!client.is_ready());
        assert!(matches!(
            client.request("hi".to_string()),
            Err(NarrateError::ClientUnavailable)
        ));
    }

    #[test]
    fn missing_region_leaves_client_unavailable() {
        let mut client = SynthesisClient::new();
        let mut config = valid_config();
        config.region = String::new();
        assert_eq!(client.initialize(config), ClientState::Uninitialized);
    }

    #[test]
    fn disabled_client_requires_fresh_initialize() {
        let mut client = SynthesisClient::new();
        client.initialize(valid_config());
        client.disable();
        assert!(client.is_disabled());
        assert!(matches!(
            client.request("hi".to_string()),
            Err(NarrateError::ClientUnavailable)
        ));

        client.initialize(valid_config());
        assert!(client.is_ready());
    }

    #[test]
    fn prepare_rejects_empty_text() {
        let client = SynthesisClient::new();
        assert!(matches!(
            client.prepare_text(""),
            Err(NarrateError::InvalidInput(_))
        ));
        assert!(matches!(
            client.prepare_text("   \n"),
            Err(NarrateError::InvalidInput(_))
        ));
    }

    #[test]
    fn prepare_truncates_long_text_to_limit() {
        let client = SynthesisClient::new();
        let long = "x".repeat(4000);
        let prepared = client.prepare_text(&long).unwrap();
        assert_eq!(prepared.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(prepared, long[..MAX_TEXT_CHARS]);
    }

    #[test]
    fn prepare_truncates_on_char_boundary() {
        let client = SynthesisClient::new();
        let long = "é".repeat(3500);
        let prepared = client.prepare_text(&long).unwrap();
        assert_eq!(prepared.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn prepare_leaves_short_text_alone() {
        let client = SynthesisClient::new();
        assert_eq!(client.prepare_text("hello").unwrap(), "hello");
    }

    #[test]
    fn request_carries_configured_selectors() {
        let mut client = SynthesisClient::new();
        let mut config = valid_config();
        config.voice = "basso".to_string();
        config.output_format = "ogg".to_string();
        client.initialize(config);

        let request = client.request("hello".to_string()).unwrap();
        assert_eq!(request.voice, "basso");
        assert_eq!(request.output_format, "ogg");
        assert_eq!(request.text, "hello");
    }

    #[test]
    fn endpoint_derived_from_region_unless_overridden() {
        let config = valid_config();
        assert!(config.resolved_endpoint().contains("eu-west-1"));

        let mut config = valid_config();
        config.endpoint = Some("https://localhost:9999/tts".to_string());
        assert_eq!(config.resolved_endpoint(), "https://localhost:9999/tts");
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(classify_status(401, ""), NarrateError::Credentials(_)));
        assert!(matches!(classify_status(403, ""), NarrateError::Credentials(_)));
        assert!(matches!(classify_status(408, ""), NarrateError::Timeout));
        assert!(matches!(classify_status(429, ""), NarrateError::RateLimited));
        assert!(matches!(
            classify_status(500, ""),
            NarrateError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(503, ""),
            NarrateError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(400, "bad voice"),
            NarrateError::InvalidParameter(_)
        ));
        assert!(matches!(classify_status(302, ""), NarrateError::Unknown(_)));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let detail = "e".repeat(5000);
        let err = classify_status(503, &detail);
        let text = err.to_string();
        assert!(text.len() < 300);
    }
}
