//! # Verification Service Client
//!
//! The HTTP boundary of the engine. Everything the engine needs from the
//! remote service goes through [`VerificationService`], so tests and
//! embedders can swap the transport.
//!
//! ## Endpoints (relative to `{api_url}/{api_version}/`)
//!
//! - `GET init` - integrations to run at startup
//! - `GET verification/{id}` - current verification snapshot
//! - `POST identify` - exchange fingerprints for a source identifier
//! - `POST verification/{id}/response` - submit a step result

use async_trait::async_trait;
use dodgeball_core::{
    DodgeballConfig, DodgeballError, Fingerprint, InitConfig, StepResponse, Verification,
    construct_api_headers,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// SERVICE CONTRACT
// =============================================================================

/// A step result bound for the remote workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSubmission {
    pub verification_id: String,
    pub verification_step_id: String,
    pub source_id: Option<String>,
    pub response: StepResponse,
}

/// Remote operations the engine depends on.
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// GET init → global integration descriptors.
    async fn init_config(&self) -> Result<InitConfig, DodgeballError>;

    /// GET verification/{id} → latest snapshot.
    async fn verification(&self, verification_id: &str) -> Result<Verification, DodgeballError>;

    /// POST identify → source identifier.
    async fn identify(
        &self,
        fingerprints: &[Fingerprint],
        source_id: Option<&str>,
    ) -> Result<String, DodgeballError>;

    /// POST a step result correlated by `verification_step_id`.
    async fn submit_step_response(&self, submission: &StepSubmission)
    -> Result<(), DodgeballError>;
}

// =============================================================================
// WIRE BODIES
// =============================================================================

#[derive(Debug, Serialize)]
struct IdentifyRequest<'a> {
    fingerprints: &'a [Fingerprint],
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepResponseRequest<'a> {
    verification_step_id: &'a str,
    response: &'a StepResponse,
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// reqwest-backed [`VerificationService`].
#[derive(Clone)]
pub struct DodgeballClient {
    http: reqwest::Client,
    base_url: String,
    public_key: String,
}

impl DodgeballClient {
    /// Create a client for the configured service.
    pub fn new(config: &DodgeballConfig, public_key: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), config, public_key)
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_http(
        http: reqwest::Client,
        config: &DodgeballConfig,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: config.api_base(),
            public_key: public_key.into(),
        }
    }

    /// Versioned base URL every path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request carrying the public key and, if known, the source id.
    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        source_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        for (name, value) in construct_api_headers(&self.public_key, source_id) {
            req = req.header(name, value);
        }
        req
    }

    /// Send a request and map connection failures.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, DodgeballError> {
        req.send()
            .await
            .map_err(|e| DodgeballError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    /// Check the status code, then decode the body.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, DodgeballError> {
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| DodgeballError::ParseError(e.to_string()))
    }
}

/// Map HTTP failure statuses onto error variants.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, DodgeballError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(DodgeballError::Unauthorized);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(DodgeballError::RateLimited);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DodgeballError::ServerError(status.as_u16(), body));
    }
    Ok(resp)
}

#[async_trait]
impl VerificationService for DodgeballClient {
    async fn init_config(&self) -> Result<InitConfig, DodgeballError> {
        let req = self.request(reqwest::Method::GET, "init", None);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }

    async fn verification(&self, verification_id: &str) -> Result<Verification, DodgeballError> {
        let path = format!("verification/{verification_id}");
        let req = self.request(reqwest::Method::GET, &path, None);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }

    async fn identify(
        &self,
        fingerprints: &[Fingerprint],
        source_id: Option<&str>,
    ) -> Result<String, DodgeballError> {
        let body = IdentifyRequest { fingerprints };
        let req = self
            .request(reqwest::Method::POST, "identify", source_id)
            .json(&body);
        let resp = self.send(req).await?;
        let identified: IdentifyResponse = self.handle_response(resp).await?;
        Ok(identified.id)
    }

    async fn submit_step_response(
        &self,
        submission: &StepSubmission,
    ) -> Result<(), DodgeballError> {
        let path = format!("verification/{}/response", submission.verification_id);
        let body = StepResponseRequest {
            verification_step_id: &submission.verification_step_id,
            response: &submission.response,
        };
        let req = self
            .request(
                reqwest::Method::POST,
                &path,
                submission.source_id.as_deref(),
            )
            .json(&body);
        let resp = self.send(req).await?;
        check_status(resp).await.map(|_| ())
    }
}
