//! HTTP implementation of [`RemoteTransform`] against the temperature
//! conversion web service.
//!
//! Each conversion is one blocking round trip:
//!
//! ```text
//! POST {base_url}{endpoint}
//! Content-Type: application/x-www-form-urlencoded
//!
//! {form_key}={value}
//! ```
//!
//! The numeric result is cut out of the XML reply positionally, see
//! [`convoy_core::response`].

use std::time::Duration;

use convoy_core::{parse_xml_number, RemoteTransform, TransformError, TransformKind};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

/// Content type of the conversion request body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Connection settings for [`HttpTransform`].
#[derive(Debug, Clone)]
pub struct HttpTransformConfig {
    /// Service root; the kind's endpoint is appended verbatim, so it should
    /// end with `/`.
    pub base_url: String,
    /// Upper bound on one round trip, connect included.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://www.w3schools.com/xml/tempconvert.asmx/".to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("convoy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Converts values by calling the remote conversion service.
///
/// Uses reqwest's blocking client; call it from plain threads such as the
/// worker's pool, not from inside an async runtime.
#[derive(Debug, Clone)]
pub struct HttpTransform {
    client: Client,
    base_url: String,
}

impl HttpTransform {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Transport`] if the TLS backend or client
    /// cannot be initialised.
    pub fn new(config: HttpTransformConfig) -> Result<Self, TransformError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Full URL of the endpoint serving `kind`.
    #[must_use]
    pub fn endpoint_url(&self, kind: TransformKind) -> String {
        format!("{}{}", self.base_url, kind.endpoint())
    }
}

/// Renders the single form parameter of a conversion request.
#[must_use]
pub fn form_body(kind: TransformKind, value: f64) -> String {
    format!("{}={value}", kind.form_key())
}

impl RemoteTransform for HttpTransform {
    fn transform(&self, kind: TransformKind, value: f64) -> Result<f64, TransformError> {
        let url = self.endpoint_url(kind);
        trace!(%url, %kind, value, "sending conversion request");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form_body(kind, value))
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(transport)?;
        parse_xml_number(&body)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn transport(err: reqwest::Error) -> TransformError {
    TransformError::Transport {
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
