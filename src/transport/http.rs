use super::{Transport, TransportError};
use crate::config::PackerConfig;
use crate::types::{params, Envelope, Params};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::env;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("call-packer/", env!("CARGO_PKG_VERSION"));

/// Form-encoded POST transport: `POST {base_url}{method}`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    debug: bool,
}

impl HttpTransport {
    pub fn new(config: &PackerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("http_transport"),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs.max(1)))
            .pool_max_idle_per_host(
                env::var("PACKER_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .user_agent(USER_AGENT)
            .build()
            .map_err(TransportError::from)?;

        Ok(Self {
            client,
            base_url,
            debug: config.debug,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        self.base_url.join(method).map_err(|e| {
            Error::Transport(TransportError::Other(format!(
                "cannot build url for {}: {}",
                method, e
            )))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: &Params) -> Result<Envelope> {
        let url = self.method_url(method)?;
        let form: Vec<(&str, String)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), params::form_value(v)))
            .collect();

        let resp = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(TransportError::from)?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        let body = resp.bytes().await.map_err(TransportError::from)?;
        if self.debug {
            tracing::debug!(
                method,
                body = %String::from_utf8_lossy(&body),
                "call-packer raw response"
            );
        }

        if !content_type.eq_ignore_ascii_case("application/json") {
            return Err(Error::decode(format!(
                "invalid content-type {:?} for {}",
                content_type, method
            )));
        }

        Envelope::from_slice(&body)
    }
}

fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
