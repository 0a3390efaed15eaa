use std::future::Future;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use super::error::GatewayError;
use crate::services::metrics::GATEWAY_REQUESTS_TOTAL;

/// A request that was rejected with 401 is retried at most this many times.
pub const MAX_AUTH_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub enum GatewayBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(&'static str, String)>),
}

/// Everything needed to (re)build an outgoing request.
///
/// Multipart bodies cannot be cloned once built, so each attempt builds a fresh one.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<Secret<String>>,
    pub body: GatewayBody,
    /// Metrics label.
    pub endpoint: &'static str,
}

impl GatewayRequest {
    pub fn post(url: impl Into<String>, endpoint: &'static str) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            bearer: None,
            body: GatewayBody::Empty,
            endpoint,
        }
    }

    pub fn bearer(mut self, token: Secret<String>) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = GatewayBody::Json(value);
        self
    }

    pub fn form(mut self, fields: Vec<(&'static str, String)>) -> Self {
        self.body = GatewayBody::Form(fields);
        self
    }
}

#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Sends the request and decodes a 200 response body.
    ///
    /// With `allow_retry`, a 401 triggers `reauthorize` once and the request is
    /// replayed with the returned token. A second 401 is `Unauthorized`.
    #[instrument(skip_all, fields(endpoint = request.endpoint, url = %request.url))]
    pub async fn execute<T, R, Fut>(
        &self,
        mut request: GatewayRequest,
        allow_retry: bool,
        reauthorize: R,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        R: FnOnce() -> Fut,
        Fut: Future<Output = Result<Secret<String>, GatewayError>>,
    {
        let retries = if allow_retry { MAX_AUTH_RETRIES } else { 0 };
        let mut reauthorize = Some(reauthorize);

        for attempt in 0..=retries {
            let response = match self.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    record(request.endpoint, "transport_error");
                    error!(error = %e, attempt, "Gateway request failed to send");
                    return Err(e);
                }
            };

            let status = response.status();
            let body = response.text().await?;
            record(request.endpoint, status.as_str());
            debug!(status = status.as_u16(), attempt, "Gateway responded");

            if status == StatusCode::UNAUTHORIZED {
                if attempt < retries {
                    if let Some(reauthorize) = reauthorize.take() {
                        warn!(attempt, "Gateway returned 401, refreshing token and retrying");
                        let token = reauthorize().await?;
                        if request.bearer.is_some() {
                            request.bearer = Some(token);
                        }
                        continue;
                    }
                }
                warn!(attempt, "Gateway rejected request as unauthorized");
                return Err(GatewayError::Unauthorized);
            }

            if status != StatusCode::OK {
                error!(status = status.as_u16(), body = %body, "Gateway request failed");
                return Err(GatewayError::Gateway {
                    status: status.as_u16(),
                    body,
                });
            }

            return serde_json::from_str(&body).map_err(|e| {
                error!(error = %e, "Gateway response did not match the expected shape");
                GatewayError::Decode(e)
            });
        }

        Err(GatewayError::Unauthorized)
    }

    async fn send(&self, request: &GatewayRequest) -> Result<reqwest::Response, GatewayError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder = match &request.body {
            GatewayBody::Empty => builder,
            GatewayBody::Json(value) => builder.json(value),
            GatewayBody::Form(fields) => {
                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (name, value)| form.text(*name, value.clone()));
                builder.multipart(form)
            }
        };

        Ok(builder.send().await?)
    }
}

fn record(endpoint: &str, status: &str) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status])
        .inc();
}
