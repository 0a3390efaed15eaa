use std::sync::Arc;

use secrecy::{ExposeSecret, Secret};
use tracing::{info, instrument, warn};

use super::error::GatewayError;
use super::http::{GatewayHttpClient, GatewayRequest};
use super::token::{TokenRefresher, TokenStore};
use super::types::{CreateInvoiceRequest, InvoiceContext, InvoiceResponse, Token};
use crate::config::EpayConfig;
use crate::services::metrics::TOKEN_REFRESH_TOTAL;

const TOKEN_SCOPE: &str = "webapi usermanagement email_send verification statement statistics payment";

/// Client for the epay gateway.
///
/// Holds one process-wide access token that a background task keeps fresh.
/// Clones share the token; the refresher stops once the last clone is dropped.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    core: Arc<GatewayCore>,
    tokens: Arc<TokenStore>,
    _refresher: Arc<TokenRefresher>,
}

struct GatewayCore {
    http: GatewayHttpClient,
    config: EpayConfig,
    token_url: String,
}

impl PaymentGatewayClient {
    /// Validates the configuration, fetches the first token and starts the refresher.
    pub async fn new(config: EpayConfig) -> Result<Self, GatewayError> {
        if config.oauth_url.trim().is_empty() {
            return Err(GatewayError::Configuration("OAuth URL is required"));
        }
        if config.shop_id.trim().is_empty() {
            return Err(GatewayError::Configuration("shop ID is required"));
        }
        if config.terminal_id.trim().is_empty() {
            return Err(GatewayError::Configuration("terminal ID is required"));
        }

        let http = GatewayHttpClient::new(config.timeout)?;
        let token_url = format!("{}/oauth2/token", config.oauth_url.trim_end_matches('/'));
        let core = Arc::new(GatewayCore {
            http,
            config,
            token_url,
        });

        let initial = core.fetch_token(None).await?;
        let tokens = Arc::new(TokenStore::new(initial));

        let refresher = {
            let core = Arc::clone(&core);
            TokenRefresher::spawn(Arc::clone(&tokens), move || {
                let core = Arc::clone(&core);
                async move { core.fetch_token(None).await }
            })
        };

        info!(
            api_url = %core.config.api_url,
            shop_id = %core.config.shop_id,
            terminal_id = %core.config.terminal_id,
            "Epay gateway client initialized"
        );

        Ok(Self {
            core,
            tokens,
            _refresher: Arc::new(refresher),
        })
    }

    /// The shared token as of now.
    pub fn current_token(&self) -> Arc<Token> {
        self.tokens.snapshot()
    }

    pub fn terminal_id(&self) -> &str {
        &self.core.config.terminal_id
    }

    /// Requests a token directly from the gateway without touching the shared one.
    ///
    /// With a context the token is scoped to that charge.
    pub async fn request_token(&self, context: Option<&InvoiceContext>) -> Result<Token, GatewayError> {
        self.core.fetch_token(context).await
    }

    /// Fetches a new shared token immediately and publishes it.
    pub async fn force_refresh(&self) -> Result<Arc<Token>, GatewayError> {
        match self.core.fetch_token(None).await {
            Ok(token) => {
                self.tokens.replace(token);
                TOKEN_REFRESH_TOTAL
                    .with_label_values(&["reactive", "success"])
                    .inc();
                Ok(self.tokens.snapshot())
            }
            Err(e) => {
                TOKEN_REFRESH_TOTAL
                    .with_label_values(&["reactive", "failure"])
                    .inc();
                Err(e)
            }
        }
    }

    /// Creates an invoice. A 401 refreshes the shared token and retries once.
    ///
    /// Any 200 response counts as success, whatever its `success` field says.
    #[instrument(skip(self, token, request), fields(invoice_id = %request.invoice_id, amount = request.amount))]
    pub async fn create_invoice(
        &self,
        token: &Secret<String>,
        request: &CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, GatewayError> {
        let body = serde_json::to_value(request).map_err(GatewayError::Encode)?;
        let outgoing = GatewayRequest::post(&self.core.config.payment_page_url, "invoice")
            .bearer(token.clone())
            .json(body);

        let mut response: InvoiceResponse = self
            .core
            .http
            .execute(outgoing, true, || async {
                let token = self.force_refresh().await?;
                Ok::<_, GatewayError>(token.access_token.clone())
            })
            .await?;

        if !response.success {
            warn!(
                gateway_error = response.error.as_deref().unwrap_or(""),
                "Gateway answered 200 with success=false, treating as success"
            );
        }
        response.success = true;

        info!("Invoice created");
        Ok(response)
    }
}

impl GatewayCore {
    async fn fetch_token(&self, context: Option<&InvoiceContext>) -> Result<Token, GatewayError> {
        let mut fields = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.expose_secret().clone()),
            ("grant_type", "client_credentials".to_string()),
            ("scope", TOKEN_SCOPE.to_string()),
        ];

        if let Some(context) = context {
            fields.extend([
                ("amount", context.amount.to_string()),
                ("currency", context.currency.clone()),
                ("invoiceID", context.invoice_id.clone()),
                ("terminal", self.config.terminal_id.clone()),
            ]);
        }

        let request = GatewayRequest::post(&self.token_url, "token").form(fields);
        self.http.execute(request, false, no_reauthorization).await
    }
}

async fn no_reauthorization() -> Result<Secret<String>, GatewayError> {
    Err(GatewayError::Unauthorized)
}
