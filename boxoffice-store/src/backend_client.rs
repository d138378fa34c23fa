use async_trait::async_trait;
use boxoffice_catalog::{CatalogBackend, EventCatalog};
use boxoffice_core::{
    BackendError, BackendResult, CreateOrderRequest, GatewayBackend, GatewayReturnParams,
    GatewayVerification, OrderBackend, OrderId, RemoteOrder, WalletBackend,
};
use boxoffice_shared::Masked;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app_config::BackendConfig;

/// REST client for the ticketing backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<Masked<String>>,
    return_url: String,
}

// The backend wraps most payloads in `{ "data": ... }` but not all of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

#[derive(Deserialize)]
struct CreatedOrder {
    #[serde(alias = "order_id", alias = "orderId")]
    id: Uuid,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BalanceBody {
    Object {
        #[serde(alias = "amount")]
        balance: i64,
    },
    Number(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LinkBody {
    Object {
        #[serde(alias = "payment_url", alias = "paymentUrl", alias = "url")]
        redirect_url: String,
    },
    Url(String),
}

#[derive(Deserialize)]
struct VerificationBody {
    #[serde(alias = "RspCode", alias = "rsp_code", alias = "responseCode")]
    code: String,
    #[serde(default, alias = "Message")]
    message: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    code: Option<String>,
    errors: Option<serde_json::Value>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, return_url: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().map(Masked),
            return_url: return_url.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> BackendResult<T> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let err = classify_error(status.as_u16(), &body);
            warn!("Backend responded {}: {}", status, err);
            return Err(err);
        }

        decode_body(&body)
    }

    async fn send_empty(&self, request: reqwest::RequestBuilder) -> BackendResult<()> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status.as_u16(), &body);
        warn!("Backend responded {}: {}", status, err);
        Err(err)
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Unavailable(err.to_string())
    }
}

fn decode_body<T: DeserializeOwned>(body: &str) -> BackendResult<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// First field-level message out of the shapes validation errors come in:
/// `{"field": ["msg"]}`, `{"field": "msg"}` or `[{"field": .., "message": ..}]`.
fn first_field_error(errors: &serde_json::Value) -> Option<(Option<String>, String)> {
    match errors {
        serde_json::Value::Object(map) => map.iter().find_map(|(field, value)| {
            let message = match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
                _ => None,
            }?;
            Some((Some(field.clone()), message))
        }),
        serde_json::Value::Array(items) => items.iter().find_map(|item| {
            let message = item.get("message")?.as_str()?.to_string();
            let field = item.get("field").and_then(|f| f.as_str()).map(str::to_string);
            Some((field, message))
        }),
        _ => None,
    }
}

/// Map a non-2xx response onto the error shapes the settlement core handles.
pub(crate) fn classify_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            }
        });

    match parsed.code.as_deref() {
        Some("ALREADY_PAID") | Some("ORDER_ALREADY_PAID") => return BackendError::AlreadyPaid(message),
        Some("INSUFFICIENT_FUNDS") | Some("INSUFFICIENT_BALANCE") => {
            return BackendError::InsufficientFunds(message)
        }
        _ => {}
    }

    match status {
        409 => BackendError::Conflict(message),
        400 | 422 => {
            let (field, message) = parsed
                .errors
                .as_ref()
                .and_then(first_field_error)
                .unwrap_or((None, message));
            BackendError::ValidationFailed { field, message }
        }
        402 => BackendError::InsufficientFunds(message),
        404 => BackendError::NotFound(message),
        401 | 403 => BackendError::Unauthorized(message),
        _ => BackendError::Server { status, message },
    }
}

#[async_trait]
impl OrderBackend for HttpBackend {
    async fn create_order(&self, request: &CreateOrderRequest) -> BackendResult<OrderId> {
        debug!("Creating order for event {}", request.event_id);
        let created: CreatedOrder = self
            .send(self.client.post(self.url("/orders")).json(request))
            .await?;
        Ok(created.id)
    }

    async fn get_order(&self, order_id: OrderId) -> BackendResult<RemoteOrder> {
        self.send(self.client.get(self.url(&format!("/orders/{}", order_id))))
            .await
    }
}

#[async_trait]
impl WalletBackend for HttpBackend {
    async fn pay_order_with_wallet(&self, order_id: OrderId) -> BackendResult<()> {
        self.send_empty(self.client.post(self.url(&format!("/orders/{}/pay-wallet", order_id))))
            .await
    }

    async fn get_wallet_balance(&self) -> BackendResult<i64> {
        let body: BalanceBody = self.send(self.client.get(self.url("/wallet/balance"))).await?;
        Ok(match body {
            BalanceBody::Object { balance } => balance,
            BalanceBody::Number(balance) => balance,
        })
    }
}

#[async_trait]
impl GatewayBackend for HttpBackend {
    async fn create_gateway_top_up_link(&self, amount: i64) -> BackendResult<String> {
        let payload = serde_json::json!({
            "amount": amount,
            "return_url": self.return_url,
        });
        let body: LinkBody = self
            .send(self.client.post(self.url("/wallet/top-up/gateway-link")).json(&payload))
            .await?;
        Ok(match body {
            LinkBody::Object { redirect_url } => redirect_url,
            LinkBody::Url(url) => url,
        })
    }

    async fn verify_gateway_return(
        &self,
        params: &GatewayReturnParams,
    ) -> BackendResult<GatewayVerification> {
        // Appended as-is; re-encoding would break the gateway signature.
        let url = format!("{}?{}", self.url("/payments/gateway/return"), params.raw_query());
        let body: VerificationBody = self.send(self.client.get(url)).await?;
        Ok(GatewayVerification {
            code: body.code,
            message: body.message,
        })
    }
}

#[async_trait]
impl CatalogBackend for HttpBackend {
    async fn get_event_catalog(&self, event_id: Uuid) -> BackendResult<EventCatalog> {
        self.send(self.client.get(self.url(&format!("/events/{}/catalog", event_id))))
            .await
    }
}
