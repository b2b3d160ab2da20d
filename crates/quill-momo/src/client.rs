use thiserror::Error;
use tracing::{debug, warn};

use crate::signature;
use crate::types::{CreatePaymentRequest, CreatePaymentResponse, IpnPayload, QueryRequest, QueryResponse};

/// Merchant credentials and callback URLs issued by MoMo.
#[derive(Debug, Clone)]
pub struct MomoConfig {
    /// e.g. `https://test-payment.momo.vn`
    pub endpoint: String,
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    pub redirect_url: String,
    pub ipn_url: String,
    pub request_type: String,
    pub lang: String,
}

impl Default for MomoConfig {
    /// MoMo's public sandbox credentials.
    fn default() -> Self {
        Self {
            endpoint: "https://test-payment.momo.vn".into(),
            partner_code: "MOMO".into(),
            access_key: "F8BBA842ECF85".into(),
            secret_key: "K951B6PE1waDMi640xX08PD3vg6EkVlz".into(),
            redirect_url: "http://localhost:3000/payment/result".into(),
            ipn_url: "http://localhost:8080/payment/momo/ipn".into(),
            request_type: "captureWallet".into(),
            lang: "vi".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MomoError {
    #[error("request to MoMo failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MoMo answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// An order to open a payment session for.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub order_info: String,
    /// Already base64-encoded.
    pub extra_data: String,
}

#[derive(Clone)]
pub struct MomoClient {
    http: reqwest::Client,
    config: MomoConfig,
}

impl MomoClient {
    pub fn new(http: reqwest::Client, config: MomoConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &MomoConfig {
        &self.config
    }

    /// Signed `/v2/gateway/api/create` request body for `order`.
    pub fn build_create_request(&self, order: &PaymentOrder) -> CreatePaymentRequest {
        let mut req = CreatePaymentRequest {
            partner_code: self.config.partner_code.clone(),
            request_id: order.request_id.clone(),
            amount: order.amount,
            order_id: order.order_id.clone(),
            order_info: order.order_info.clone(),
            redirect_url: self.config.redirect_url.clone(),
            ipn_url: self.config.ipn_url.clone(),
            request_type: self.config.request_type.clone(),
            extra_data: order.extra_data.clone(),
            lang: self.config.lang.clone(),
            signature: String::new(),
        };
        let raw = signature::create_raw(&self.config.access_key, &req);
        req.signature = signature::sign(&self.config.secret_key, &raw);
        req
    }

    /// Open a payment session. A non-zero `result_code` in the response
    /// means MoMo refused the order; that is returned as `Ok` for the caller
    /// to inspect.
    pub async fn create_payment(&self, order: &PaymentOrder) -> Result<CreatePaymentResponse, MomoError> {
        let body = self.build_create_request(order);
        let url = format!("{}/v2/gateway/api/create", self.config.endpoint);

        debug!("MoMo create {} ({} VND)", order.order_id, order.amount);
        let resp = self.http.post(&url).json(&body).send().await?;
        read_json(resp).await
    }

    /// Ask MoMo for the current state of an order.
    pub async fn query(&self, order_id: &str, request_id: &str) -> Result<QueryResponse, MomoError> {
        let raw = signature::query_raw(&self.config.access_key, &self.config.partner_code, order_id, request_id);
        let body = QueryRequest {
            partner_code: self.config.partner_code.clone(),
            request_id: request_id.to_string(),
            order_id: order_id.to_string(),
            lang: self.config.lang.clone(),
            signature: signature::sign(&self.config.secret_key, &raw),
        };
        let url = format!("{}/v2/gateway/api/query", self.config.endpoint);

        debug!("MoMo query {}", order_id);
        let resp = self.http.post(&url).json(&body).send().await?;
        read_json(resp).await
    }

    /// Check the IPN signature against our secret key.
    pub fn verify_ipn(&self, ipn: &IpnPayload) -> bool {
        let raw = signature::ipn_raw(&self.config.access_key, ipn);
        signature::verify(&self.config.secret_key, &raw, &ipn.signature)
    }

    /// Sign an IPN as MoMo would. Used to build callbacks in tests and tooling.
    pub fn sign_ipn(&self, ipn: &mut IpnPayload) {
        let raw = signature::ipn_raw(&self.config.access_key, ipn);
        ipn.signature = signature::sign(&self.config.secret_key, &raw);
    }
}

/// MoMo reports business errors with 4xx plus a JSON body carrying
/// `resultCode`, so try the body before giving up on the status.
async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, MomoError> {
    let status = resp.status();
    let text = resp.text().await?;

    match serde_json::from_str::<T>(&text) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            warn!("Unparseable MoMo response ({}): {}", status, e);
            Err(MomoError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            })
        }
    }
}
