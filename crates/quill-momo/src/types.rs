use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};

/// MoMo result code for a completed payment.
pub const RESULT_SUCCESS: i64 = 0;

/// Codes MoMo uses while the order is still open: 1000 means the session is
/// awaiting user confirmation, 7000/7002 mean the transaction is processing.
pub const PENDING_RESULT_CODES: &[i64] = &[1000, 7000, 7002];

pub fn is_pending_code(code: i64) -> bool {
    PENDING_RESULT_CODES.contains(&code)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub partner_code: String,
    pub request_id: String,
    pub amount: i64,
    pub order_id: String,
    pub order_info: String,
    pub redirect_url: String,
    pub ipn_url: String,
    pub request_type: String,
    pub extra_data: String,
    pub lang: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    #[serde(default)]
    pub response_time: i64,
    pub message: String,
    pub result_code: i64,
    #[serde(default)]
    pub pay_url: Option<String>,
    #[serde(default)]
    pub deeplink: Option<String>,
    #[serde(default)]
    pub qr_code_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub partner_code: String,
    pub request_id: String,
    pub order_id: String,
    pub lang: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    #[serde(default)]
    pub extra_data: String,
    pub amount: i64,
    #[serde(default)]
    pub trans_id: Option<i64>,
    #[serde(default)]
    pub pay_type: String,
    pub result_code: i64,
    pub message: String,
    #[serde(default)]
    pub response_time: i64,
}

/// Body of the instant payment notification MoMo posts to `ipnUrl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnPayload {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub order_info: String,
    pub order_type: String,
    pub trans_id: i64,
    pub result_code: i64,
    pub message: String,
    pub pay_type: String,
    pub response_time: i64,
    pub extra_data: String,
    pub signature: String,
}

/// The part of a gateway answer that settles a transaction, whether it came
/// from the IPN webhook or from a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResult {
    pub result_code: i64,
    pub amount: i64,
    pub trans_id: Option<i64>,
    pub message: String,
}

impl From<&IpnPayload> for GatewayResult {
    fn from(ipn: &IpnPayload) -> Self {
        Self {
            result_code: ipn.result_code,
            amount: ipn.amount,
            trans_id: Some(ipn.trans_id),
            message: ipn.message.clone(),
        }
    }
}

impl From<&QueryResponse> for GatewayResult {
    fn from(resp: &QueryResponse) -> Self {
        Self {
            result_code: resp.result_code,
            amount: resp.amount,
            trans_id: resp.trans_id,
            message: resp.message.clone(),
        }
    }
}

/// `extraData` travels base64-encoded.
pub fn encode_extra_data(value: &serde_json::Value) -> String {
    B64.encode(value.to_string())
}

pub fn decode_extra_data(encoded: &str) -> Option<serde_json::Value> {
    let bytes = B64.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipn_parses_momo_field_names() {
        let body = r#"{
            "partnerCode": "MOMO",
            "orderId": "QUILL1",
            "requestId": "req1",
            "amount": 10000,
            "orderInfo": "Buy credits",
            "orderType": "momo_wallet",
            "transId": 4088878653,
            "resultCode": 0,
            "message": "Successful.",
            "payType": "qr",
            "responseTime": 1721720663942,
            "extraData": "",
            "signature": "abc"
        }"#;
        let ipn: IpnPayload = serde_json::from_str(body).unwrap();
        assert_eq!(ipn.trans_id, 4_088_878_653);

        let result = GatewayResult::from(&ipn);
        assert_eq!(result.result_code, RESULT_SUCCESS);
        assert_eq!(result.amount, 10_000);
    }

    #[test]
    fn extra_data_carries_json() {
        let value = serde_json::json!({ "accountId": "a-1" });
        let encoded = encode_extra_data(&value);
        assert_eq!(decode_extra_data(&encoded), Some(value));
        assert_eq!(decode_extra_data("not base64!"), None);
    }

    #[test]
    fn pending_codes() {
        assert!(is_pending_code(1000));
        assert!(is_pending_code(7002));
        assert!(!is_pending_code(0));
        assert!(!is_pending_code(1006));
    }
}
