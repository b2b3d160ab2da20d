//! HMAC-SHA256 request signing.
//!
//! MoMo signs a raw `key=value&...` string whose field order is fixed per
//! endpoint. The hex digest goes in the `signature` field.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::{CreatePaymentRequest, IpnPayload};

type HmacSha256 = Hmac<Sha256>;

fn mac(secret_key: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Lowercase hex HMAC-SHA256 of `raw`.
pub fn sign(secret_key: &str, raw: &str) -> String {
    let mut mac = mac(secret_key);
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against `raw`.
pub fn verify(secret_key: &str, raw: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = mac(secret_key);
    mac.update(raw.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

pub fn create_raw(access_key: &str, req: &CreatePaymentRequest) -> String {
    format!(
        "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
        access_key,
        req.amount,
        req.extra_data,
        req.ipn_url,
        req.order_id,
        req.order_info,
        req.partner_code,
        req.redirect_url,
        req.request_id,
        req.request_type,
    )
}

pub fn query_raw(access_key: &str, partner_code: &str, order_id: &str, request_id: &str) -> String {
    format!(
        "accessKey={}&orderId={}&partnerCode={}&requestId={}",
        access_key, order_id, partner_code, request_id
    )
}

pub fn ipn_raw(access_key: &str, ipn: &IpnPayload) -> String {
    format!(
        "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}&orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}&resultCode={}&transId={}",
        access_key,
        ipn.amount,
        ipn.extra_data,
        ipn.message,
        ipn.order_id,
        ipn.order_info,
        ipn.order_type,
        ipn.partner_code,
        ipn.pay_type,
        ipn.request_id,
        ipn.response_time,
        ipn.result_code,
        ipn.trans_id,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn sample_ipn() -> IpnPayload {
        IpnPayload {
            partner_code: "MOMO".into(),
            order_id: "QUILL1".into(),
            request_id: "req1".into(),
            amount: 10_000,
            order_info: "Buy 10 credits".into(),
            order_type: "momo_wallet".into(),
            trans_id: 42,
            result_code: 0,
            message: "Successful.".into(),
            pay_type: "qr".into(),
            response_time: 1_721_720_663_942,
            extra_data: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn sign_is_hex_sha256() {
        let sig = sign("secret", "a=1&b=2");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(sig, sign("secret", "a=1&b=2"));
        assert_ne!(sig, sign("other", "a=1&b=2"));
    }

    #[test]
    fn verify_rejects_tampering() {
        let sig = sign("secret", "amount=10000");
        assert!(verify("secret", "amount=10000", &sig));
        assert!(!verify("secret", "amount=99999", &sig));
        assert!(!verify("secret", "amount=10000", "zz-not-hex"));
    }

    #[test]
    fn ipn_raw_follows_documented_order() {
        let raw = ipn_raw("KEY", &sample_ipn());
        assert_eq!(
            raw,
            "accessKey=KEY&amount=10000&extraData=&message=Successful.&orderId=QUILL1&orderInfo=Buy 10 credits\
             &orderType=momo_wallet&partnerCode=MOMO&payType=qr&requestId=req1&responseTime=1721720663942\
             &resultCode=0&transId=42"
        );
    }

    #[test]
    fn query_raw_follows_documented_order() {
        assert_eq!(
            query_raw("KEY", "MOMO", "QUILL1", "req1"),
            "accessKey=KEY&orderId=QUILL1&partnerCode=MOMO&requestId=req1"
        );
    }
}
