use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use quill_db::models::{NewTransaction, TransactionRow};
use quill_momo::types::{RESULT_SUCCESS, decode_extra_data, encode_extra_data, is_pending_code};
use quill_momo::{GatewayResult, IpnPayload, PaymentOrder};
use quill_types::api::{CreatePaymentRequest, CreatePaymentResponse, RetryReport, TransactionResponse};
use quill_types::models::{Identity, NotificationKind, PaymentStatus};

use crate::convert;
use crate::error::ApiError;
use crate::jobs;
use crate::middleware::ensure_admin;
use crate::state::{AppState, Notice, blocking, current_account, notify, push_credit};
use crate::validate::{self, Page};

async fn transaction(state: &AppState, order_id: String) -> Result<TransactionRow, ApiError> {
    blocking(state, move |db| db.get_transaction_by_order(&order_id))
        .await?
        .ok_or(ApiError::NotFound("transaction"))
}

/// Open a MoMo payment session for buying credit.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credits = validate::payment_amount(req.amount, state.config.vnd_per_credit)?;
    let me = current_account(&state, &identity).await?;

    let order = PaymentOrder {
        order_id: format!("QUILL{}", Uuid::new_v4().simple()),
        request_id: Uuid::new_v4().to_string(),
        amount: req.amount,
        order_info: format!("Quill: {} credit for {}", credits, me.username),
        extra_data: encode_extra_data(&json!({ "accountId": &me.id })),
    };

    {
        let (order_id, request_id, account_id) = (order.order_id.clone(), order.request_id.clone(), me.id.clone());
        let amount = order.amount;
        blocking(&state, move |db| {
            db.insert_transaction(&NewTransaction {
                id: &Uuid::new_v4().to_string(),
                account_id: &account_id,
                order_id: &order_id,
                request_id: &request_id,
                amount,
                credits,
            })
        })
        .await?;
    }

    let failure = match state.momo.create_payment(&order).await {
        Ok(resp) if resp.result_code == RESULT_SUCCESS => match resp.pay_url {
            Some(pay_url) => {
                let (order_id, url) = (order.order_id.clone(), pay_url.clone());
                blocking(&state, move |db| db.set_pay_url(&order_id, &url)).await?;
                info!("Payment {} opened for {} ({} VND)", order.order_id, me.username, order.amount);

                return Ok((
                    StatusCode::CREATED,
                    Json(CreatePaymentResponse {
                        order_id: order.order_id,
                        pay_url,
                        amount: order.amount,
                        credits,
                        status: PaymentStatus::Pending,
                    }),
                ));
            }
            None => (Some(resp.result_code), "MoMo returned no payUrl".to_string()),
        },
        Ok(resp) => (Some(resp.result_code), resp.message),
        Err(e) => (None, e.to_string()),
    };

    warn!("MoMo refused order {}: {}", order.order_id, failure.1);
    let (order_id, (code, message)) = (order.order_id.clone(), failure.clone());
    blocking(&state, move |db| db.mark_transaction_failed(&order_id, code, &message)).await?;
    Err(ApiError::BadGateway(format!("payment gateway: {}", failure.1)))
}

/// MoMo's instant payment notification. Unauthenticated; trust comes from
/// the HMAC signature.
pub async fn momo_ipn(State(state): State<AppState>, Json(ipn): Json<IpnPayload>) -> Result<StatusCode, ApiError> {
    if !state.momo.verify_ipn(&ipn) {
        warn!("IPN for {} failed signature verification", ipn.order_id);
        if state.config.momo_strict_signature {
            return Err(ApiError::bad_request("invalid signature"));
        }
    }

    let tx = transaction(&state, ipn.order_id.clone()).await?;

    let claimed = decode_extra_data(&ipn.extra_data)
        .and_then(|extra| extra.get("accountId").and_then(|v| v.as_str()).map(String::from));
    if let Some(claimed) = claimed.filter(|claimed| *claimed != tx.account_id) {
        warn!("IPN for {} names account {} but the order belongs to {}", tx.order_id, claimed, tx.account_id);
    }

    settle(&state, &tx, &GatewayResult::from(&ipn)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A transaction of the caller. Pending ones are refreshed from MoMo first.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let tx = transaction(&state, order_id).await?;
    if tx.account_id != me.id {
        return Err(ApiError::Forbidden("not your transaction"));
    }

    if convert::payment_status(&tx.status) != PaymentStatus::Pending {
        return Ok(Json(convert::transaction(tx)));
    }

    match state.momo.query(&tx.order_id, &tx.request_id).await {
        Ok(resp) => settle(&state, &tx, &GatewayResult::from(&resp)).await?,
        Err(e) => warn!("MoMo status query for {} failed: {}", tx.order_id, e),
    }

    let tx = transaction(&state, tx.order_id).await?;
    Ok(Json(convert::transaction(tx)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let limit = page.limit();
    let rows = blocking(&state, move |db| db.list_transactions(&me.id, limit)).await?;
    Ok(Json(rows.into_iter().map(convert::transaction).collect()))
}

/// Operator trigger for the credit-grant retry pass.
pub async fn retry_credits(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RetryReport>, ApiError> {
    ensure_admin(&state, &identity)?;
    Ok(Json(jobs::retry_credit_grants(&state).await?))
}

/// Apply a gateway result to a transaction. Only `pending` transactions
/// move, so repeated IPNs and polling are harmless.
pub async fn settle(state: &AppState, tx: &TransactionRow, result: &GatewayResult) -> Result<(), ApiError> {
    if convert::payment_status(&tx.status) != PaymentStatus::Pending {
        debug!("Transaction {} already {}, ignoring result {}", tx.order_id, tx.status, result.result_code);
        return Ok(());
    }

    let order_id = tx.order_id.clone();
    let code = result.result_code;

    if code == RESULT_SUCCESS {
        if result.amount != tx.amount {
            warn!("Transaction {} paid {} VND, expected {}", tx.order_id, result.amount, tx.amount);
            blocking(state, move |db| db.mark_transaction_failed(&order_id, Some(code), "amount mismatch")).await?;
            return Ok(());
        }

        let (trans_id, message) = (result.trans_id, result.message.clone());
        let moved = blocking(state, move |db| db.mark_transaction_success(&order_id, trans_id, code, &message)).await?;
        if !moved {
            // Another settlement got there first.
            return Ok(());
        }
        info!("Transaction {} succeeded, granting {} credit", tx.order_id, tx.credits);

        if !grant_credits(state, tx).await {
            let order_id = tx.order_id.clone();
            blocking(state, move |db| db.set_credit_error(&order_id, true)).await?;
        }
        return Ok(());
    }

    if is_pending_code(code) {
        debug!("Transaction {} still in progress ({})", tx.order_id, code);
        return Ok(());
    }

    info!("Transaction {} failed with {}: {}", tx.order_id, code, result.message);
    let message = result.message.clone();
    blocking(state, move |db| db.mark_transaction_failed(&order_id, Some(code), &message)).await?;
    Ok(())
}

/// Credit the account for a successful payment. Returns false when the
/// grant did not land; the caller records that for the retry job.
pub async fn grant_credits(state: &AppState, tx: &TransactionRow) -> bool {
    let (account_id, credits) = (tx.account_id.clone(), tx.credits);
    match blocking(state, move |db| db.grant_credit(&account_id, credits)).await {
        Ok(Some(balance)) => {
            push_credit(state, &tx.account_id, balance).await;
            notify(
                state,
                Notice::new(
                    &tx.account_id,
                    NotificationKind::Payment,
                    format!("Payment of {} VND received: {} credit added", tx.amount, tx.credits),
                ),
            )
            .await;
            true
        }
        Ok(None) => {
            warn!("Account {} is gone, cannot grant credit for {}", tx.account_id, tx.order_id);
            false
        }
        Err(e) => {
            error!("Credit grant for {} failed: {:?}", tx.order_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use quill_db::models::NewAccount;
    use quill_momo::{IpnPayload, MomoConfig};

    use crate::config::Config;
    use crate::jobs;
    use crate::test_support::{TestApp, spawn_upstream};

    async fn fake_momo(create_code: i64, query_code: i64) -> String {
        let router = Router::new()
            .route(
                "/v2/gateway/api/create",
                post(move |Json(body): Json<Value>| async move {
                    let message = if create_code == 0 { "Successful." } else { "Rejected." };
                    Json(json!({
                        "partnerCode": body["partnerCode"],
                        "orderId": body["orderId"],
                        "requestId": body["requestId"],
                        "amount": body["amount"],
                        "responseTime": 1,
                        "message": message,
                        "resultCode": create_code,
                        "payUrl": format!("https://pay.example/{}", body["orderId"].as_str().unwrap_or_default()),
                    }))
                }),
            )
            .route(
                "/v2/gateway/api/query",
                post(move |Json(body): Json<Value>| async move {
                    Json(json!({
                        "partnerCode": body["partnerCode"],
                        "orderId": body["orderId"],
                        "requestId": body["requestId"],
                        "amount": 50_000,
                        "transId": 777,
                        "resultCode": query_code,
                        "message": "Query result",
                        "responseTime": 2,
                    }))
                }),
            );
        spawn_upstream(router).await
    }

    async fn app_with(endpoint: String, strict: bool) -> TestApp {
        TestApp::with_config(Config {
            momo: MomoConfig {
                endpoint,
                ..MomoConfig::default()
            },
            momo_strict_signature: strict,
            search_url: "http://127.0.0.1:1".into(),
            ..Config::default()
        })
    }

    async fn open_order(app: &TestApp, token: &str, amount: i64) -> String {
        let (status, body) = app.post("/payment", Some(token), json!({ "amount": amount })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["order_id"].as_str().unwrap().to_string()
    }

    fn ipn(app: &TestApp, order_id: &str, amount: i64, result_code: i64) -> Value {
        let mut ipn = IpnPayload {
            partner_code: "MOMO".into(),
            order_id: order_id.into(),
            request_id: "req".into(),
            amount,
            order_info: "Quill".into(),
            order_type: "momo_wallet".into(),
            trans_id: 4_088_878_653,
            result_code,
            message: "Result".into(),
            pay_type: "qr".into(),
            response_time: 1_721_720_663_942,
            extra_data: String::new(),
            signature: String::new(),
        };
        app.state.momo.sign_ipn(&mut ipn);
        serde_json::to_value(&ipn).unwrap()
    }

    async fn status_of(app: &TestApp, order_id: &str) -> Value {
        let tx = app.state.db.get_transaction_by_order(order_id).unwrap().unwrap();
        json!({ "status": tx.status, "credit_error": tx.credit_error, "retry_count": tx.retry_count })
    }

    #[tokio::test]
    async fn successful_payment_grants_credit_once() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, id) = app.signup("alice").await;

        let (status, body) = app.post("/payment", Some(&token), json!({ "amount": 50_000 })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["credits"], 50);
        assert_eq!(body["status"], "pending");
        assert!(body["pay_url"].as_str().unwrap().starts_with("https://pay.example/QUILL"));
        let order_id = body["order_id"].as_str().unwrap().to_string();

        let callback = ipn(&app, &order_id, 50_000, 0);
        let (status, _) = app.post("/payment/momo/ipn", None, callback.clone()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(app.state.db.credit_balance(&id).unwrap(), Some(50));

        let (status, _) = app.post("/payment/momo/ipn", None, callback).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(app.state.db.credit_balance(&id).unwrap(), Some(50));

        let (_, tx) = app.get(&format!("/payment/{order_id}"), Some(&token)).await;
        assert_eq!(tx["status"], "success");
        assert_eq!(tx["trans_id"], 4_088_878_653i64);

        let (_, notes) = app.get("/notifications", Some(&token)).await;
        assert_eq!(notes[0]["kind"], "payment");
    }

    #[tokio::test]
    async fn mismatched_amount_fails_the_order() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, id) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;

        app.post("/payment/momo/ipn", None, ipn(&app, &order_id, 1_000, 0)).await;
        assert_eq!(status_of(&app, &order_id).await["status"], "failed");
        assert_eq!(app.state.db.credit_balance(&id).unwrap(), Some(0));
    }

    #[tokio::test]
    async fn pending_codes_keep_the_order_open() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, _) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;

        app.post("/payment/momo/ipn", None, ipn(&app, &order_id, 50_000, 7000)).await;
        assert_eq!(status_of(&app, &order_id).await["status"], "pending");

        app.post("/payment/momo/ipn", None, ipn(&app, &order_id, 50_000, 1006)).await;
        let tx = app.state.db.get_transaction_by_order(&order_id).unwrap().unwrap();
        assert_eq!(tx.status, "failed");
        assert_eq!(tx.result_code, Some(1006));
    }

    #[tokio::test]
    async fn signatures_are_enforced_when_strict() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, _) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;

        let mut forged = ipn(&app, &order_id, 50_000, 0);
        forged["amount"] = json!(10_000_000);
        let (status, _) = app.post("/payment/momo/ipn", None, forged).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&app, &order_id).await["status"], "pending");

        let (status, _) = app.post("/payment/momo/ipn", None, ipn(&app, "QUILLnope", 50_000, 0)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lenient_mode_only_logs_bad_signatures() {
        let app = app_with(fake_momo(0, 0).await, false).await;
        let (token, _) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;

        let mut unsigned = ipn(&app, &order_id, 50_000, 0);
        unsigned["signature"] = json!("deadbeef");
        let (status, _) = app.post("/payment/momo/ipn", None, unsigned).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(status_of(&app, &order_id).await["status"], "success");
    }

    #[tokio::test]
    async fn refused_orders_are_bad_gateway() {
        let app = app_with(fake_momo(41, 0).await, true).await;
        let (token, _) = app.signup("alice").await;

        let (status, _) = app.post("/payment", Some(&token), json!({ "amount": 50_000 })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, list) = app.get("/payment", Some(&token)).await;
        assert_eq!(list[0]["status"], "failed");
        assert_eq!(list[0]["result_code"], 41);

        let (status, _) = app.post("/payment", Some(&token), json!({ "amount": 500 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn polling_settles_pending_orders() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, id) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;

        let (status, tx) = app.get(&format!("/payment/{order_id}"), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tx["status"], "success");
        assert_eq!(tx["trans_id"], 777);
        assert_eq!(app.state.db.credit_balance(&id).unwrap(), Some(50));

        let (bob, _) = app.signup("bob").await;
        let (status, _) = app.get(&format!("/payment/{order_id}"), Some(&bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn failed_grants_are_retried_a_bounded_number_of_times() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, id) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;
        app.state.db.delete_account(&id).unwrap();

        app.post("/payment/momo/ipn", None, ipn(&app, &order_id, 50_000, 0)).await;
        let state = status_of(&app, &order_id).await;
        assert_eq!(state["status"], "success");
        assert_eq!(state["credit_error"], true);

        for attempt in 1..=4 {
            let report = jobs::retry_credit_grants(&app.state).await.unwrap();
            assert_eq!((report.attempted, report.recovered, report.exhausted), (1, 0, 0), "attempt {attempt}");
        }
        let report = jobs::retry_credit_grants(&app.state).await.unwrap();
        assert_eq!((report.attempted, report.exhausted), (1, 1));

        let report = jobs::retry_credit_grants(&app.state).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(status_of(&app, &order_id).await["retry_count"], 5);
    }

    #[tokio::test]
    async fn retry_recovers_once_the_account_is_back() {
        let app = app_with(fake_momo(0, 0).await, true).await;
        let (token, id) = app.signup("alice").await;
        let order_id = open_order(&app, &token, 50_000).await;
        app.state.db.delete_account(&id).unwrap();
        app.post("/payment/momo/ipn", None, ipn(&app, &order_id, 50_000, 0)).await;

        app.state
            .db
            .create_account(&NewAccount {
                id: &id,
                auth_sub: "auth0|alice",
                username: "alice",
                display_name: None,
                bio: None,
                avatar_url: None,
                email: None,
            })
            .unwrap();

        let admin = TestApp::token(crate::test_support::ADMIN_SUB);
        let (status, report) = app.post("/payment/retry-credits", Some(&admin), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report, json!({ "attempted": 1, "recovered": 1, "exhausted": 0 }));
        assert_eq!(app.state.db.credit_balance(&id).unwrap(), Some(50));
        assert_eq!(status_of(&app, &order_id).await["credit_error"], false);

        let (status, _) = app.post("/payment/retry-credits", Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
