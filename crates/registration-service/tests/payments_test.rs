//! Payments, idempotent replays and transactions

mod common;

use axum::http::StatusCode;
use common::{AdminHeaders, TestApp};
use serde_json::{json, Value};

fn history(registration: &Value) -> usize {
    registration["formDataStructured"]["financial"]["paymentHistory"]
        .as_array()
        .map(Vec::len)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_payment_completes_registration() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/registrations/{}/payment", id),
            Some(json!({ "amount": 1500, "transactionId": "TXN-A", "paymentMethod": "upi" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let data = &body["data"];
    assert_eq!(data["replayed"], false);
    assert_eq!(data["transaction"]["transactionId"], "TXN-A");
    assert_eq!(data["transaction"]["status"], "completed");
    assert_eq!(data["transaction"]["purpose"], "registration");
    assert_eq!(data["registration"]["paymentStatus"], "Completed");
    assert_eq!(data["registration"]["willContribute"], true);
    assert_eq!(
        data["registration"]["formDataStructured"]["financial"]["contributionAmount"],
        1500.0
    );
    assert_eq!(history(&data["registration"]), 1);

    let receipts: Vec<_> = app
        .notifier
        .emails_to("a@x.com")
        .into_iter()
        .filter(|e| e.subject.contains("payment received"))
        .collect();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].body.contains("TXN-A"));
}

#[tokio::test]
async fn test_replayed_payment_changes_nothing() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;
    let uri = format!("/registrations/{}/payment", id);
    let payment = json!({ "amount": 1500, "idempotencyKey": "checkout-1" });

    let (status, first) = app.call("POST", &uri, Some(payment.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = app.call("POST", &uri, Some(payment)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(second["message"], "Payment already recorded");
    assert_eq!(
        second["data"]["transaction"]["transactionId"],
        first["data"]["transaction"]["transactionId"]
    );
    assert_eq!(history(&second["data"]["registration"]), 1);
    assert_eq!(app.store.transaction_count().await, 1);
}

#[tokio::test]
async fn test_additional_amount_accumulates() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;

    app.call(
        "POST",
        &format!("/registrations/{}/payment", id),
        Some(json!({ "amount": 1000 })),
    )
    .await;
    let (status, body) = app
        .call(
            "POST",
            &format!("/registrations/{}/add-amount", id),
            Some(json!({ "amount": 250.5 })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let registration = &body["data"]["registration"];
    assert_eq!(
        registration["formDataStructured"]["financial"]["contributionAmount"],
        1250.5
    );
    assert_eq!(history(registration), 2);
    assert_eq!(body["data"]["transaction"]["purpose"], "additional-contribution");
}

#[tokio::test]
async fn test_payment_validation() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/registrations/{}/payment", id),
            Some(json!({ "amount": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");

    let (status, _) = app
        .call(
            "POST",
            "/registrations/missing/payment",
            Some(json!({ "amount": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_free_standing_transaction() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            "POST",
            "/transactions",
            Some(json!({ "amount": 100, "purpose": "donation", "isAnonymous": true })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let transaction = &body["data"]["transaction"];
    assert!(transaction["transactionId"].as_str().unwrap().starts_with("TXN-"));
    assert_eq!(transaction["status"], "completed");
    assert_eq!(transaction["isAnonymous"], true);
    assert!(body["data"]["registration"].is_null());
}

#[tokio::test]
async fn test_linked_transactions() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;

    let (status, body) = app
        .call(
            "POST",
            "/transactions",
            Some(json!({ "registrationId": id, "amount": 100, "status": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registration"]["paymentStatus"], "not-started");
    assert_eq!(body["data"]["transaction"]["purpose"], "contribution");

    let (status, body) = app
        .call(
            "POST",
            "/transactions",
            Some(json!({ "registrationId": id, "amount": 100, "transactionId": "TXN-LINK" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registration"]["paymentStatus"], "Completed");
    assert_eq!(history(&body["data"]["registration"]), 1);

    let (status, listed) = app
        .admin(
            "GET",
            &format!("/admin/registrations/{}/transactions", id),
            None,
            &AdminHeaders::super_admin(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_legacy_status_update() {
    let app = TestApp::new();
    let id = app.register("a@x.com", "9000", "GHSS").await;
    let uri = format!("/registrations/{}", id);

    let (status, body) = app
        .call(
            "PUT",
            &uri,
            Some(json!({ "paymentStatus": "financial-difficulty", "amount": 300 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let registration = &body["data"]["registration"];
    assert_eq!(registration["paymentStatus"], "financial-difficulty");
    assert_eq!(
        registration["formDataStructured"]["financial"]["contributionAmount"],
        0
    );
    assert!(body["data"]["transaction"].is_null());
    assert_eq!(app.store.transaction_count().await, 0);

    let (status, body) = app
        .call(
            "PUT",
            &uri,
            Some(json!({ "paymentStatus": "completed", "amount": 800, "transactionId": "TXN-LEGACY" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transaction"]["status"], "completed");
    assert_eq!(body["data"]["registration"]["paymentStatus"], "Completed");
    assert_eq!(history(&body["data"]["registration"]), 1);

    let (status, _) = app
        .call("PUT", &uri, Some(json!({ "paymentStatus": "refunded" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_id_cannot_be_reused() {
    let app = TestApp::new();
    let first = app.register("a@x.com", "9000", "GHSS").await;
    let second = app.register("b@x.com", "9001", "GHSS").await;
    let admin = AdminHeaders::super_admin();

    let (status, _) = app
        .call(
            "POST",
            &format!("/registrations/{}/payment", first),
            Some(json!({ "amount": 1500, "transactionId": "TXN-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Same id under a new key
    let (status, body) = app
        .call(
            "POST",
            &format!("/registrations/{}/payment", second),
            Some(json!({ "amount": 10, "transactionId": "TXN-1", "idempotencyKey": "k2" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["kind"], "conflict");

    // Without a key the id is the key, which belongs to the first registration
    let (status, body) = app
        .call(
            "POST",
            &format!("/registrations/{}/payment", second),
            Some(json!({ "amount": 10, "transactionId": "TXN-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["kind"], "conflict");

    let (_, listed) = app
        .admin(
            "GET",
            &format!("/admin/registrations/{}/transactions", first),
            None,
            &admin,
        )
        .await;
    let listed = listed["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["amount"], 1500.0);
    assert_eq!(listed[0]["registrationId"], first.as_str());
    assert_eq!(app.store.transaction_count().await, 1);

    let (_, detail) = app
        .admin("GET", &format!("/admin/registrations/{}", second), None, &admin)
        .await;
    assert_eq!(detail["data"]["paymentStatus"], "not-started");
    assert_eq!(history(&detail["data"]), 0);
}
