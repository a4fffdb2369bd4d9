//! Fulfillment issuance idempotency and unlock access-check tests

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use http_body_util::BodyExt;
use tower::ServiceExt;

#[test]
fn test_issuance_is_create_if_absent() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, ProviderKind::Stripe, None);
    queries::mark_order_completed(&conn, &order.id, Some("pi_ful_1")).unwrap();

    let first = queries::issue_fulfillment(&conn, &order.id).unwrap();
    let second = queries::issue_fulfillment(&conn, &order.id).unwrap();

    // Re-issuance returns the surviving row, never a second token.
    assert_eq!(first.id, second.id);
    assert_eq!(first.token, second.token);
    assert_eq!(queries::count_fulfillments_for_order(&conn, &order.id).unwrap(), 1);
}

#[test]
fn test_revocation_keeps_row_for_audit() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, ProviderKind::Stripe, None);
    queries::mark_order_completed(&conn, &order.id, Some("pi_ful_2")).unwrap();
    let fulfillment = queries::issue_fulfillment(&conn, &order.id).unwrap();

    assert!(queries::revoke_fulfillment(&conn, &order.id).unwrap());
    // Second revocation is a no-op.
    assert!(!queries::revoke_fulfillment(&conn, &order.id).unwrap());

    let reloaded = queries::get_fulfillment_by_token(&conn, &fulfillment.token)
        .unwrap()
        .expect("Revoked fulfillment must still exist");
    assert!(reloaded.is_revoked());
    assert_eq!(reloaded.token, fulfillment.token);
}

#[test]
fn test_reissue_after_revocation_does_not_resurrect_access() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, ProviderKind::Stripe, None);
    queries::mark_order_completed(&conn, &order.id, Some("pi_ful_3")).unwrap();
    queries::issue_fulfillment(&conn, &order.id).unwrap();
    queries::revoke_fulfillment(&conn, &order.id).unwrap();

    // A duplicate payment_completed replay would call issue again; the
    // revoked row must win.
    let fulfillment = queries::issue_fulfillment(&conn, &order.id).unwrap();
    assert!(fulfillment.is_revoked());
}

async fn unlock(app: &axum::Router, token: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/unlock?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_unlock_check_valid_revoked_invalid() {
    let state = create_test_app_state();
    let app = test_app(state.clone());

    let (token, order_id) = {
        let conn = state.db.get().unwrap();
        let order = create_test_order(&conn, ProviderKind::Stripe, Some("sess-unlock"));
        queries::mark_order_completed(&conn, &order.id, Some("pi_unlock_1")).unwrap();
        let fulfillment = queries::issue_fulfillment(&conn, &order.id).unwrap();
        (fulfillment.token, order.id)
    };

    // Valid: grants access with the minimal metadata the content layer needs.
    let (status, body) = unlock(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "valid");
    assert_eq!(body["order_id"], order_id);
    assert_eq!(body["sku"], "deep-sleep-course");

    // Revoked: token still exists but no longer grants access.
    {
        let conn = state.db.get().unwrap();
        queries::revoke_fulfillment(&conn, &order_id).unwrap();
    }
    let (status, body) = unlock(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "revoked");
    assert!(body.get("sku").is_none(), "revoked tokens expose no metadata");

    // Invalid: never-issued token.
    let (status, body) = unlock(&app, "pt_ulk_ffffffffffffffffffffffffffffffff").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invalid");

    // Every check was logged, including the failed ones.
    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::count_events_by_type(&conn, EventType::ContentAccess).unwrap(),
        3
    );
}
