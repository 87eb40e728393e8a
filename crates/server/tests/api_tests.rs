//! End-to-end tests of the HTTP surface, run in-process.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use regex_lite::Regex;
use serde_json::json;

use common::{TestConfig, TestFixture, ALICE_KEY, BOB_KEY};

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint_is_sanitized() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;
    let response = fixture.as_key(ALICE_KEY, "GET", "/api/v1/config", None).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["auth"]["method"], "api_key");
    assert_eq!(response.body["auth"]["api_keys_configured"], 2);
    assert!(!response.body.to_string().contains(ALICE_KEY));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture
        .post("/api/v1/brts", json!({ "amount": "10.00" }))
        .await;

    let response = fixture.get("/metrics").await;
    assert_status!(response, StatusCode::OK);
    let text = response.body.as_str().unwrap_or_default();
    assert!(text.contains("brt_http_requests_total"));
    assert!(text.contains("brt_tickets_issued_total"));
}

// =============================================================================
// Issuance and redemption
// =============================================================================

#[tokio::test]
async fn test_create_then_redeem() {
    let fixture = TestFixture::new().await;

    let created = fixture
        .post("/api/v1/brts", json!({ "amount": "50.00" }))
        .await;
    assert_status!(created, StatusCode::CREATED);

    let code = created.body["code"].as_str().unwrap().to_string();
    assert!(Regex::new(r"^BRT-[A-Z0-9]{8}$").unwrap().is_match(&code));
    assert_eq!(created.body["status"], "active");
    assert_eq!(created.body["amount"], "50.00");
    assert!(created.body["redeemed_at"].is_null());

    let redeemed = fixture
        .post("/api/v1/brts/redeem", json!({ "reservation_code": code }))
        .await;
    assert_status!(redeemed, StatusCode::OK);
    assert_eq!(redeemed.body["status"], "redeemed");
    assert!(redeemed.body["redeemed_at"].is_string());

    let again = fixture
        .post("/api/v1/brts/redeem", json!({ "reservation_code": code }))
        .await;
    assert_status!(again, StatusCode::CONFLICT);
    assert_eq!(again.body["kind"], "already_redeemed");
}

#[tokio::test]
async fn test_redeem_past_expiry() {
    let fixture = TestFixture::new().await;
    let expires_at = Utc::now() - Duration::seconds(1);

    let created = fixture
        .post(
            "/api/v1/brts",
            json!({ "amount": "50.00", "expires_at": expires_at }),
        )
        .await;
    assert_status!(created, StatusCode::CREATED);
    let id = created.body["id"].as_str().unwrap().to_string();
    let code = created.body["code"].as_str().unwrap().to_string();

    let redeemed = fixture
        .post("/api/v1/brts/redeem", json!({ "reservation_code": code }))
        .await;
    assert_status!(redeemed, StatusCode::CONFLICT);
    assert_eq!(redeemed.body["kind"], "expired");

    let stored = fixture.get(&format!("/api/v1/brts/{}", id)).await;
    assert_status!(stored, StatusCode::OK);
    assert_eq!(stored.body["status"], "expired");
    assert!(stored.body["redeemed_at"].is_null());
}

#[tokio::test]
async fn test_redeem_code_is_case_insensitive() {
    let fixture = TestFixture::new().await;
    let created = fixture.post("/api/v1/brts", json!({ "amount": 5 })).await;
    let code = created.body["code"].as_str().unwrap().to_lowercase();

    let redeemed = fixture
        .post(
            "/api/v1/brts/redeem",
            json!({ "reservation_code": format!("  {}  ", code) }),
        )
        .await;
    assert_status!(redeemed, StatusCode::OK);
}

#[tokio::test]
async fn test_redeem_errors() {
    let fixture = TestFixture::new().await;

    let unknown = fixture
        .post("/api/v1/brts/redeem", json!({ "reservation_code": "BRT-NOPE0000" }))
        .await;
    assert_status!(unknown, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body["kind"], "not_found");

    let malformed = fixture
        .post("/api/v1/brts/redeem", json!({ "reservation_code": "hello" }))
        .await;
    assert_status!(malformed, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.body["kind"], "validation_failed");

    let missing = fixture.post("/api/v1/brts/redeem", json!({})).await;
    assert_status!(missing, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_validation() {
    let fixture = TestFixture::new().await;

    for amount in [json!("0"), json!("-3.00"), json!("1.005"), json!("abc")] {
        let response = fixture
            .post("/api/v1/brts", json!({ "amount": amount }))
            .await;
        assert_status!(response, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["kind"], "validation_failed");
    }

    let malformed = fixture
        .post_raw("/api/v1/brts", "{not json", "application/json")
        .await;
    assert_eq!(malformed.status.as_u16() / 100, 4);
    assert_eq!(malformed.body["kind"], "invalid_request");

    let wrong_type = fixture
        .post_raw("/api/v1/brts", r#"{"amount": "1.00"}"#, "text/plain")
        .await;
    assert_status!(wrong_type, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_expiry_beyond_year_9999_is_rejected() {
    let fixture = TestFixture::new().await;
    let far = "+10000-01-01T00:00:00Z";

    let create = fixture
        .post("/api/v1/brts", json!({ "amount": "5.00", "expires_at": far }))
        .await;
    assert_status!(create, StatusCode::BAD_REQUEST);
    assert_eq!(create.body["kind"], "validation_failed");

    let created = fixture.post("/api/v1/brts", json!({ "amount": "5.00" })).await;
    let path = format!("/api/v1/brts/{}", created.body["id"].as_str().unwrap());
    let patch = fixture.patch(&path, json!({ "expires_at": far })).await;
    assert_status!(patch, StatusCode::BAD_REQUEST);
    assert_eq!(patch.body["kind"], "validation_failed");

    let list = fixture.get("/api/v1/brts").await;
    assert_status!(list, StatusCode::OK);
    assert_eq!(list.body["total"], 1);
}

// =============================================================================
// Ownership and updates
// =============================================================================

#[tokio::test]
async fn test_unauthenticated_requests_are_rejected() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;

    let response = fixture.get("/api/v1/brts").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["kind"], "unauthorized");

    let bad_key = fixture.as_key("nope", "GET", "/api/v1/brts", None).await;
    assert_status!(bad_key, StatusCode::UNAUTHORIZED);

    // Health stays public
    assert_status!(fixture.get("/api/v1/health").await, StatusCode::OK);
}

#[tokio::test]
async fn test_other_owners_ticket_is_forbidden() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;

    let created = fixture
        .as_key(ALICE_KEY, "POST", "/api/v1/brts", Some(json!({ "amount": "20.00" })))
        .await;
    assert_status!(created, StatusCode::CREATED);
    assert_eq!(created.body["owner_id"], "alice");
    let path = format!("/api/v1/brts/{}", created.body["id"].as_str().unwrap());
    let code = created.body["code"].as_str().unwrap().to_string();

    let get = fixture.as_key(BOB_KEY, "GET", &path, None).await;
    assert_status!(get, StatusCode::FORBIDDEN);
    assert_eq!(get.body["kind"], "forbidden");

    let patch = fixture
        .as_key(BOB_KEY, "PATCH", &path, Some(json!({ "amount": "1.00" })))
        .await;
    assert_status!(patch, StatusCode::FORBIDDEN);

    let delete = fixture.as_key(BOB_KEY, "DELETE", &path, None).await;
    assert_status!(delete, StatusCode::FORBIDDEN);

    // Redemption is open to any authenticated caller
    let redeemed = fixture
        .as_key(
            BOB_KEY,
            "POST",
            "/api/v1/brts/redeem",
            Some(json!({ "reservation_code": code })),
        )
        .await;
    assert_status!(redeemed, StatusCode::OK);
}

#[tokio::test]
async fn test_update_ticket() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .post(
            "/api/v1/brts",
            json!({ "amount": "20.00", "expires_at": Utc::now() + Duration::hours(1) }),
        )
        .await;
    let path = format!("/api/v1/brts/{}", created.body["id"].as_str().unwrap());

    let patched = fixture
        .patch(&path, json!({ "amount": "25.50", "expires_at": null }))
        .await;
    assert_status!(patched, StatusCode::OK);
    assert_eq!(patched.body["amount"], "25.50");
    assert!(patched.body["expires_at"].is_null());
    assert_eq!(patched.body["code"], created.body["code"]);

    let put = fixture.put(&path, json!({ "amount": 30 })).await;
    assert_status!(put, StatusCode::OK);
    assert_eq!(put.body["amount"], "30.00");

    let status_change = fixture.patch(&path, json!({ "status": "redeemed" })).await;
    assert_status!(status_change, StatusCode::BAD_REQUEST);

    let empty = fixture.patch(&path, json!({})).await;
    assert_status!(empty, StatusCode::BAD_REQUEST);

    let missing = fixture.patch("/api/v1/brts/does-not-exist", json!({ "amount": 1 })).await;
    assert_status!(missing, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_terminal_ticket_cannot_be_updated() {
    let fixture = TestFixture::new().await;
    let created = fixture.post("/api/v1/brts", json!({ "amount": "20.00" })).await;
    let path = format!("/api/v1/brts/{}", created.body["id"].as_str().unwrap());
    fixture
        .post(
            "/api/v1/brts/redeem",
            json!({ "reservation_code": created.body["code"] }),
        )
        .await;

    let response = fixture.patch(&path, json!({ "amount": "1.00" })).await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_eq!(response.body["kind"], "invalid_state");

    let reread = fixture.get(&path).await;
    assert_eq!(reread.body["status"], "redeemed");
    assert_eq!(reread.body["amount"], "20.00");
}

#[tokio::test]
async fn test_delete_hides_ticket() {
    let fixture = TestFixture::new().await;
    let created = fixture.post("/api/v1/brts", json!({ "amount": "20.00" })).await;
    let path = format!("/api/v1/brts/{}", created.body["id"].as_str().unwrap());

    let deleted = fixture.delete(&path).await;
    assert_status!(deleted, StatusCode::OK);
    assert_eq!(deleted.body["code"], created.body["code"]);

    assert_status!(fixture.get(&path).await, StatusCode::NOT_FOUND);
    assert_status!(fixture.delete(&path).await, StatusCode::NOT_FOUND);

    let redeem = fixture
        .post(
            "/api/v1/brts/redeem",
            json!({ "reservation_code": created.body["code"] }),
        )
        .await;
    assert_status!(redeem, StatusCode::NOT_FOUND);
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_tickets() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;
    for key in [ALICE_KEY, ALICE_KEY, BOB_KEY] {
        fixture
            .as_key(key, "POST", "/api/v1/brts", Some(json!({ "amount": "1.00" })))
            .await;
    }

    let all = fixture.as_key(ALICE_KEY, "GET", "/api/v1/brts", None).await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 3);
    assert_eq!(all.body["limit"], 15);

    let mine = fixture
        .as_key(ALICE_KEY, "GET", "/api/v1/brts?owner=alice&status=active", None)
        .await;
    assert_eq!(mine.body["total"], 2);
    assert!(mine.body["tickets"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["owner_id"] == "alice"));

    let page = fixture
        .as_key(ALICE_KEY, "GET", "/api/v1/brts?limit=1&offset=1", None)
        .await;
    assert_eq!(page.body["tickets"].as_array().unwrap().len(), 1);
    assert_eq!(page.body["total"], 3);

    let code = all.body["tickets"][0]["code"].as_str().unwrap();
    let searched = fixture
        .as_key(
            ALICE_KEY,
            "GET",
            &format!("/api/v1/brts?search={}", &code[4..].to_lowercase()),
            None,
        )
        .await;
    assert_eq!(searched.body["total"], 1);

    let bad_status = fixture
        .as_key(ALICE_KEY, "GET", "/api/v1/brts?status=pending", None)
        .await;
    assert_status!(bad_status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_applies_lazy_expiry() {
    let fixture = TestFixture::new().await;
    fixture
        .post(
            "/api/v1/brts",
            json!({ "amount": "1.00", "expires_at": Utc::now() - Duration::seconds(5) }),
        )
        .await;

    let listed = fixture.get("/api/v1/brts").await;
    assert_eq!(listed.body["tickets"][0]["status"], "expired");

    let active = fixture.get("/api/v1/brts?status=active").await;
    assert_eq!(active.body["total"], 0);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_headers_and_denial() {
    let fixture = TestFixture::with_config(TestConfig::with_max_attempts(2)).await;

    let first = fixture.post("/api/v1/brts", json!({ "amount": "1.00" })).await;
    assert_status!(first, StatusCode::CREATED);
    assert_eq!(first.header("x-ratelimit-limit"), Some("2"));
    assert_eq!(first.header("x-ratelimit-remaining"), Some("1"));

    let second = fixture.post("/api/v1/brts", json!({ "amount": "1.00" })).await;
    assert_eq!(second.header("x-ratelimit-remaining"), Some("0"));

    let denied = fixture.post("/api/v1/brts", json!({ "amount": "1.00" })).await;
    assert_status!(denied, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.body["kind"], "rate_limited");
    assert_eq!(denied.header("retry-after"), Some("60"));
    assert_eq!(denied.header("x-ratelimit-limit"), Some("2"));
    assert_eq!(denied.header("x-ratelimit-remaining"), Some("0"));

    // Reads are not rate limited
    let listed = fixture.get("/api/v1/brts").await;
    assert_status!(listed, StatusCode::OK);
    assert_eq!(listed.body["total"], 2);
    assert!(listed.header("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_rate_limit_is_per_caller() {
    let fixture = TestFixture::with_config(TestConfig {
        api_keys: true,
        ..TestConfig::with_max_attempts(1)
    })
    .await;
    let body = json!({ "amount": "1.00" });

    let alice = fixture
        .as_key(ALICE_KEY, "POST", "/api/v1/brts", Some(body.clone()))
        .await;
    assert_status!(alice, StatusCode::CREATED);
    let alice = fixture
        .as_key(ALICE_KEY, "POST", "/api/v1/brts", Some(body.clone()))
        .await;
    assert_status!(alice, StatusCode::TOO_MANY_REQUESTS);

    let bob = fixture
        .as_key(BOB_KEY, "POST", "/api/v1/brts", Some(body))
        .await;
    assert_status!(bob, StatusCode::CREATED);
}

#[tokio::test]
async fn test_rate_limit_can_be_disabled() {
    let fixture = TestFixture::with_config(TestConfig {
        rate_limit_enabled: false,
        ..TestConfig::with_max_attempts(1)
    })
    .await;

    for _ in 0..3 {
        let response = fixture.post("/api/v1/brts", json!({ "amount": "1.00" })).await;
        assert_status!(response, StatusCode::CREATED);
        assert!(response.header("x-ratelimit-limit").is_none());
    }
}

// =============================================================================
// Audit
// =============================================================================

#[tokio::test]
async fn test_audit_records_lifecycle() {
    let fixture = TestFixture::new().await;
    let created = fixture.post("/api/v1/brts", json!({ "amount": "9.99" })).await;
    let id = created.body["id"].as_str().unwrap().to_string();
    fixture
        .post(
            "/api/v1/brts/redeem",
            json!({ "reservation_code": created.body["code"] }),
        )
        .await;

    let redeemed = fixture.wait_for_audit("ticket_redeemed", 1).await;
    assert_status!(redeemed, StatusCode::OK);
    assert_eq!(redeemed.body["total"], 1);

    let for_ticket = fixture
        .get(&format!("/api/v1/audit?ticket_id={}", id))
        .await;
    let types: Vec<&str> = for_ticket.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();
    assert_eq!(types, vec!["ticket_redeemed", "ticket_created"]);
}

#[tokio::test]
async fn test_audit_records_rate_limit_denials() {
    let fixture = TestFixture::with_config(TestConfig::with_max_attempts(1)).await;
    for _ in 0..3 {
        fixture.post("/api/v1/brts", json!({ "amount": "1.00" })).await;
    }

    let denied = fixture.wait_for_audit("rate_limit_exceeded", 2).await;
    assert_eq!(denied.body["total"], 2);
}

#[tokio::test]
async fn test_concurrent_redeem_has_one_winner() {
    let fixture = TestFixture::new().await;
    let created = fixture.post("/api/v1/brts", json!({ "amount": "75.00" })).await;
    let body = json!({ "reservation_code": created.body["code"] });

    let attempts = (0..8).map(|_| fixture.post("/api/v1/brts/redeem", body.clone()));
    let responses = futures::future::join_all(attempts).await;

    let winners = responses
        .iter()
        .filter(|r| r.status == StatusCode::OK)
        .count();
    assert_eq!(winners, 1);
    for loser in responses.iter().filter(|r| r.status != StatusCode::OK) {
        assert_status!(loser, StatusCode::CONFLICT);
        assert_eq!(loser.body["kind"], "already_redeemed");
    }
}
