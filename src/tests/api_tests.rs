use super::{TEST_SECRET, create_test_service, seed_group};
use crate::api::handlers::{AppService, app};
use crate::auth::jwt::JwtService;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    service: Arc<AppService>,
}

impl TestApp {
    fn new(service: AppService) -> Self {
        let service = Arc::new(service);
        TestApp {
            router: app(service.clone()),
            service,
        }
    }

    fn token(&self, user_id: i64) -> String {
        JwtService::new(TEST_SECRET.to_string()).generate_token(user_id).unwrap()
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.dispatch(request).await
    }

    async fn send_with_authorization(&self, uri: &str, authorization: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap();
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn create_body(amount: f64, payer: i64, group_id: i64, splits: &[(f64, i64)]) -> Value {
    json!({
        "Transaction": {
            "amount": amount,
            "createdBy": payer,
            "payerId": payer,
            "groupId": group_id,
            "description": "Groceries"
        },
        "TransactionDetailsPartial": splits
            .iter()
            .map(|(split, recipient)| json!({
                "amount": split,
                "payerId": payer,
                "recipientId": recipient,
                "groupId": group_id
            }))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn test_create_transaction_returns_created() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;

    let body = create_body(100.0, alice.id, group.group.id, &[(50.0, bob.id), (50.0, alice.id)]);
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;

    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["amount"].as_f64(), Some(100.0));
    assert_eq!(created["transactionDetails"].as_array().map(|d| d.len()), Some(2));
    assert_eq!(created["payer"]["id"], alice.id);
    assert_eq!(created["group"]["id"], group.group.id);

    let (status, text) = test.send("GET", "/api/v1/Transactions/1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_transaction_rejections() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;
    let group_id = group.group.id;

    let body = create_body(100.0, alice.id, group_id, &[(100.0, bob.id), (50.0, alice.id)]);
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Transaction total does not equal sum of transaction details");

    let body = create_body(100.0, alice.id, 999, &[(50.0, bob.id), (50.0, alice.id)]);
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "group id does not exist: 999");

    let mut body = create_body(100.0, alice.id, group_id, &[(50.0, bob.id), (50.0, alice.id)]);
    body["TransactionDetailsPartial"][1]["groupId"] = json!(group_id + 1);
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Transaction group does not match transaction details group");

    let body = create_body(0.0, alice.id, group_id, &[(50.0, bob.id), (-50.0, alice.id)]);
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Transaction amounts cannot be negative");

    let (_, text) = test.send("GET", "/api/v1/Transactions", None, None).await;
    assert_eq!(text, "[]");
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/Transactions/add")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = test.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );

    let mut body = create_body(100.0, alice.id, group.group.id, &[(100.0, bob.id)]);
    body["Transaction"]["amount"] = json!("a lot");
    let (status, _) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "Transaction": { "amount": 1, "createdBy": 1, "payerId": 1, "groupId": 1 } });
    let (status, text) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Invalid request: missing field `TransactionDetailsPartial`");
}

#[tokio::test]
async fn test_string_amounts_are_rejected() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;

    let mut body = create_body(100.0, alice.id, group.group.id, &[(100.0, bob.id)]);
    body["Transaction"]["amount"] = json!("100");
    let (status, _) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = create_body(100.0, alice.id, group.group.id, &[(100.0, bob.id)]);
    body["TransactionDetailsPartial"][0]["amount"] = json!("100");
    let (status, _) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, text) = test.send("GET", "/api/v1/Transactions", None, None).await;
    assert_eq!(text, "[]");

    let body = create_body(100.0, alice.id, group.group.id, &[(100.0, bob.id)]);
    test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    let (status, _) = test
        .send("PUT", "/api/v1/Transactions/1/edit", Some(json!({ "amount": "100" })), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fractional_split_over_http() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;

    let body = create_body(97.0, alice.id, group.group.id, &[(48.5, bob.id), (48.5, alice.id)]);
    let (status, _) = test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_delete_transaction_paths() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;
    let body = create_body(100.0, alice.id, group.group.id, &[(50.0, bob.id), (50.0, alice.id)]);
    test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;

    for raw in ["string", "NaN", "0", "-3"] {
        let (status, text) = test
            .send("DELETE", &format!("/api/v1/Transactions/{}/delete", raw), None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "id {}", raw);
        assert_eq!(text, format!("Invalid transaction id: {}", raw));
    }

    let (status, text) = test.send("DELETE", "/api/v1/Transactions/100000/delete", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "Transaction not found: 100000");

    let (status, text) = test.send("DELETE", "/api/v1/Transactions/1/delete", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let deleted: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(deleted["id"], 1);

    let (status, text) = test.send("GET", "/api/v1/Transactions/1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "Transaction not found: 1");

    let (_, text) = test.send("GET", "/api/v1/Transactions/details", None, None).await;
    assert_eq!(text, "[]");
}

#[tokio::test]
async fn test_edit_transaction_over_http() {
    let test = TestApp::new(create_test_service());
    let (alice, bob, group) = seed_group(&test.service).await;
    let body = create_body(100.0, alice.id, group.group.id, &[(100.0, bob.id)]);
    test.send("POST", "/api/v1/Transactions/add", Some(body), None).await;

    let patch = json!({ "amount": 120, "transactionDetails": [
        { "amount": 120, "payerId": alice.id, "recipientId": bob.id, "groupId": group.group.id }
    ]});
    let (status, text) = test.send("PUT", "/api/v1/Transactions/1/edit", Some(patch), None).await;
    assert_eq!(status, StatusCode::OK);
    let updated: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(updated["amount"].as_f64(), Some(120.0));

    let (status, text) = test
        .send("PUT", "/api/v1/Transactions/1/edit", Some(json!({ "amount": 5 })), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Transaction total does not equal sum of transaction details");

    let (_, text) = test
        .send("PUT", "/api/v1/Transactions/1/edit", Some(json!({ "payerId": alice.id })), None)
        .await;
    let kept: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(kept["description"], "Groceries");

    let (status, text) = test
        .send("PUT", "/api/v1/Transactions/1/edit", Some(json!({ "description": null })), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let cleared: Value = serde_json::from_str(&text).unwrap();
    assert!(cleared["description"].is_null());
}

#[tokio::test]
async fn test_forced_list_error_over_http() {
    let test = TestApp::new(create_test_service().with_forced_list_error(true));
    let (status, text) = test.send("GET", "/api/v1/Transactions", None, None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        text,
        "Internal server error: Mock error for testing logging and error handling"
    );
}

#[tokio::test]
async fn test_bearer_token_handling() {
    let test = TestApp::new(create_test_service());
    let (alice, _, _) = seed_group(&test.service).await;

    let (status, text) = test.send("GET", "/api/v1/Transactions", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(text.starts_with("Unauthorized: Invalid token"));

    let body = json!({ "name": "Trip" });
    let (status, _) = test.send("POST", "/api/v1/Groups/create", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = test.token(alice.id);
    let (status, text) = test.send("POST", "/api/v1/Groups/create", Some(body), Some(&token)).await;
    assert_eq!(status, StatusCode::CREATED);
    let group: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(group["members"][0]["role"], "OWNER");
    assert_eq!(group["createdBy"], alice.id);
}

#[tokio::test]
async fn test_authorization_header_shapes() {
    let test = TestApp::new(create_test_service());
    let (alice, _, group) = seed_group(&test.service).await;
    let token = test.token(alice.id);
    let group_uri = format!("/api/v1/Groups/{}", group.group.id);

    let (status, _) = test.send_with_authorization(&group_uri, &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = test
        .send_with_authorization("/api/v1/Transactions", &format!("Bearer: {}", token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = test
        .send_with_authorization("/api/v1/Users/groups", &format!("bearer {}", token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap()[0]["id"], group.group.id);

    let (status, _) = test.send_with_authorization("/api/v1/Transactions", "Bearer: ").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_require_auth_guards_transaction_writes() {
    let test = TestApp::new(create_test_service().with_require_auth(true));
    let (alice, bob, group) = seed_group(&test.service).await;
    let body = create_body(10.0, alice.id, group.group.id, &[(10.0, bob.id)]);

    let (status, _) = test
        .send("POST", "/api/v1/Transactions/add", Some(body.clone()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = test.send("GET", "/api/v1/Transactions", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let token = test.token(alice.id);
    let (status, _) = test
        .send("POST", "/api/v1/Transactions/add", Some(body), Some(&token))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let logs = test.service.activity_log().await.unwrap();
    assert_eq!(logs.last().unwrap().user_id, Some(alice.id));
}

#[tokio::test]
async fn test_group_and_user_routes() {
    let test = TestApp::new(create_test_service());

    let user = json!({ "username": "carol", "email": "carol@example.com", "firstName": "Carol", "lastName": "C" });
    let (status, text) = test.send("POST", "/api/v1/Users/create", Some(user.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let carol: Value = serde_json::from_str(&text).unwrap();
    let carol_id = carol["id"].as_i64().unwrap();

    let (status, text) = test.send("POST", "/api/v1/Users/create", Some(user), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(text, "Email carol@example.com already registered");

    let bad = json!({ "username": "x", "email": "nope", "firstName": "X", "lastName": "Y" });
    let (status, text) = test.send("POST", "/api/v1/Users/create", Some(bad), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Invalid email format: nope");

    let (status, text) = test.send("GET", "/api/v1/Users/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Invalid id: abc");

    let (status, text) = test.send("GET", "/api/v1/Groups/42", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "Group not found: 42");

    let (alice, _, group) = seed_group(&test.service).await;
    let owner = test.token(alice.id);
    let uri = format!("/api/v1/Groups/{}/addmembers", group.group.id);
    let (status, text) = test
        .send("POST", &uri, Some(json!({ "memberIds": [carol_id] })), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap()[0]["status"], "ACTIVE");

    let uri = format!("/api/v1/Groups/{}/leave", group.group.id);
    let (status, text) = test.send("DELETE", &uri, None, Some(&owner)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(text, "Owner must transfer ownership before leaving");

    let (status, text) = test.send("GET", "/api/v1/Users/groups", None, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap().as_array().map(|g| g.len()), Some(1));

    let (status, text) = test.send("GET", "/api/v1/logs", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let logs: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(logs.as_array().unwrap().last().unwrap()["action"], "MEMBERS_ADDED");
}

#[tokio::test]
async fn test_health_and_openapi() {
    let test = TestApp::new(create_test_service());

    let (status, text) = test.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "OK");

    let (status, text) = test.send("GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_str(&text).unwrap();
    assert!(doc["paths"]["/api/v1/Transactions/add"]["post"].is_object());
}
