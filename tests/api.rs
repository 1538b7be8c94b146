use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use coinvest::models::users::User;
use coinvest::repositories::{memory::MemoryStore, Filter, Repository, Store};
use coinvest::server::{self, AppState};
use coinvest::services::mail::{MailRequest, Mailer};
use coinvest::services::ServiceManager;
use coinvest::settings::{Accounts, Auth, Database, Frontend, Mail, Prices, Settings, Tokens};

fn settings() -> Settings {
    Settings {
        database: Database {
            url: "memory://".to_string(),
            max_connections: 1,
        },
        auth: Auth {
            jwt_secret: "api-test-jwt".to_string(),
            token_ttl_hours: 1,
            csrf_secret: "api-test-csrf".to_string(),
            argon2_memory_kib: 64,
            argon2_iterations: 1,
        },
        mail: Mail {
            relay_url: None,
            api_key: None,
            sender: "noreply@coinvest.test".to_string(),
            developer_email: "dev@coinvest.test".to_string(),
        },
        frontend: Frontend {
            link: "https://app.coinvest.test".to_string(),
        },
        tokens: Tokens::default(),
        accounts: Accounts {
            demo_balance: Decimal::from(500),
        },
        prices: Prices::default(),
    }
}

struct TestApp {
    router: Router,
    store: Arc<dyn Store>,
    csrf_cookie: String,
    csrf_token: String,
    _mail: mpsc::Receiver<MailRequest>,
}

struct Reply {
    status: StatusCode,
    body: Value,
}

impl TestApp {
    async fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (mail_tx, mail_rx) = mpsc::channel(64);
        let services = ServiceManager::new(store.clone(), &settings(), Mailer::new(mail_tx));
        let router = server::router(AppState::new(services));

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/csrf-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let csrf_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        let csrf_token = body["data"]["token"].as_str().unwrap().to_string();

        TestApp {
            router,
            store,
            csrf_cookie,
            csrf_token,
            _mail: mail_rx,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        with_csrf: bool,
    ) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if with_csrf {
            request = request
                .header(header::COOKIE, &self.csrf_cookie)
                .header("x-csrf-token", &self.csrf_token);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply { status, body }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.send(Method::GET, uri, token, None, false).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.send(Method::POST, uri, token, Some(body), true).await
    }

    async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.send(Method::PUT, uri, token, Some(body), true).await
    }

    async fn register(&self, username: &str) -> (String, String) {
        let reply = self
            .post(
                "/auth/register",
                None,
                json!({
                    "email": format!("{}@coinvest.test", username),
                    "username": username,
                    "country": "NG",
                    "password": "correct horse battery",
                }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

        let token = reply.body["data"]["token"].as_str().unwrap().to_string();
        let id = reply.body["data"]["user"]["id"].as_str().unwrap().to_string();
        (id, token)
    }

    async fn promote(&self, id: &str, role: &str) {
        let users: Repository<User> = Repository::new(self.store.clone());
        users
            .transition(id.parse().unwrap(), Filter::All, json!({ "role": role }))
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn health_check_needs_nothing() {
    let app = TestApp::new().await;
    let reply = app.get("/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn state_changing_requests_require_csrf_token() {
    let app = TestApp::new().await;
    let reply = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "login": "nobody", "password": "whatever1" })),
            false,
        )
        .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["status"], "error");
}

#[tokio::test]
async fn registration_returns_session_and_profile() {
    let app = TestApp::new().await;
    let (id, token) = app.register("alice").await;

    let reply = app.get("/users/me", Some(&token)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "success");
    assert_eq!(reply.body["data"]["id"], id.as_str());
    assert_eq!(reply.body["data"]["role"], "USER");
    assert_eq!(reply.body["data"]["balances"]["demo"], "500");
}

#[tokio::test]
async fn invalid_bodies_report_field_errors() {
    let app = TestApp::new().await;
    let reply = app
        .post(
            "/auth/register",
            None,
            json!({
                "email": "not-an-email",
                "username": "al",
                "country": "NG",
                "password": "short",
            }),
        )
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(!reply.body["data"]["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn protected_routes_reject_missing_tokens() {
    let app = TestApp::new().await;
    let reply = app.get("/deposits", None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Authentication token missing");
}

#[tokio::test]
async fn members_cannot_manage_the_catalog() {
    let app = TestApp::new().await;
    let (_, token) = app.register("bob").await;

    let reply = app
        .post(
            "/master/assets",
            Some(&token),
            json!({ "name": "Bitcoin", "symbol": "BTC", "type": "CRYPTO" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Insufficient permissions");
}

#[tokio::test]
async fn admins_manage_assets_with_unique_names() {
    let app = TestApp::new().await;
    let (id, token) = app.register("carol").await;
    app.promote(&id, "ADMIN").await;

    let asset = json!({ "name": "Bitcoin", "symbol": "BTC", "type": "CRYPTO" });
    let reply = app.post("/master/assets", Some(&token), asset.clone()).await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app.post("/master/assets", Some(&token), asset).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["message"], "Asset already exists");

    let reply = app.get("/assets", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["total"], 1);
    assert_eq!(reply.body["data"]["items"][0]["symbol"], "BTC");
}

#[tokio::test]
async fn admins_cannot_change_roles() {
    let app = TestApp::new().await;
    let (admin_id, admin_token) = app.register("dave").await;
    app.promote(&admin_id, "ADMIN").await;
    let (member_id, _) = app.register("erin").await;

    let reply = app
        .put(
            &format!("/master/users/{}/role", member_id),
            Some(&admin_token),
            json!({ "role": "ADMIN" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let (root_id, root_token) = app.register("frank").await;
    app.promote(&root_id, "SUPER_ADMIN").await;
    let reply = app
        .put(
            &format!("/master/users/{}/role", member_id),
            Some(&root_token),
            json!({ "role": "ADMIN" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["role"], "ADMIN");
}

#[tokio::test]
async fn transfers_move_main_balance_between_members() {
    let app = TestApp::new().await;
    let (admin_id, admin_token) = app.register("grace").await;
    app.promote(&admin_id, "ADMIN").await;
    let (sender_id, sender_token) = app.register("heidi").await;
    app.register("ivan").await;

    let reply = app
        .put(
            &format!("/master/users/{}/balance", sender_id),
            Some(&admin_token),
            json!({ "account": "main", "amount": "100" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = app
        .post(
            "/transfers",
            Some(&sender_token),
            json!({ "username": "ivan", "amount": "40" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["data"]["status"], "SUCCESSFUL");

    let reply = app.get("/users/me", Some(&sender_token)).await;
    assert_eq!(reply.body["data"]["balances"]["main"], "60");
}

#[tokio::test]
async fn unknown_records_are_not_found() {
    let app = TestApp::new().await;
    let (_, token) = app.register("judy").await;

    let reply = app.get("/deposits/not-a-uuid", Some(&token)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "Deposit not found");
}

#[tokio::test]
async fn usernames_cannot_be_renamed_to_an_email() {
    let app = TestApp::new().await;
    app.register("kate").await;
    let (_, token) = app.register("leo").await;

    let reply = app
        .put(
            "/users/me",
            Some(&token),
            json!({ "username": "kate@coinvest.test" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app
        .post(
            "/auth/login",
            None,
            json!({ "login": "kate@coinvest.test", "password": "correct horse battery" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["data"]["user"]["username"], "kate");
}

#[tokio::test]
async fn admins_cannot_credit_themselves() {
    let app = TestApp::new().await;
    let (admin_id, admin_token) = app.register("mike").await;
    app.promote(&admin_id, "ADMIN").await;

    let reply = app
        .put(
            &format!("/master/users/{}/balance", admin_id),
            Some(&admin_token),
            json!({ "account": "main", "amount": "1000000" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app.get("/users/me", Some(&admin_token)).await;
    assert_eq!(reply.body["data"]["balances"]["main"], "0");
}
