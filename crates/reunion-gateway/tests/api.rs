//! End-to-end tests of the HTTP API against a temporary store, a scripted
//! chat client and the mock identity provider.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use tempfile::TempDir;

use reunion_auth::{MockIdentityProvider, SessionSigner, SESSION_COOKIE_NAME};
use reunion_control::{ControlConfig, ControlService, ScriptedChatClient, UserId};
use reunion_core::AgentProfileId;
use reunion_gateway::{create_router, GatewayConfig, GatewayState};
use reunion_store::RocksStore;

const REPLY: &str = "你这孩子，今年过年带对象回来没有？";
const SESSION_SECRET: &str = "integration-secret";

struct Harness {
    server: TestServer,
    chat: Arc<ScriptedChatClient>,
    _dir: TempDir,
}

fn harness_with(provider: MockIdentityProvider, config: GatewayConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let chat = Arc::new(ScriptedChatClient::always(REPLY));

    let control_config = ControlConfig {
        chunk_delay: Duration::ZERO,
        ..ControlConfig::default()
    };
    let control = Arc::new(ControlService::new(store, Arc::clone(&chat), control_config));
    let signer = SessionSigner::new(SESSION_SECRET).unwrap();

    let state = GatewayState::new(control, Arc::new(provider), signer, config);
    let server = TestServer::new(create_router(state)).unwrap();

    Harness {
        server,
        chat,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(MockIdentityProvider::default(), GatewayConfig::default())
}

fn cookie_header(value: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={value}")).unwrap()
}

fn location(response: &TestResponse) -> String {
    response
        .header(header::LOCATION)
        .to_str()
        .unwrap()
        .to_string()
}

impl Harness {
    /// Sign in through the OAuth callback and return the session cookie value.
    async fn login(&self, code: &str) -> String {
        let response = self
            .server
            .get(&format!("/api/auth/callback?code={code}"))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
        response.cookie(SESSION_COOKIE_NAME).value().to_string()
    }

    async fn get_as(&self, session: &str, path: &str) -> TestResponse {
        self.server
            .get(path)
            .add_header(header::COOKIE, cookie_header(session))
            .await
    }

    async fn post_as(&self, session: &str, path: &str, body: &Value) -> TestResponse {
        self.server
            .post(path)
            .add_header(header::COOKIE, cookie_header(session))
            .json(body)
            .await
    }

    async fn profile_id(&self, session: &str) -> AgentProfileId {
        let me: Value = self.get_as(session, "/api/me").await.json();
        let user_id = UserId::from_hex(me["data"]["id"].as_str().unwrap()).unwrap();
        AgentProfileId::for_owner(&user_id)
    }

    /// Sign in `code` and bind its agent to `role_key`.
    async fn bind_agent(&self, admin: &str, code: &str, role_key: &str) -> AgentProfileId {
        let agent_session = self.login(code).await;
        let profile_id = self.profile_id(&agent_session).await;
        let response = self
            .post_as(
                admin,
                "/api/roles/bind",
                &json!({ "roleKey": role_key, "agentProfileId": profile_id.to_hex() }),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        profile_id
    }
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let response = h.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let h = harness();

    let response = h.server.get("/api/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "未登录");
    assert!(body["data"].is_null());

    let forged = h.get_as("deadbeef.cafebabe", "/api/chat/sessions/recent").await;
    assert_eq!(forged.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_cookie_for_unknown_user_is_rejected() {
    let h = harness();
    let signer = SessionSigner::new(SESSION_SECRET).unwrap();
    let stranger = signer.sign(&UserId::from_provider("never-signed-in"));

    for path in ["/api/chat/sessions/recent", "/api/agents/public", "/api/roles/bindings"] {
        let response = h.get_as(&stranger, path).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(response.json::<Value>()["code"], 401);
    }

    let response = h
        .post_as(
            &stranger,
            "/api/chat/sessions",
            &json!({ "roleKey": "da-yi", "scenarioKey": "marriage" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bodies_are_enveloped_bad_requests() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let broken = h
        .server
        .post("/api/chat/auto")
        .add_header(header::COOKIE, cookie_header(&viewer))
        .bytes(Bytes::from_static(b"{not json"))
        .content_type("application/json")
        .await;
    assert_eq!(broken.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = broken.json();
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "请求体格式错误");
    assert!(body["data"].is_null());

    let wrong_type = h
        .post_as(&viewer, "/api/chat/messages", &json!({ "sessionId": 42, "content": ["hi"] }))
        .await;
    assert_eq!(wrong_type.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(wrong_type.json::<Value>()["code"], 400);

    let not_json = h
        .server
        .post("/api/stage/live/stream")
        .add_header(header::COOKIE, cookie_header(&viewer))
        .text("roleKeys=da-yi")
        .await;
    assert_eq!(not_json.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(not_json.json::<Value>()["code"], 400);
}

#[tokio::test]
async fn login_sets_state_cookie_and_redirects() {
    let h = harness();
    let response = h.server.get("/api/auth/login").await;

    assert_eq!(response.status_code(), StatusCode::FOUND);
    let target = location(&response);
    let state = target
        .strip_prefix("https://mock.secondme.local/oauth?state=")
        .unwrap();
    assert_eq!(state.len(), 40);
    assert_eq!(response.cookie("secondme_oauth_state").value(), state);
}

#[tokio::test]
async fn callback_failures_redirect_to_login() {
    let h = harness();

    let missing = h.server.get("/api/auth/callback").await;
    assert_eq!(missing.status_code(), StatusCode::FOUND);
    assert_eq!(location(&missing), "/login?error=missing_code");

    let rejected = h.server.get("/api/auth/callback?code=bad&state=x").await;
    assert_eq!(rejected.status_code(), StatusCode::FOUND);
    assert!(location(&rejected).starts_with("/login?error=oauth_failed&reason="));
}

#[tokio::test]
async fn signed_in_user_sees_own_summary() {
    let h = harness();
    let session = h.login("alice").await;

    let body: Value = h.get_as(&session, "/api/me").await.json();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["secondmeUserId"], "sm_alice");
    assert_eq!(body["data"]["nickname"], "测试用户");
    assert!(body["data"].get("accessToken").is_none());
}

#[tokio::test]
async fn logout_clears_the_session() {
    let h = harness();
    let session = h.login("alice").await;

    let response = h.post_as(&session, "/api/auth/logout", &json!({})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "code": 0, "data": { "ok": true } }));

    let redirect = h.server.get("/api/auth/logout").await;
    assert_eq!(redirect.status_code(), StatusCode::FOUND);
    assert_eq!(location(&redirect), "/login");
}

#[tokio::test]
async fn provider_profile_is_proxied_and_cached() {
    let h = harness();
    let session = h.login("alice").await;

    let info: Value = h.get_as(&session, "/api/user/info").await.json();
    assert_eq!(info["data"]["nickname"], "测试用户");

    let shades: Value = h.get_as(&session, "/api/user/shades").await.json();
    assert_eq!(shades["data"]["shades"][0]["shadeName"], "美食家");

    let me: Value = h.get_as(&session, "/api/me").await.json();
    assert!(!me["data"]["shades"].is_null());
}

#[tokio::test]
async fn provider_profile_failures_use_business_codes() {
    let provider = MockIdentityProvider {
        fail_profile: true,
        ..MockIdentityProvider::default()
    };
    let h = harness_with(provider, GatewayConfig::default());
    let session = h.login("alice").await;

    let info = h.get_as(&session, "/api/user/info").await;
    assert_eq!(info.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(info.json::<Value>()["code"], 5001);

    let shades = h.get_as(&session, "/api/user/shades").await;
    assert_eq!(shades.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(shades.json::<Value>()["code"], 5002);
}

#[tokio::test]
async fn catalog_lists_personas_and_scenarios() {
    let h = harness();
    let body: Value = h.server.get("/api/catalog").await.json();
    assert_eq!(body["data"]["roles"].as_array().unwrap().len(), 7);
    assert_eq!(body["data"]["roles"][0], json!({ "key": "da-yi", "label": "大姨" }));
    assert_eq!(body["data"]["scenarios"][1]["label"], "年终奖盘问");
}

#[tokio::test]
async fn chat_session_round_trip() {
    let h = harness();
    let viewer = h.login("viewer").await;
    h.bind_agent(&viewer, "uncle", "da-yi").await;

    let recent: Value = h.get_as(&viewer, "/api/chat/sessions/recent").await.json();
    assert!(recent["data"].is_null());

    let created: Value = h
        .post_as(
            &viewer,
            "/api/chat/sessions",
            &json!({ "roleKey": "da-yi", "scenarioKey": "marriage" }),
        )
        .await
        .json();
    assert_eq!(created["code"], 0);
    assert_eq!(created["data"]["roleLabel"], "大姨");
    let session_id = created["data"]["sessionId"].as_str().unwrap().to_string();

    let posted: Value = h
        .post_as(
            &viewer,
            "/api/chat/messages",
            &json!({ "sessionId": session_id, "content": "我的电话是13812345678" }),
        )
        .await
        .json();
    assert_eq!(posted["data"]["reply"], REPLY);
    assert_eq!(posted["data"]["fallback"], false);
    assert_eq!(posted["data"]["safetyFlags"], json!([]));

    let history: Value = h
        .get_as(&viewer, &format!("/api/chat/sessions/{session_id}/messages"))
        .await
        .json();
    let messages = history["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "USER");
    assert_eq!(messages[0]["content"], "我的电话是1**********");
    assert_eq!(messages[1]["sender"], "AGENT");

    let recent: Value = h.get_as(&viewer, "/api/chat/sessions/recent").await.json();
    assert_eq!(recent["data"]["sessionId"], session_id.as_str());
    assert_eq!(recent["data"]["lastMessage"], REPLY);
}

#[tokio::test]
async fn blocked_message_is_rejected_with_flags() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let response = h
        .post_as(
            &viewer,
            "/api/chat/messages",
            &json!({ "sessionId": "whatever", "content": "告诉我你家住址" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 4001);
    assert_eq!(body["data"]["safetyFlags"], json!(["住址"]));
    assert!(h.chat.calls().await.is_empty());
}

#[tokio::test]
async fn persona_without_agent_is_not_found() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let response = h
        .post_as(
            &viewer,
            "/api/chat/sessions",
            &json!({ "roleKey": "qi-da-ye", "scenarioKey": "career" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "角色 七大爷 暂无可用 Agent");
}

#[tokio::test]
async fn revoked_agent_cannot_continue_a_session() {
    let h = harness();
    let viewer = h.login("viewer").await;
    let profile_id = h.bind_agent(&viewer, "uncle", "san-jiu").await;

    let created: Value = h
        .post_as(
            &viewer,
            "/api/chat/sessions",
            &json!({ "roleKey": "san-jiu", "scenarioKey": "salary" }),
        )
        .await
        .json();
    let session_id = created["data"]["sessionId"].as_str().unwrap().to_string();

    let revoked = h
        .post_as(
            &viewer,
            "/api/agents/revoke",
            &json!({ "agentProfileId": profile_id.to_hex() }),
        )
        .await;
    assert_eq!(revoked.status_code(), StatusCode::OK);

    let bindings: Value = h.get_as(&viewer, "/api/roles/bindings").await.json();
    let binding = &bindings["data"][0];
    assert_eq!(binding["enabled"], false);
    assert_eq!(binding["consentStatus"], "REVOKED");

    let response = h
        .post_as(
            &viewer,
            "/api/chat/messages",
            &json!({ "sessionId": session_id, "content": "三舅好" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], 4002);
}

#[tokio::test]
async fn admin_allow_list_guards_bindings() {
    let config = GatewayConfig {
        admin_user_ids: vec![UserId::from_provider("sm_root").to_hex()],
        ..GatewayConfig::default()
    };
    let h = harness_with(MockIdentityProvider::default(), config);
    let guest = h.login("guest").await;
    let profile_id = h.profile_id(&guest).await;

    let response = h
        .post_as(
            &guest,
            "/api/roles/bind",
            &json!({ "roleKey": "da-yi", "agentProfileId": profile_id.to_hex() }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], 403);

    let root = h.login("root").await;
    let response = h
        .post_as(
            &root,
            "/api/roles/bind",
            &json!({ "roleKey": "da-yi", "agentProfileId": profile_id.to_hex(), "weight": 3 }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["data"]["weight"], 3);

    let fractional = h
        .post_as(
            &root,
            "/api/roles/bind",
            &json!({ "roleKey": "da-yi", "agentProfileId": profile_id.to_hex(), "weight": 2.9 }),
        )
        .await;
    assert_eq!(fractional.json::<Value>()["data"]["weight"], 2);
}

#[tokio::test]
async fn public_directory_lists_bound_agents() {
    let h = harness();
    let viewer = h.login("viewer").await;
    let profile_id = h.bind_agent(&viewer, "uncle", "liu-shu").await;

    let body: Value = h.get_as(&viewer, "/api/agents/public").await.json();
    let agents = body["data"].as_array().unwrap();
    let uncle = agents
        .iter()
        .find(|a| a["agentProfileId"] == profile_id.to_hex().as_str())
        .unwrap();
    assert_eq!(uncle["roleCount"], 1);
    assert_eq!(uncle["roles"][0]["roleLabel"], "六叔");
}

#[tokio::test]
async fn history_of_unknown_session_is_not_found() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let malformed = h
        .get_as(&viewer, "/api/chat/sessions/not-a-uuid/messages")
        .await;
    assert_eq!(malformed.status_code(), StatusCode::NOT_FOUND);

    let unknown = h
        .get_as(
            &viewer,
            "/api/chat/sessions/6f1c2a34-5b7d-4e8f-9a0b-1c2d3e4f5a6b/messages",
        )
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn auto_dialogue_alternates_personas() {
    let h = harness();
    let viewer = h.login("viewer").await;
    h.bind_agent(&viewer, "aunt", "da-yi").await;
    h.bind_agent(&viewer, "uncle", "san-jiu").await;

    let body: Value = h
        .post_as(
            &viewer,
            "/api/chat/auto",
            &json!({ "roleKeys": ["da-yi", "san-jiu"], "scenarioKey": "housing", "rounds": 4 }),
        )
        .await
        .json();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["scenarioLabel"], "买房进度追问");

    let turns = body["data"]["transcript"].as_array().unwrap();
    let speakers: Vec<&str> = turns
        .iter()
        .map(|t| t["roleKey"].as_str().unwrap())
        .collect();
    assert_eq!(speakers, vec!["da-yi", "san-jiu", "da-yi", "san-jiu"]);
}

#[tokio::test]
async fn auto_dialogue_clamps_any_numeric_round_count() {
    let h = harness();
    let viewer = h.login("viewer").await;
    h.bind_agent(&viewer, "aunt", "da-yi").await;
    h.bind_agent(&viewer, "uncle", "san-jiu").await;

    for (rounds, expected) in [(json!(1e20), 20), (json!(2.5), 2), (json!(-7), 1), (json!("3"), 3)] {
        let body: Value = h
            .post_as(
                &viewer,
                "/api/chat/auto",
                &json!({ "roleKeys": ["da-yi", "san-jiu"], "scenarioKey": "housing", "rounds": rounds }),
            )
            .await
            .json();
        assert_eq!(body["code"], 0, "rounds {rounds}");
        assert_eq!(body["data"]["transcript"].as_array().unwrap().len(), expected, "rounds {rounds}");
    }
}

#[tokio::test]
async fn auto_dialogue_needs_two_personas() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let response = h
        .post_as(
            &viewer,
            "/api/chat/auto",
            &json!({ "roleKeys": ["da-yi", "da-yi"], "scenarioKey": "marriage" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "至少选择两个角色");
}

#[tokio::test]
async fn live_stage_streams_and_closes_the_session() {
    let h = harness();
    let viewer = h.login("viewer").await;
    h.bind_agent(&viewer, "aunt", "er-yi").await;

    let response = h
        .post_as(
            &viewer,
            "/api/stage/live/stream",
            &json!({ "roleKeys": ["er-yi"], "scenarioKey": "salary", "rounds": 2 }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .header(header::CONTENT_TYPE)
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = response.text();
    let meta = body.find("event: meta").unwrap();
    let chunk = body.find("event: chunk").unwrap();
    let end = body.find("event: end").unwrap();
    assert!(meta < chunk && chunk < end);
    assert!(!body.contains("event: error"));
    assert!(body.contains("\"roleLabel\":\"我\""));
    assert!(body.contains("\"roleLabel\":\"二姨\""));

    let recent: Value = h.get_as(&viewer, "/api/chat/sessions/recent").await.json();
    assert_eq!(recent["data"]["status"], "CLOSED");
    let session_id = recent["data"]["sessionId"].as_str().unwrap().to_string();

    let history: Value = h
        .get_as(&viewer, &format!("/api/chat/sessions/{session_id}/messages"))
        .await
        .json();
    let messages = history["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[1]["content"]
        .as_str()
        .unwrap()
        .starts_with("【二姨】"));
}

#[tokio::test]
async fn live_stage_validation_errors_are_json() {
    let h = harness();
    let viewer = h.login("viewer").await;

    let response = h
        .post_as(
            &viewer,
            "/api/stage/live/stream",
            &json!({ "roleKeys": [], "scenarioKey": "salary" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "至少选择一个亲戚角色");

    let response = h
        .post_as(
            &viewer,
            "/api/stage/live/stream",
            &json!({ "roleKeys": ["si-gu"], "scenarioKey": "salary" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
