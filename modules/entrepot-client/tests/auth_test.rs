//! Token acquisition against a mocked SSO endpoint.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use entrepot_client::Authenticator;
use gpf_common::{Config, GpfError};

fn config_for(server: &MockServer) -> Arc<Config> {
    let overlay = format!(
        "[store_authentification]\n\
         token_url = {}/auth/token\n\
         login = TEST_LOGIN\n\
         password = TEST_PASSWORD\n\
         client_id = TEST_CLIENT_ID\n\
         client_secret = TEST_CLIENT_SECRET\n\
         nb_attempts = 3\n\
         sec_between_attempts = 0\n\
         sec_duration_margin = 30\n",
        server.uri()
    );
    Arc::new(Config::from_ini_str(&overlay).unwrap())
}

fn valid_token() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "test_token",
        "expires_in": 300
    }))
}

#[tokio::test]
async fn token_happy_path_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(valid_token())
        .expect(1)
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    assert_eq!(auth.get_access_token_string().await.unwrap(), "test_token");
    // second call within the TTL: no new HTTP exchange (expect(1) verifies)
    assert_eq!(auth.get_access_token_string().await.unwrap(), "test_token");
}

#[tokio::test]
async fn token_form_body_field_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(valid_token())
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    auth.get_access_token_string().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert_eq!(
        body,
        "grant_type=password&username=TEST_LOGIN&password=TEST_PASSWORD&client_id=TEST_CLIENT_ID&client_secret=TEST_CLIENT_SECRET"
    );
}

#[tokio::test]
async fn token_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(valid_token())
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    assert_eq!(auth.get_access_token_string().await.unwrap(), "test_token");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn token_exhaustion_names_attempt_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    let err = auth.get_access_token_string().await.unwrap_err();
    match err {
        GpfError::Authentification(message) => assert_eq!(
            message,
            "La récupération du jeton d'authentification a échoué après 3 tentatives"
        ),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn account_not_fully_set_up_is_fatal() {
    let server = MockServer::start().await;
    let description = "blabla. Account is not fully set up ... suite";
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error_description": description })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    let err = auth.get_access_token_string().await.unwrap_err();
    match err {
        GpfError::Authentification(message) => {
            assert!(message.contains("KeyCloak"));
            assert!(message.contains(description));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn http_header_carries_bearer_and_optional_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(valid_token())
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    let plain = auth.get_http_header(false).await.unwrap();
    assert_eq!(plain["Authorization"], "Bearer test_token");
    assert_eq!(plain.len(), 1);

    let with_json = auth.get_http_header(true).await.unwrap();
    assert_eq!(with_json["Authorization"], "Bearer test_token");
    assert_eq!(with_json["content-type"], "application/json");
    assert_eq!(with_json.len(), 2);
}

#[tokio::test]
async fn revoked_token_forces_reacquisition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(valid_token())
        .expect(2)
        .mount(&server)
        .await;

    let auth = Authenticator::new(config_for(&server));
    assert_eq!(auth.get_access_token_string().await.unwrap(), "test_token");
    auth.revoke_token().await;
    assert_eq!(auth.get_access_token_string().await.unwrap(), "test_token");
}
