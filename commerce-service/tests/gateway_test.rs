//! Gateway client tests against a mock epay server.

mod common;

use commerce_service::epay::{
    CreateInvoiceRequest, GatewayError, InvoiceContext, PaymentGatewayClient,
};
use common::{epay_config, mount_token_endpoint, token_body, TEST_TERMINAL_ID};
use secrecy::{ExposeSecret, Secret};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn invoice() -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        amount: 2550,
        currency: "KZT".to_string(),
        name: "Aigerim".to_string(),
        cryptogram: "Y2lwaGVydGV4dA==".to_string(),
        invoice_id: "000000000001".to_string(),
        description: "Payment for order #1".to_string(),
        email: "aigerim@example.com".to_string(),
        card_save: false,
        post_link: "https://shop.example.com/epay/callback".to_string(),
    }
}

async fn calls_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

fn bearer(token: &str) -> Secret<String> {
    Secret::new(token.to_string())
}

#[tokio::test]
async fn construction_fetches_initial_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("client_credentials"))
        .and(body_string_contains("test-login"))
        .and(body_string_contains("test-password"))
        .and(body_string_contains("webapi usermanagement email_send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", "7200")))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();

    let token = client.current_token();
    assert_eq!(token.access_token.expose_secret(), "tok-1");
    assert_eq!(token.expires_in_secs(), 7200);
}

#[tokio::test]
async fn construction_fails_when_token_request_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = PaymentGatewayClient::new(epay_config(&server)).await;

    match result {
        Err(GatewayError::Gateway { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("construction should fail"),
    }
}

#[tokio::test]
async fn token_401_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = PaymentGatewayClient::new(epay_config(&server)).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized)));
}

#[tokio::test]
async fn scoped_token_carries_invoice_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("invoiceID"))
        .and(body_string_contains("000000000042"))
        .and(body_string_contains(TEST_TERMINAL_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("scoped", "1200")))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token_endpoint(&server, "tok-1").await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let context = InvoiceContext {
        amount: 2550,
        currency: "KZT".to_string(),
        invoice_id: "000000000042".to_string(),
    };

    let token = client.request_token(Some(&context)).await.unwrap();

    assert_eq!(token.access_token.expose_secret(), "scoped");
    assert_eq!(client.current_token().access_token.expose_secret(), "tok-1");
}

#[tokio::test]
async fn invoice_is_posted_as_json_with_bearer() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .and(header("authorization", "Bearer scoped"))
        .and(body_partial_json(json!({
            "amount": 2550,
            "currency": "KZT",
            "invoiceId": "000000000001",
            "cardSave": false,
            "postLink": "https://shop.example.com/epay/callback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let response = client.create_invoice(&bearer("scoped"), &invoice()).await.unwrap();

    assert!(response.success);
}

#[tokio::test]
async fn single_401_refreshes_once_and_retries_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", "7200")))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_token_endpoint(&server, "tok-2").await;

    Mock::given(method("POST"))
        .and(path("/invoice"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let response = client.create_invoice(&bearer("stale"), &invoice()).await.unwrap();

    assert!(response.success);
    assert_eq!(calls_to(&server, "/oauth2/token").await, 2);
    assert_eq!(calls_to(&server, "/invoice").await, 2);
    assert_eq!(client.current_token().access_token.expose_secret(), "tok-2");
}

#[tokio::test]
async fn second_401_is_unauthorized() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let result = client.create_invoice(&bearer("tok-1"), &invoice()).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized)));
    assert_eq!(calls_to(&server, "/oauth2/token").await, 2);
    assert_eq!(calls_to(&server, "/invoice").await, 2);
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let result = client.create_invoice(&bearer("tok-1"), &invoice()).await;

    assert!(matches!(
        result,
        Err(GatewayError::Gateway { status: 500, .. })
    ));
    assert_eq!(calls_to(&server, "/oauth2/token").await, 1);
}

#[tokio::test]
async fn non_200_success_status_is_a_failure() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let result = client.create_invoice(&bearer("tok-1"), &invoice()).await;

    assert!(matches!(
        result,
        Err(GatewayError::Gateway { status: 201, .. })
    ));
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let result = client.create_invoice(&bearer("tok-1"), &invoice()).await;

    assert!(matches!(result, Err(GatewayError::Decode(_))));
}

#[tokio::test]
async fn success_false_on_200_is_treated_as_success() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "error": "soft decline" })),
        )
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let response = client.create_invoice(&bearer("tok-1"), &invoice()).await.unwrap();

    assert!(response.success);
    assert_eq!(response.error.as_deref(), Some("soft decline"));
}

#[tokio::test]
async fn force_refresh_replaces_shared_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", "7200")))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_token_endpoint(&server, "tok-2").await;

    let client = PaymentGatewayClient::new(epay_config(&server)).await.unwrap();
    let before = client.current_token();

    let after = client.force_refresh().await.unwrap();

    assert_eq!(before.access_token.expose_secret(), "tok-1");
    assert_eq!(after.access_token.expose_secret(), "tok-2");
    assert_eq!(client.current_token().access_token.expose_secret(), "tok-2");
}
