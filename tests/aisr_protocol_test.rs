//! AISR wire protocol tests against a mock HTTP server
//!
//! Covers the Keycloak login flow, the signed-URL upload, result listing and
//! result download, and how HTTP failures map onto registry errors.

use immunization_etl::adapters::aisr::{
    AisrClient, Authenticator, KeycloakAuthenticator, QueryResult, RegistryClient, Session,
};
use immunization_etl::adapters::aisr::InMemoryRegistry;
use immunization_etl::config::{ApiConfig, AppConfig, PathsConfig, RetryConfig};
use immunization_etl::core::extract::RegistryExtractor;
use immunization_etl::core::manifest::{EntityStatus, RunStatus};
use immunization_etl::core::workflow::OrchestratorBuilder;
use immunization_etl::domain::{
    Credentials, EntityConfig, EntityId, ErrorKind, RegistryError, UploadStep,
};
use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

const REALM: &str = "/auth/realms/idepc-aisr-realm";

fn api_config(server: &Server) -> ApiConfig {
    ApiConfig {
        auth_base_url: server.url(),
        aisr_api_base_url: server.url(),
        retry: RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
        },
        ..Default::default()
    }
}

fn entity(query_file: &std::path::Path) -> EntityConfig {
    EntityConfig::new(EntityId::new("2542").unwrap(), "Friendly Hills Mid", query_file)
}

fn session() -> Session {
    Session::new("test-token", Utc::now() + Duration::minutes(5))
}

fn login_page() -> String {
    format!(
        r#"<html><body>
        <form id="kc-form-login" action="{REALM}/login-actions/authenticate?session_code=mock-session-code&amp;execution=x&amp;client_id=aisr-app&amp;tab_id=mock-tab-id" method="post">
        <input name="username"/><input name="password" type="password"/>
        </form></body></html>"#
    )
}

#[tokio::test]
async fn test_keycloak_login_flow() {
    let mut server = Server::new_async().await;

    let form = server
        .mock("GET", format!("{REALM}/protocol/openid-connect/auth").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "aisr-app".into()),
            Matcher::UrlEncoded("response_type".into(), "code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(login_page())
        .create_async()
        .await;
    let authenticate = server
        .mock("POST", format!("{REALM}/login-actions/authenticate").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("session_code".into(), "mock-session-code".into()),
            Matcher::UrlEncoded("tab_id".into(), "mock-tab-id".into()),
        ]))
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("username".into(), "nurse".into()),
            Matcher::UrlEncoded("password".into(), "pw".into()),
        ]))
        .with_status(302)
        .with_header("set-cookie", "KEYCLOAK_IDENTITY=identity; Path=/")
        .with_header(
            "location",
            "https://aisr.web.health.state.mn.us/home#state=s&session_state=x&code=the-code",
        )
        .create_async()
        .await;
    let token = server
        .mock("POST", format!("{REALM}/protocol/openid-connect/token").as_str())
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "the-code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"access-123","expires_in":300,"token_type":"Bearer"}"#)
        .create_async()
        .await;

    let authenticator = KeycloakAuthenticator::new(api_config(&server)).unwrap();
    let session = authenticator
        .login(&Credentials::new("nurse", "pw"))
        .await
        .unwrap();

    assert_eq!(session.token(), "access-123");
    assert!(session.expires_at() > Utc::now() + Duration::seconds(250));
    form.assert_async().await;
    authenticate.assert_async().await;
    token.assert_async().await;
}

#[tokio::test]
async fn test_rejected_credentials() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{REALM}/protocol/openid-connect/auth").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(login_page())
        .create_async()
        .await;
    // Keycloak re-renders the form instead of redirecting
    server
        .mock("POST", format!("{REALM}/login-actions/authenticate").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("Invalid username or password.")
        .create_async()
        .await;

    let authenticator = KeycloakAuthenticator::new(api_config(&server)).unwrap();
    let err = authenticator
        .login(&Credentials::new("nurse", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_login_page_outage_is_retried() {
    let mut server = Server::new_async().await;
    let form = server
        .mock("GET", format!("{REALM}/protocol/openid-connect/auth").as_str())
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let authenticator = KeycloakAuthenticator::new(api_config(&server)).unwrap();
    let err = authenticator
        .login(&Credentials::new("nurse", "pw"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    form.assert_async().await;
}

#[tokio::test]
async fn test_logout_sends_bearer() {
    let mut server = Server::new_async().await;
    let logout = server
        .mock("GET", format!("{REALM}/protocol/openid-connect/logout").as_str())
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer test-token")
        .with_status(204)
        .create_async()
        .await;

    let authenticator = KeycloakAuthenticator::new(api_config(&server)).unwrap();
    authenticator.logout(&session()).await;
    logout.assert_async().await;
}

#[tokio::test]
async fn test_submit_bulk_query_two_steps() {
    let mut server = Server::new_async().await;
    let mut query_file = NamedTempFile::new().unwrap();
    write!(query_file, "student_id,last_name\n1001,Doe\n").unwrap();

    let signed = server
        .mock("POST", "/signing/puturl")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "contentType": "text/csv",
            "schoolId": "2542"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"url":"{}/upload/signed-abc"}}"#, server.url()))
        .create_async()
        .await;
    let transfer = server
        .mock("PUT", "/upload/signed-abc")
        .match_header("x-amz-meta-school_id", "2542")
        .match_header("x-amz-meta-classification", "N")
        .match_header("x-amz-meta-iddis", "0197")
        .match_header("content-type", "text/csv")
        .match_body("student_id,last_name\n1001,Doe\n")
        .with_status(200)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let confirmation = client
        .submit_bulk_query(&session(), &entity(query_file.path()), query_file.path())
        .await
        .unwrap();

    assert_eq!(confirmation.entity_id, "2542");
    assert_eq!(confirmation.bytes_sent, 30);
    signed.assert_async().await;
    transfer.assert_async().await;
}

#[tokio::test]
async fn test_signed_url_failure_carries_step() {
    let mut server = Server::new_async().await;
    let mut query_file = NamedTempFile::new().unwrap();
    write!(query_file, "student_id\n1\n").unwrap();

    let signed = server
        .mock("POST", "/signing/puturl")
        .with_status(500)
        .with_body("internal error")
        .expect(2)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let err = client
        .submit_bulk_query(&session(), &entity(query_file.path()), query_file.path())
        .await
        .unwrap_err();

    assert_eq!(err.upload_step(), Some(UploadStep::SignedUrl));
    assert!(err.is_transient());
    signed.assert_async().await;
}

#[tokio::test]
async fn test_transfer_rejection_is_not_retried() {
    let mut server = Server::new_async().await;
    let mut query_file = NamedTempFile::new().unwrap();
    write!(query_file, "student_id\n1\n").unwrap();

    server
        .mock("POST", "/signing/puturl")
        .with_status(200)
        .with_body(format!(r#"{{"url":"{}/upload/signed-abc"}}"#, server.url()))
        .create_async()
        .await;
    let transfer = server
        .mock("PUT", "/upload/signed-abc")
        .with_status(400)
        .with_body("bad request")
        .expect(1)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let err = client
        .submit_bulk_query(&session(), &entity(query_file.path()), query_file.path())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::UploadRejected {
            step: UploadStep::Transfer,
            ..
        }
    ));
    transfer.assert_async().await;
}

#[tokio::test]
async fn test_fetch_result_list_sorts_and_skips_pending() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/school/query/2542")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": 2, "schoolId": 2542, "uploadDateTime": 1740764967763,
                 "fullVaccineFileUrl": "http://files/2.txt"},
                {"id": 3, "schoolId": 2542, "uploadDateTime": 1740768567763,
                 "fullVaccineFileUrl": null},
                {"id": 1, "schoolId": 2542, "uploadDateTime": 1740678567763,
                 "fullVaccineFileUrl": "http://files/1.txt"}
            ]"#,
        )
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let results = client
        .fetch_result_list(&session(), &entity(std::path::Path::new("q.csv")))
        .await
        .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    list.assert_async().await;
}

#[tokio::test]
async fn test_fetch_result_list_not_found_is_empty() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/school/query/2542")
        .with_status(404)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let results = client
        .fetch_result_list(&session(), &entity(std::path::Path::new("q.csv")))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_unauthorized_asks_for_new_session() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/school/query/2542")
        .with_status(401)
        .with_body("token expired")
        .expect(1)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let err = client
        .fetch_result_list(&session(), &entity(std::path::Path::new("q.csv")))
        .await
        .unwrap_err();

    assert!(err.is_auth_expired());
    list.assert_async().await;
}

#[tokio::test]
async fn test_malformed_result_list() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/school/query/2542")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let err = client
        .fetch_result_list(&session(), &entity(std::path::Path::new("q.csv")))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_download_result_content() {
    let mut server = Server::new_async().await;
    let body = "1001|55501|Jane Doe|03/04/2012|MMR|05/01/2023\n";
    let file = server
        .mock("GET", "/files/2542.txt")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let result = QueryResult::new("18928", format!("{}/files/2542.txt", server.url()));
    let bytes = client
        .download_result(&session(), &entity(std::path::Path::new("q.csv")), &result)
        .await
        .unwrap();

    assert_eq!(bytes, body.as_bytes());
    file.assert_async().await;
}

#[tokio::test]
async fn test_denied_vaccine_file_is_not_a_session_error() {
    let mut server = Server::new_async().await;
    let file = server
        .mock("GET", "/files/2542.txt")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("content-type", "application/xml")
        .with_body("<Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>")
        .expect(1)
        .create_async()
        .await;

    let client = AisrClient::new(api_config(&server)).unwrap();
    let result = QueryResult::new(
        "18928",
        format!("{}/files/2542.txt?X-Amz-Expires=60", server.url()),
    );
    let err = client
        .download_result(&session(), &entity(std::path::Path::new("q.csv")), &result)
        .await
        .unwrap_err();

    assert!(!err.is_auth_expired());
    assert!(matches!(err, RegistryError::MalformedResponse(_)));
    file.assert_async().await;
}

#[tokio::test]
async fn test_denied_vaccine_file_fails_only_its_school() {
    let mut server = Server::new_async().await;
    let extract = "1001|55501|Jane Doe|03/04/2012|MMR|05/01/2023\n";

    for id in ["1", "2", "3"] {
        server
            .mock("GET", format!("/school/query/{id}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"[{{"id": {id}, "schoolId": {id}, "uploadDateTime": 1740764967763,
                    "fullVaccineFileUrl": "{}/files/{id}.txt"}}]"#,
                server.url()
            ))
            .create_async()
            .await;
    }
    server
        .mock("GET", "/files/1.txt")
        .with_status(200)
        .with_body(extract)
        .create_async()
        .await;
    server
        .mock("GET", "/files/2.txt")
        .with_status(403)
        .with_body("<Error><Code>AccessDenied</Code></Error>")
        .create_async()
        .await;
    server
        .mock("GET", "/files/3.txt")
        .with_status(200)
        .with_body(extract)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let schools = ["1", "2", "3"]
        .iter()
        .map(|id| {
            EntityConfig::new(
                EntityId::new(*id).unwrap(),
                format!("School {id}"),
                dir.path().join(format!("{id}.csv")),
            )
        })
        .collect();
    let mut config = AppConfig::new(
        PathsConfig::new(dir.path().join("output"), dir.path().join("logs")),
        schools,
    );
    config.api = api_config(&server);

    // Logins are served in memory; every registry call goes over HTTP
    let registry = Arc::new(InMemoryRegistry::new());
    let client = Arc::new(AisrClient::new(config.api.clone()).unwrap());
    let manifest = OrchestratorBuilder::new(config)
        .credentials(Credentials::new("nurse", "pw"))
        .authenticator(registry.clone())
        .extractor(Arc::new(RegistryExtractor::new(client)))
        .build()
        .unwrap()
        .run_download()
        .await
        .unwrap();

    assert_eq!(manifest.status, RunStatus::Partial);
    assert_eq!(manifest.exit_code(), 1);
    assert_eq!(manifest.entities[0].status, EntityStatus::Done);
    assert_eq!(manifest.entities[1].status, EntityStatus::Failed);
    assert_eq!(
        manifest.entities[1].error.as_ref().unwrap().kind,
        ErrorKind::MalformedResponse
    );
    assert_eq!(manifest.entities[2].status, EntityStatus::Done);
    assert!(manifest.fatal_error.is_none());
    assert_eq!(manifest.outputs.len(), 2);
    assert_eq!(registry.login_count(), 1);
}
