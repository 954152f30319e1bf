//! Dynamic client registration tests against a mock authorization
//! server.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use smcp_auth::{DcrBootstrapper, DcrError, KeySourceClient};

const INITIAL_TOKEN: &str = "initial-access-token";

struct MockAuthServer {
    base_url: String,
    registrations: Arc<AtomicUsize>,
}

impl MockAuthServer {
    fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

async fn spawn_auth_server() -> MockAuthServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{addr}");
    let registrations = Arc::new(AtomicUsize::new(0));

    let discovery_base = base_url.clone();
    let counter = registrations.clone();
    let register_base = base_url.clone();
    let app = Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(move || {
                let base = discovery_base.clone();
                async move {
                    Json(serde_json::json!({
                        "issuer": base,
                        "jwks_uri": format!("{base}/certs"),
                        "registration_endpoint": format!("{base}/clients-registrations"),
                    }))
                }
            }),
        )
        .route(
            "/clients-registrations",
            post(move |headers: HeaderMap, Json(metadata): Json<serde_json::Value>| {
                let counter = counter.clone();
                let base = register_base.clone();
                async move {
                    let authorized = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        == Some(&format!("Bearer {INITIAL_TOKEN}"));
                    if !authorized {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({ "error": "invalid_token" })),
                        );
                    }

                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    (
                        StatusCode::CREATED,
                        Json(serde_json::json!({
                            "client_id": format!("generated-client-{n}"),
                            "client_secret": "s3cret-value",
                            "registration_access_token": "rat-value",
                            "registration_client_uri":
                                format!("{base}/clients-registrations/generated-client-{n}"),
                            "client_name": metadata["client_name"],
                        })),
                    )
                }
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server runs");
    });

    MockAuthServer {
        base_url,
        registrations,
    }
}

fn bootstrapper(issuer: &str, record_path: PathBuf) -> DcrBootstrapper {
    let source = Arc::new(
        KeySourceClient::new(
            issuer,
            Duration::from_secs(2),
            Duration::from_secs(300),
            Duration::from_secs(300),
        )
        .expect("client builds"),
    );
    DcrBootstrapper::new(
        source,
        "smcp-server",
        "https://mcp.test",
        record_path,
        Duration::from_secs(2),
    )
    .expect("bootstrapper builds")
}

#[tokio::test]
async fn registration_persists_the_client_record() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let record_path = dir.path().join("dcr_client.json");
    let dcr = bootstrapper(&server.base_url, record_path.clone());

    let client = dcr
        .bootstrap(Some(INITIAL_TOKEN))
        .await
        .expect("registration succeeds");

    assert_eq!(client.client_id, "generated-client-1");
    assert_eq!(client.client_secret.as_deref(), Some("s3cret-value"));
    assert!(record_path.exists());
    assert_eq!(server.registrations(), 1);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&record_path)
            .expect("record metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn persisted_record_is_reused_without_reregistering() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let record_path = dir.path().join("dcr_client.json");

    let dcr = bootstrapper(&server.base_url, record_path.clone());
    dcr.bootstrap(Some(INITIAL_TOKEN)).await.expect("registers");
    assert_eq!(server.registrations(), 1);

    // A second bootstrap, with or without a token, loads the record.
    let dcr = bootstrapper(&server.base_url, record_path);
    let client = dcr.bootstrap(None).await.expect("reuses record");
    assert_eq!(client.client_id, "generated-client-1");
    assert_eq!(server.registrations(), 1);
}

#[tokio::test]
async fn malformed_record_triggers_reregistration() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let record_path = dir.path().join("dcr_client.json");
    std::fs::write(&record_path, b"{ this is not json").expect("write garbage");

    let dcr = bootstrapper(&server.base_url, record_path);
    let client = dcr
        .bootstrap(Some(INITIAL_TOKEN))
        .await
        .expect("re-registers");

    assert_eq!(client.client_id, "generated-client-1");
    assert_eq!(server.registrations(), 1);
}

#[tokio::test]
async fn no_record_and_no_token_is_fatal() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dcr = bootstrapper(&server.base_url, dir.path().join("dcr_client.json"));

    let result = dcr.bootstrap(None).await;
    assert!(matches!(result, Err(DcrError::NoClientIdentity)));
    assert_eq!(server.registrations(), 0);
}

#[tokio::test]
async fn blank_initial_token_is_treated_as_absent() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dcr = bootstrapper(&server.base_url, dir.path().join("dcr_client.json"));

    let result = dcr.bootstrap(Some("   ")).await;
    assert!(matches!(result, Err(DcrError::NoClientIdentity)));
}

#[tokio::test]
async fn rejected_registration_surfaces_the_status() {
    let server = spawn_auth_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dcr = bootstrapper(&server.base_url, dir.path().join("dcr_client.json"));

    let result = dcr.bootstrap(Some("wrong-token")).await;
    match result {
        Err(DcrError::Rejected(status)) => {
            assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED)
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!dir.path().join("dcr_client.json").exists());
}
