use std::sync::Arc;

use violeta_api::auth::AuthService;
use violeta_api::config::Config;
use violeta_api::files::FileStore;
use violeta_api::store::Store;

/// Shared state for a test app: in-memory store, throwaway upload dir.
pub struct TestParts {
    pub store: Arc<Store>,
    pub auth: Arc<AuthService>,
    pub files: Arc<FileStore>,
    pub config: Config,
}

pub fn test_parts() -> TestParts {
    let upload_dir = std::env::temp_dir().join(format!("violeta-test-{}", uuid::Uuid::new_v4()));
    let config = Config::for_tests(upload_dir);
    let store = Arc::new(Store::in_memory().unwrap());
    let auth = Arc::new(AuthService::new(config.jwt_secret.clone()));
    let files = Arc::new(FileStore::new(&config));
    TestParts {
        store,
        auth,
        files,
        config,
    }
}

/// Builds the actix test app with the same data registrations as `main`.
#[macro_export]
macro_rules! test_app {
    ($parts:expr) => {{
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($parts.store.clone()))
                .app_data(actix_web::web::Data::new($parts.auth.clone()))
                .app_data(actix_web::web::Data::new($parts.files.clone()))
                .app_data(actix_web::web::Data::new($parts.config.clone()))
                .configure(violeta_api::api::configure_routes),
        )
        .await
    }};
}

/// Registers a user and logs in, yielding `(user_id, access_token)`.
#[macro_export]
macro_rules! register_and_login {
    ($app:expr, $name:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({
                "name": $name,
                "email": format!("{}@example.com", $name),
                "password": "secret123"
            }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201, "registration failed for {}", $name);
        let user: serde_json::Value = actix_web::test::read_body_json(resp).await;

        let req = actix_web::test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(serde_json::json!({
                "email": format!("{}@example.com", $name),
                "password": "secret123"
            }))
            .to_request();
        let login: serde_json::Value =
            actix_web::test::call_and_read_body_json(&$app, req).await;
        (
            user["id"].as_str().unwrap().to_string(),
            login["access_token"].as_str().unwrap().to_string(),
        )
    }};
}

/// Creates a document owned by the token's user, returning the document JSON.
#[macro_export]
macro_rules! create_document {
    ($app:expr, $token:expr, $title:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/documents")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(serde_json::json!({
                "title": $title,
                "content": { "ops": [] }
            }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201, "document create failed");
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body
    }};
}

/// Publishes a minimal PDF and returns the created publication JSON.
#[macro_export]
macro_rules! create_publication {
    ($app:expr, $token:expr, $title:expr) => {{
        use base64::Engine;
        let req = actix_web::test::TestRequest::post()
            .uri("/api/publications")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(serde_json::json!({
                "title": $title,
                "type": "article",
                "abstract": "An abstract",
                "pdf_base64": base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 test"),
            }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201, "publication create failed");
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body
    }};
}
