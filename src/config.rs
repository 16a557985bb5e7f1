use std::env;
use std::path::PathBuf;

/// Process configuration, read once at startup and passed to components
/// through `web::Data` rather than looked up ambiently.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    pub typeset_bin: String,
    pub thumbnail_bin: String,
    pub compile_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .expect("PORT must be a number");

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set, using default (not secure for production!)");
            "dev-secret-change-in-production".to_string()
        });

        Self {
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "violeta.db".to_string()),
            jwt_secret,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads/publications".to_string())
                .into(),
            typeset_bin: env::var("TYPESET_BIN").unwrap_or_else(|_| "tectonic".to_string()),
            thumbnail_bin: env::var("THUMBNAIL_BIN").unwrap_or_else(|_| "pdftoppm".to_string()),
            compile_timeout_secs: env::var("COMPILE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }

    /// Configuration for tests: in-memory database, scratch upload dir.
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            port: 0,
            database_path: ":memory:".to_string(),
            jwt_secret: "test_secret".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            upload_dir,
            typeset_bin: "tectonic".to_string(),
            thumbnail_bin: "pdftoppm".to_string(),
            compile_timeout_secs: 10,
        }
    }
}
