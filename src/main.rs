use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use violeta_api::api;
use violeta_api::auth::AuthService;
use violeta_api::config::Config;
use violeta_api::files::FileStore;
use violeta_api::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    let store = Arc::new(
        Store::new(&config.database_path).expect("Failed to initialize database"),
    );
    let auth_service = Arc::new(AuthService::new(config.jwt_secret.clone()));
    let file_store = Arc::new(FileStore::new(&config));

    log::info!("Database: {}", config.database_path);
    log::info!("Starting violeta-api server on port {}", config.port);

    let port = config.port;
    HttpServer::new(move || {
        // Credentials must be allowed for the refresh cookie, so the CORS
        // origin is pinned to the frontend rather than wildcarded.
        let cors = Cors::default()
            .allowed_origin(&config.frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(file_store.clone()))
            .app_data(web::Data::new(config.clone()))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
