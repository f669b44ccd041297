use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

mod accounts;
mod auth;
mod cart;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod payloads;
mod rentals;
mod roles;
mod state;
mod store;

use config::{Config, StoreKind};
use state::AppState;
use store::{MemoryStore, MongoStore, Store};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Mongo => {
            let db = db::connect(&config)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            Arc::new(MongoStore::new(&db))
        }
        StoreKind::Memory => {
            log::warn!("Using in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let tokens = auth::TokenService::new(config.jwt_secret.clone(), config.jwt_ttl_hours);
    let state = AppState::new(store, tokens.clone(), config.base_url.clone());

    let address = config.bind_address();
    log::info!("Server running at http://{}", address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(handlers::json_config())
            .app_data(handlers::query_config())
            .wrap(middleware::AuthMiddleware::new(tokens.clone()))
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(address)?
    .run()
    .await
}
