// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::info;
use std::sync::Arc;

mod config;
mod cost;
mod errors;
mod handlers;
mod layout;
mod models;
mod services;
mod session;
mod studio;

use crate::config::AppConfig;
use crate::cost::PricingTable;
use crate::services::{DesignStore, ImageProcessor, RedisDesignStore};
use crate::session::{SessionManager, SessionSettings};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    sessions: Arc<SessionManager>,
    designs: Arc<dyn DesignStore>,
    image_processor: Arc<ImageProcessor>,
    pricing: Arc<PricingTable>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Artboard service...");

    let config = AppConfig::from_env();
    if config.default_api_key.is_none() {
        info!("GEMINI_API_KEY not set, every login must bring its own key");
    }

    let designs = RedisDesignStore::new(&config.redis_url)
        .await
        .with_context(|| format!("connecting to Redis at {}", config.redis_url))?;
    let sessions = SessionManager::new(
        config.session_idle_timeout,
        SessionSettings {
            history_limit: config.history_limit,
            mask_width: config.mask_width,
        },
    );

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        config: Arc::new(config),
        sessions: Arc::new(sessions),
        designs: Arc::new(designs),
        image_processor: Arc::new(ImageProcessor::new()),
        pricing: Arc::new(PricingTable::default()),
    };

    info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
            .route("/health", web::get().to(health_check))
    })
    .bind(&bind_addr)
    .with_context(|| format!("binding {}", bind_addr))?
    .run()
    .await?;
    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "artboard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
