mod app;
mod catalog;
mod chat;
mod config;
mod gemini;
mod render;

use iced::{window, Size};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::catalog::{Ordering, TopicCatalog};
use crate::chat::ChatBridge;
use crate::gemini::{ChatInitError, GeminiClient};

fn init_logging() {
    // CIVIC_EDU_DEBUG turns on debug output without a full RUST_LOG directive.
    let default = if std::env::var("CIVIC_EDU_DEBUG").is_ok() {
        "debug,wgpu=warn,naga=warn,cosmic_text=warn"
    } else {
        "info,wgpu=warn,naga=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn connect_chat(config: &config::ChatConfig) -> ChatBridge {
    match GeminiClient::from_env(config) {
        Ok(client) => {
            tracing::info!("Successfully configured Gemini model: {}", client.get_model());
            ChatBridge::ready(Arc::new(client))
        }
        Err(e @ ChatInitError::CredentialMissing { .. }) if config.required => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::warn!("Chat disabled: {}", e);
            ChatBridge::unavailable()
        }
    }
}

fn main() -> iced::Result {
    // A missing .env is fine; the key may come from the real environment.
    dotenvy::dotenv().ok();
    init_logging();

    let config = config::Config::load();

    let ordering = if config.content.sort_topics {
        Ordering::Alphabetical
    } else {
        Ordering::Insertion
    };

    let catalog = match TopicCatalog::load_or_fallback(&config.content.path, ordering, config.content.strict) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let bridge = connect_chat(&config.chat);

    iced::application(app::TITLE, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(Size::new(config.window.min_width as f32, config.window.min_height as f32)),
            position: window::Position::Centered,
            ..Default::default()
        })
        .run_with(move || App::new(catalog, bridge))
}
