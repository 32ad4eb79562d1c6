//! Main Entrypoint for the Interviewer API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the interview prompt template.
//! 3. Wiring the Gemini Live connector and the document store.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use gemini_realtime::{GeminiConfig, GeminiConnector};
use interviewer_api::{
    config::Config,
    interview::{DocumentStore, TemplatePreparer},
    router::create_router,
    state::AppState,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down."),
    }
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts from {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let mut prompts = load_prompts(&config.prompts_path)?;
    let template = prompts
        .remove(TemplatePreparer::TEMPLATE_NAME)
        .context("agent_prompt.md not found in prompts directory")?;
    let preparer = TemplatePreparer::new(
        template,
        config.interview_role.clone(),
        config.interview_minutes,
    );

    let gemini = GeminiConfig::new(config.gemini_api_key.clone())
        .with_model(config.gemini_model.clone())
        .with_voice(config.gemini_voice.clone());

    for dir in ["resume", "jd"] {
        let path = config.upload_dir.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create upload directory {}", path.display()))?;
    }

    let app_state = Arc::new(AppState {
        documents: Arc::new(DocumentStore::new(config.upload_dir.clone())),
        connector: Arc::new(GeminiConnector::new(gemini)),
        preparer: Arc::new(preparer),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        model = %config.gemini_model,
        voice = %config.gemini_voice,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
