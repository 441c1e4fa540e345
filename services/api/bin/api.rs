//! Main Entrypoint for the Tutoring API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing the assessment store (PostgreSQL when configured, in-memory otherwise).
//! 3. Initializing shared services (dialogue, speech, lessons, prompts).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tutor_api::{config::Config, db::PgAssessmentStore, router::create_router, state::AppState};
use tutor_core::{
    dialogue::{DialogueService, OpenAiDialogueService, PromptSet},
    lesson::DirectoryLessonSource,
    speech::{OpenAiSpeechSynthesizer, SpeechSynthesizer},
    supply::{AssessmentStore, InMemoryAssessmentStore},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
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

    // --- 3. Initialize Assessment Store ---
    let store: Arc<dyn AssessmentStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let store = PgAssessmentStore::new(pool);
            store.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set. Assessment sets will not survive a restart.");
            Arc::new(InMemoryAssessmentStore::new())
        }
    };

    // --- 4. Initialize Shared Services ---
    let prompts = match load_prompts(&config.prompts_path) {
        Ok(map) => PromptSet::from_map(&map),
        Err(e) => {
            warn!(
                path = %config.prompts_path.display(),
                error = %e,
                "Could not read prompts directory. Using built-in prompts."
            );
            PromptSet::default()
        }
    };

    let api_key = config
        .api_key()
        .context("No API key configured for the selected provider")?;
    info!(provider = ?config.provider, "Configuring dialogue provider.");
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());

    let dialogue: Arc<dyn DialogueService> = Arc::new(OpenAiDialogueService::new(
        openai_config.clone(),
        config.chat_model.clone(),
    ));
    let speech: Option<Arc<dyn SpeechSynthesizer>> = if config.speech_enabled {
        Some(Arc::new(OpenAiSpeechSynthesizer::new(
            openai_config,
            config.speech_model.clone(),
            &config.speech_voice,
        )))
    } else {
        info!("Speech disabled. Sessions will run caption-only.");
        None
    };

    let app_state = Arc::new(AppState {
        lessons: Arc::new(DirectoryLessonSource::new(config.lessons_path.clone())),
        store,
        dialogue,
        speech,
        prompts: Arc::new(prompts),
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        review_strategy = ?config.review_strategy,
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
