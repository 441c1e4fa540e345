//! Terminal front end for a single tutoring session.
//!
//! Reads learner replies from stdin and prints the tutor's captions as they
//! are paced out. Lines starting with `:` are session commands.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tutor_core::config::{ReviewStrategy, TargetOverrides};
use tutor_core::dialogue::{DialogueClient, OpenAiDialogueService, PromptSet};
use tutor_core::narration::PlaybackChain;
use tutor_core::supply::{AssessmentGenerator, InMemoryAssessmentStore};
use tutor_core::{Lesson, PhaseController, SessionConfig, SessionDeps, SessionEvent, SessionInput};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Lesson document (JSON).
    #[arg(short, long)]
    lesson: PathBuf,

    /// Learner identity used for the assessment cache key.
    #[arg(long, default_value = "local")]
    learner: String,

    /// Directory of `*.md` prompt overrides.
    #[arg(long, env = "PROMPTS_PATH")]
    prompts: Option<PathBuf>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// `per_item` or `single_call`.
    #[arg(long, env = "REVIEW_STRATEGY", default_value = "per_item")]
    review_strategy: ReviewStrategy,

    #[arg(long)]
    worksheet_length: Option<usize>,

    #[arg(long)]
    test_length: Option<usize>,

    /// Seeds deck shuffles and cue picks for a reproducible session.
    #[arg(long)]
    seed: Option<u64>,
}

/// What a line typed at the prompt means.
#[derive(Debug, PartialEq)]
enum Command {
    Input(SessionInput),
    Quit,
    Help,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Some(Command::Input(SessionInput::Reply(line.to_string())));
    };
    let command = match command.trim().to_ascii_lowercase().as_str() {
        "begin" | "b" => Command::Input(SessionInput::Begin),
        "skip" | "next" => Command::Input(SessionInput::Skip),
        "back" => Command::Input(SessionInput::Back),
        "pause" => Command::Input(SessionInput::Pause),
        "resume" => Command::Input(SessionInput::Resume),
        "refresh" => Command::Input(SessionInput::RefreshAssessments),
        "quit" | "q" | "exit" => Command::Quit,
        "help" | "?" => Command::Help,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

const HELP: &str = "Type your answer and press enter. Commands: \
:begin :skip :back :pause :resume :refresh :quit";

fn load_prompts(dir: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            prompts.insert(key, std::fs::read_to_string(&path)?);
        }
    }
    Ok(prompts)
}

/// Renders an event for the terminal, or `None` for events it doesn't show.
fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::PhaseChanged {
            phase,
            sub_phase,
            ticker,
        } => Some(format!(
            "--- {} ({}) [{}/{}] ---",
            phase, sub_phase, ticker.correct, ticker.asked
        )),
        SessionEvent::Caption { text, .. } => Some(format!("tutor> {}", text)),
        SessionEvent::AwaitingLearner => Some("you>".to_string()),
        SessionEvent::Score(score) => Some(format!(
            "Score: {} out of {} ({}%)",
            score.correct, score.total, score.percent
        )),
        SessionEvent::Notice(message) => Some(format!("[{}]", message)),
        SessionEvent::Unavailable(message) => Some(format!("[!] {}", message)),
        SessionEvent::Finished => Some("Session complete.".to_string()),
        SessionEvent::Transcript(_) | SessionEvent::SoundBlocked | SessionEvent::Media(_) => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,tutor_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let text = tokio::fs::read_to_string(&args.lesson)
        .await
        .with_context(|| format!("Could not read {}", args.lesson.display()))?;
    let lesson = Arc::new(Lesson::from_json(&text)?);
    info!(lesson_id = %lesson.id, title = %lesson.title, "Lesson loaded");

    let prompts = match &args.prompts {
        Some(dir) => match load_prompts(dir) {
            Ok(map) => PromptSet::from_map(&map),
            Err(e) => {
                warn!(error = %e, "Could not read prompts directory. Using built-in prompts.");
                PromptSet::default()
            }
        },
        None => PromptSet::default(),
    };

    let overrides = TargetOverrides {
        worksheet_length: args.worksheet_length,
        test_length: args.test_length,
        ..TargetOverrides::default()
    };
    let config = Arc::new(
        SessionConfig {
            review_strategy: args.review_strategy,
            ..SessionConfig::default()
        }
        .with_overrides(&overrides),
    );

    let openai_config = OpenAIConfig::new()
        .with_api_key(&args.api_key)
        .with_api_base(&args.api_base);
    let service = Arc::new(OpenAiDialogueService::new(openai_config, args.model.clone()));
    let deps = SessionDeps {
        dialogue: DialogueClient::new(service, config.retry, config.dialogue_timeout),
        assessments: AssessmentGenerator::new(Arc::new(InMemoryAssessmentStore::new()), config.quotas),
        prompts: Arc::new(prompts),
        playback: PlaybackChain::silent(),
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = PhaseController::new(config, lesson.clone(), args.learner, deps, events_tx);
    if let Some(seed) = args.seed {
        controller = controller.with_rng(StdRng::seed_from_u64(seed));
    }
    let handle = controller.spawn();

    println!("{}", lesson.title);
    println!("{}", HELP);

    let mut printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(line) = render(&event) {
                println!("{}", line);
            }
            if event == SessionEvent::Finished {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut printer => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Some(Command::Input(input)) => handle.send(input).await?,
                    Some(Command::Quit) => break,
                    Some(Command::Help) => println!("{}", HELP),
                    Some(Command::Unknown(other)) => println!("Unknown command ':{}'. {}", other, HELP),
                    None => {}
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
