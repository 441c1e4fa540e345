use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tutor_core::config::{ReviewStrategy, RetryPolicy, SessionConfig, SessionTargets};
use tutor_core::dialogue::{
    DialogueClient, DialogueError, DialogueRequest, DialogueResponse, DialogueService, PromptSet,
};
use tutor_core::lesson::{Category, Lesson, QuestionItem};
use tutor_core::narration::{PlaybackChain, Speaker};
use tutor_core::supply::{
    AssessmentGenerator, AssessmentKey, AssessmentStore, InMemoryAssessmentStore, Quotas,
};
use tutor_core::{
    MediaState, Phase, PhaseController, SessionDeps, SessionEvent, SessionHandle, SessionInput, SubPhase,
};

/// Answers every step with a fixed line chosen from the instruction.
struct ScriptedTutor {
    seen: mpsc::UnboundedSender<DialogueRequest>,
    judge_gate: Option<Arc<Notify>>,
}

fn scripted_reply(instruction: &str) -> &'static str {
    if instruction.starts_with("Greet") {
        "Hello there! How has your day been?"
    } else if instruction.starts_with("Reply briefly") {
        "That sounds like a lot of fun."
    } else if instruction.starts_with("Teach") || instruction.starts_with("The learner asked") {
        "Adding puts numbers together. Two plus two makes four. Would you like me to go over that again?"
    } else if instruction.starts_with("Judge") {
        "Correct! Nice work."
    } else if instruction.starts_with("Review test question 1 of") {
        "The question asked for a sum. You answered 4, which matches. You nailed it!"
    } else if instruction.starts_with("Review test question") {
        "The question asked for a sum. You answered 4, but the expected answer was different."
    } else if instruction.starts_with("Review all") {
        "Question 1. You answered 4, which matches. You nailed it! \
         Question 2. You answered 4, but that was not the answer. \
         Question 3. You answered 4, but that was not the answer."
    } else if instruction.contains("Congratulate") {
        "You worked hard today. Goodbye for now."
    } else {
        "Let's try this one. What is 2 + 2?"
    }
}

#[async_trait]
impl DialogueService for ScriptedTutor {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueResponse, DialogueError> {
        let _ = self.seen.send(request.clone());
        if request.instruction.starts_with("Judge") {
            if let Some(gate) = &self.judge_gate {
                gate.notified().await;
            }
        }
        Ok(DialogueResponse {
            text: scripted_reply(&request.instruction).to_string(),
            usage: None,
        })
    }
}

fn addition_lesson() -> Lesson {
    let mut lesson = Lesson::new("addition", "Adding small numbers");
    lesson.revision = "r1".to_string();
    lesson.samples = vec![
        QuestionItem::new("What is 2 + 2?", "4", Category::Sample),
        QuestionItem::new("What is 3 + 1?", "4", Category::Sample),
        QuestionItem::new("What is 1 + 3?", "4", Category::Sample),
    ];
    lesson.word_problems = vec![QuestionItem::new(
        "Sam has 2 apples and finds 2 more. How many apples does Sam have?",
        "4",
        Category::WordProblem,
    )];
    lesson.true_false = vec![
        QuestionItem::new("2 + 2 equals 4.", "true", Category::TrueFalse),
        QuestionItem::new("3 + 3 equals 5.", "false", Category::TrueFalse),
    ];
    lesson
}

struct Harness {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    seen: mpsc::UnboundedReceiver<DialogueRequest>,
    store: Arc<InMemoryAssessmentStore>,
}

fn start_session(strategy: ReviewStrategy, judge_gate: Option<Arc<Notify>>) -> Harness {
    let (seen_tx, seen) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let service = ScriptedTutor {
        seen: seen_tx,
        judge_gate,
    };
    let store = Arc::new(InMemoryAssessmentStore::new());
    let config = SessionConfig {
        targets: SessionTargets {
            comprehension: 1,
            exercise: 1,
            worksheet_length: 2,
            test_length: 3,
        },
        review_strategy: strategy,
        ..SessionConfig::default()
    };
    let deps = SessionDeps {
        dialogue: DialogueClient::new(Arc::new(service), RetryPolicy::default(), Duration::from_secs(25)),
        assessments: AssessmentGenerator::new(store.clone(), Quotas::default()),
        prompts: Arc::new(PromptSet::default()),
        playback: PlaybackChain::silent(),
    };
    let handle = PhaseController::new(Arc::new(config), Arc::new(addition_lesson()), "learner-1", deps, events_tx)
        .with_rng(StdRng::seed_from_u64(11))
        .spawn();
    Harness {
        handle,
        events,
        seen,
        store,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(300), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("controller closed the event channel")
}

struct Outcome {
    phases: Vec<Phase>,
    score: Option<(u32, u32, u32)>,
    notices: Vec<String>,
}

/// Plays a learner who answers "4" to everything until the session finishes.
async fn play_through(harness: &mut Harness) -> Outcome {
    let mut outcome = Outcome {
        phases: Vec::new(),
        score: None,
        notices: Vec::new(),
    };
    let (mut phase, mut sub_phase) = (Phase::Discussion, SubPhase::AwaitingBegin);
    let mut tried_skip_in_test = false;
    harness.handle.send(SessionInput::Begin).await.unwrap();

    loop {
        match next_event(&mut harness.events).await {
            SessionEvent::PhaseChanged {
                phase: p,
                sub_phase: s,
                ..
            } => {
                if outcome.phases.last() != Some(&p) {
                    outcome.phases.push(p);
                }
                phase = p;
                sub_phase = s;
            }
            SessionEvent::AwaitingLearner => {
                let reply = match (phase, sub_phase) {
                    (Phase::Discussion, SubPhase::Start) => "I played football today",
                    (Phase::Discussion, SubPhase::AwaitingGate) => "No, I've got it",
                    (Phase::Test, _) if !tried_skip_in_test => {
                        tried_skip_in_test = true;
                        harness.handle.send(SessionInput::Skip).await.unwrap();
                        "4"
                    }
                    _ => "4",
                };
                harness
                    .handle
                    .send(SessionInput::Reply(reply.to_string()))
                    .await
                    .unwrap();
            }
            SessionEvent::Score(score) => {
                outcome.score = Some((score.correct, score.total, score.percent));
            }
            SessionEvent::Notice(message) => outcome.notices.push(message),
            SessionEvent::Unavailable(message) => panic!("tutor unavailable: {message}"),
            SessionEvent::Finished => break,
            _ => {}
        }
    }
    outcome
}

#[tokio::test(start_paused = true)]
async fn test_full_session_walks_every_phase() {
    let mut harness = start_session(ReviewStrategy::PerItem, None);
    let outcome = play_through(&mut harness).await;

    assert_eq!(outcome.phases, Phase::ORDER.to_vec());
    // first review reply carries a cue, the other two do not
    assert_eq!(outcome.score, Some((1, 3, 33)));
    assert!(outcome.notices.iter().any(|n| n.contains("finish the test")));

    // the guardrail block goes out with the first call of each phase only
    let guardrails = PromptSet::default().guardrails;
    let mut requests = Vec::new();
    while let Ok(request) = harness.seen.try_recv() {
        requests.push(request);
    }
    let discussion: Vec<&DialogueRequest> = requests
        .iter()
        .filter(|r| r.metadata.phase == Phase::Discussion)
        .collect();
    assert!(discussion.len() >= 3);
    assert!(discussion[0].context.contains(&guardrails));
    assert!(!discussion[1].context.contains(&guardrails));

    // test questions are never sent to the dialogue service
    assert!(
        requests
            .iter()
            .filter(|r| r.metadata.phase == Phase::Test)
            .all(|r| r.instruction.starts_with("Review"))
    );

    // the cache entry is dropped once the lesson completes
    let key = AssessmentKey::new("addition", "learner-1", 2, 3);
    assert!(harness.store.get(&key).await.unwrap().is_none());
    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_call_review_scores_one_of_three() {
    let mut harness = start_session(ReviewStrategy::SingleCall, None);
    let outcome = play_through(&mut harness).await;

    assert_eq!(outcome.score, Some((1, 3, 33)));
    let mut review_calls = 0;
    while let Ok(request) = harness.seen.try_recv() {
        if request.instruction.starts_with("Review") {
            review_calls += 1;
        }
    }
    assert_eq!(review_calls, 1);
    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_discards_the_reply_in_flight() {
    let gate = Arc::new(Notify::new());
    let mut harness = start_session(ReviewStrategy::PerItem, Some(gate.clone()));

    // jump straight to comprehension and start it
    harness.handle.send(SessionInput::Skip).await.unwrap();
    harness.handle.send(SessionInput::Begin).await.unwrap();
    loop {
        if let SessionEvent::AwaitingLearner = next_event(&mut harness.events).await {
            break;
        }
    }

    harness
        .handle
        .send(SessionInput::Reply("4".to_string()))
        .await
        .unwrap();
    loop {
        let request = harness.seen.recv().await.unwrap();
        if request.instruction.starts_with("Judge") {
            break;
        }
    }

    harness.handle.send(SessionInput::Skip).await.unwrap();
    loop {
        if let SessionEvent::PhaseChanged {
            phase: Phase::Exercise,
            sub_phase,
            ticker,
        } = next_event(&mut harness.events).await
        {
            assert_eq!(sub_phase, SubPhase::AwaitingBegin);
            assert_eq!(ticker.asked, 0);
            break;
        }
    }

    // the judged reply would have arrived now; nothing from it may surface
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(30)).await;
    while let Ok(event) = harness.events.try_recv() {
        match event {
            SessionEvent::Caption { .. } => panic!("caption from a discarded reply"),
            SessionEvent::Transcript(line) => assert_ne!(line.speaker, Speaker::Tutor),
            SessionEvent::PhaseChanged { phase, sub_phase, .. } => {
                assert_eq!((phase, sub_phase), (Phase::Exercise, SubPhase::AwaitingBegin));
            }
            _ => {}
        }
    }
    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_from_discussion_stays_put() {
    let mut harness = start_session(ReviewStrategy::PerItem, None);
    harness.handle.send(SessionInput::Back).await.unwrap();
    harness.handle.send(SessionInput::Skip).await.unwrap();
    harness.handle.send(SessionInput::Back).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        if let SessionEvent::PhaseChanged { phase, sub_phase, .. } = next_event(&mut harness.events).await {
            seen.push((phase, sub_phase));
        }
    }
    assert_eq!(
        seen,
        vec![
            (Phase::Discussion, SubPhase::AwaitingBegin),
            (Phase::Comprehension, SubPhase::AwaitingBegin),
            (Phase::Discussion, SubPhase::AwaitingBegin),
        ]
    );
    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reply_arriving_while_paused_waits_for_resume() {
    let gate = Arc::new(Notify::new());
    let mut harness = start_session(ReviewStrategy::PerItem, Some(gate.clone()));

    harness.handle.send(SessionInput::Skip).await.unwrap();
    harness.handle.send(SessionInput::Begin).await.unwrap();
    loop {
        if let SessionEvent::AwaitingLearner = next_event(&mut harness.events).await {
            break;
        }
    }
    harness
        .handle
        .send(SessionInput::Reply("4".to_string()))
        .await
        .unwrap();
    loop {
        let request = harness.seen.recv().await.unwrap();
        if request.instruction.starts_with("Judge") {
            break;
        }
    }

    harness.handle.send(SessionInput::Pause).await.unwrap();
    loop {
        if let SessionEvent::Media(media) = next_event(&mut harness.events).await {
            assert!(media.paused);
            break;
        }
    }

    // the verdict lands mid-pause; it is transcribed but not narrated
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let mut verdict_lines = 0;
    while let Ok(event) = harness.events.try_recv() {
        match event {
            SessionEvent::Caption { .. } => panic!("caption shown while paused"),
            SessionEvent::AwaitingLearner => panic!("next question asked while paused"),
            SessionEvent::Transcript(line) if line.speaker == Speaker::Tutor => verdict_lines += 1,
            _ => {}
        }
    }
    assert!(verdict_lines > 0);

    harness.handle.send(SessionInput::Resume).await.unwrap();
    let (mut captions, mut advanced) = (0, false);
    loop {
        match next_event(&mut harness.events).await {
            SessionEvent::Caption { .. } => captions += 1,
            SessionEvent::PhaseChanged { phase, .. } => advanced |= phase == Phase::Exercise,
            SessionEvent::AwaitingLearner => break,
            _ => {}
        }
    }
    assert!(captions > 0);
    assert!(advanced);

    // pausing still takes effect after the held reply played out
    harness.handle.send(SessionInput::Pause).await.unwrap();
    loop {
        if let SessionEvent::Media(media) = next_event(&mut harness.events).await {
            assert_eq!(
                media,
                MediaState {
                    paused: true,
                    muted: false
                }
            );
            break;
        }
    }
    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_is_refused_once_the_test_is_under_way() {
    let mut harness = start_session(ReviewStrategy::PerItem, None);
    for _ in 0..4 {
        harness.handle.send(SessionInput::Skip).await.unwrap();
    }
    harness.handle.send(SessionInput::Begin).await.unwrap();
    let first_question = loop {
        match next_event(&mut harness.events).await {
            SessionEvent::Transcript(line) if line.speaker == Speaker::Tutor => break line.text,
            _ => {}
        }
    };
    assert_eq!(first_question, "Question 1 of 3.");
    loop {
        if let SessionEvent::AwaitingLearner = next_event(&mut harness.events).await {
            break;
        }
    }

    harness
        .handle
        .send(SessionInput::RefreshAssessments)
        .await
        .unwrap();
    loop {
        match next_event(&mut harness.events).await {
            SessionEvent::Notice(message) => {
                assert_eq!(message, "Let's finish the test first.");
                break;
            }
            SessionEvent::PhaseChanged { sub_phase, .. } => {
                assert_ne!(sub_phase, SubPhase::AwaitingBegin, "test was restarted");
            }
            _ => {}
        }
    }

    // the answer still counts toward the same test
    harness
        .handle
        .send(SessionInput::Reply("4".to_string()))
        .await
        .unwrap();
    loop {
        match next_event(&mut harness.events).await {
            SessionEvent::Transcript(line) if line.speaker == Speaker::Tutor => {
                assert_eq!(line.text, "Question 2 of 3.");
                break;
            }
            SessionEvent::PhaseChanged { phase, sub_phase, .. } => {
                assert_eq!((phase, sub_phase), (Phase::Test, SubPhase::Active));
            }
            _ => {}
        }
    }
    harness.handle.shutdown().await;
}

