pub mod config;
pub mod controller;
pub mod dialogue;
pub mod judge;
pub mod lesson;
pub mod narration;
pub mod phase;
pub mod printable;
pub mod review;
pub mod speech;
pub mod supply;
pub mod text;
pub mod verdict;

pub use config::SessionConfig;
pub use controller::{
    ControllerError, MediaState, PhaseController, SessionDeps, SessionEvent, SessionHandle,
    SessionInput,
};
pub use lesson::{Lesson, LessonSource, QuestionItem};
pub use phase::{Phase, SubPhase, Ticker};
