// Library surface for the CLI, headless/integration tests and reuse.
pub mod app_dirs;
pub mod badges;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod question;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod source;
pub mod tier;
pub mod util;

pub use badges::{Badge, HistoricalContext};
pub use error::{QuizError, SessionError};
pub use question::{Difficulty, Question, QuestionType};
pub use scoring::{AnsweredQuestion, QuizOutcome};
pub use session::{QuizSession, SessionState};
pub use tier::PerformanceTier;

pub const TICK_RATE_MS: u64 = 100;
