use thiserror::Error;

/// Misuse of the quiz session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("could not start quiz: {0}")]
    InvalidSession(String),

    #[error("question {index} has already been answered")]
    AlreadyAnswered { index: usize },

    #[error("quiz session is not complete")]
    SessionNotComplete,

    #[error("quiz session is not in progress")]
    NotInProgress,

    #[error("question {index} has not been answered yet")]
    NotAnswered { index: usize },

    #[error("quiz session has already been started")]
    AlreadyStarted,
}

impl SessionError {
    /// Errors the caller may ignore; the session state is unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadyAnswered { .. } | SessionError::SessionNotComplete
        )
    }
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no questions available for category {category:?} and difficulty {difficulty:?}")]
    EmptyQuiz {
        category: Option<String>,
        difficulty: Option<String>,
    },

    #[error("invalid question {id}: {reason}")]
    InvalidQuestion { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, QuizError>;
