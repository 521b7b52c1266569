use crate::badges::HistoricalContext;
use crate::clock::{Clock, SystemClock};
use crate::error::SessionError;
use crate::question::Question;
use crate::scoring::{aggregate_outcome, AnsweredQuestion, QuizOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    InProgress { index: usize },
    Completed,
}

/// The question currently on screen, with options in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedQuestion {
    pub index: usize,
    pub total: usize,
    pub question: Arc<Question>,
    pub options: Vec<String>,
}

/// Drives one player through a timed sequence of questions.
///
/// Transitions are `NotStarted -> InProgress(0) -> .. -> InProgress(n-1) -> Completed`.
/// Each question is armed with a deadline of `now + time_limit`; the deadline, not the
/// moment a call happens to arrive, decides whether an answer counts. All transition
/// methods take `&mut self`, so a session is only ever mutated from one place at a time.
#[derive(Debug)]
pub struct QuizSession<C: Clock = SystemClock> {
    id: String,
    category: Option<String>,
    clock: C,
    rng: StdRng,
    shuffle_options: bool,
    history: HistoricalContext,
    state: SessionState,
    questions: Vec<Arc<Question>>,
    answered: Vec<AnsweredQuestion>,
    presented_options: Vec<String>,
    started_at: Option<Instant>,
    armed_at: Option<Instant>,
    deadline: Option<Instant>,
    outcome: Option<QuizOutcome>,
}

impl QuizSession<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for QuizSession<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> QuizSession<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            id: format!("{:016x}", rand::random::<u64>()),
            category: None,
            clock,
            rng: StdRng::from_entropy(),
            shuffle_options: true,
            history: HistoricalContext::default(),
            state: SessionState::NotStarted,
            questions: Vec::new(),
            answered: Vec::new(),
            presented_options: Vec::new(),
            started_at: None,
            armed_at: None,
            deadline: None,
            outcome: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Pre-session totals used for badge eligibility when the session completes.
    pub fn with_history(mut self, history: HistoricalContext) -> Self {
        self.history = history;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_shuffle(mut self, shuffle_options: bool) -> Self {
        self.shuffle_options = shuffle_options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn answered(&self) -> &[AnsweredQuestion] {
        &self.answered
    }

    /// `(answered, total)`
    pub fn progress(&self) -> (usize, usize) {
        (self.answered.len(), self.questions.len())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn start(&mut self, questions: Vec<Question>) -> Result<(), SessionError> {
        if self.state != SessionState::NotStarted {
            return Err(SessionError::AlreadyStarted);
        }
        if questions.is_empty() {
            return Err(SessionError::InvalidSession("the quiz has no questions".into()));
        }

        self.questions = questions
            .into_iter()
            .map(|q| q.normalized().map(Arc::new))
            .collect::<Result<_, _>>()
            .map_err(|e| SessionError::InvalidSession(e.to_string()))?;
        self.started_at = Some(self.clock.now());

        info!(
            session = %self.id,
            questions = self.questions.len(),
            category = ?self.category,
            "quiz session started"
        );
        self.arm(0);
        Ok(())
    }

    fn arm(&mut self, index: usize) {
        let question = &self.questions[index];
        let now = self.clock.now();
        self.presented_options = if self.shuffle_options {
            question.presented_options(&mut self.rng)
        } else {
            question.options.clone()
        };
        self.armed_at = Some(now);
        self.deadline = Some(now + Duration::from_secs(u64::from(question.time_limit_secs)));
        self.state = SessionState::InProgress { index };
    }

    fn in_progress_index(&self) -> Result<usize, SessionError> {
        match self.state {
            SessionState::InProgress { index } => Ok(index),
            _ => Err(SessionError::NotInProgress),
        }
    }

    fn is_answered(&self, index: usize) -> bool {
        self.answered.len() > index
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.in_progress_index().ok()
    }

    pub fn current_question(&self) -> Result<PresentedQuestion, SessionError> {
        let index = self.in_progress_index()?;
        Ok(PresentedQuestion {
            index,
            total: self.questions.len(),
            question: Arc::clone(&self.questions[index]),
            options: self.presented_options.clone(),
        })
    }

    pub fn is_current_answered(&self) -> bool {
        self.current_index().is_some_and(|index| self.is_answered(index))
    }

    /// Time left before the current question locks, or `None` once it is answered.
    pub fn remaining_time(&self) -> Option<Duration> {
        if self.is_current_answered() {
            return None;
        }
        let deadline = self.deadline?;
        self.current_index()?;
        Some(deadline.saturating_duration_since(self.clock.now()))
    }

    fn record(&mut self, answered: AnsweredQuestion) -> &AnsweredQuestion {
        let index = self.answered.len();
        debug!(
            session = %self.id,
            index,
            correct = answered.is_correct,
            timed_out = answered.is_timeout(),
            response_secs = answered.response_time_secs,
            points = answered.points,
            "answer recorded"
        );
        self.answered.push(answered);
        &self.answered[index]
    }

    /// Records an answer for the current question. Once the deadline has passed the
    /// answer is recorded as a timeout regardless of its content.
    pub fn submit_answer(&mut self, answer: &str) -> Result<&AnsweredQuestion, SessionError> {
        let now = self.clock.now();
        self.submit_answer_at(answer, now)
    }

    /// Like [`submit_answer`](Self::submit_answer), judged at `received_at` (a reading of
    /// this session's clock taken when the answer arrived) instead of now.
    pub fn submit_answer_at(
        &mut self,
        answer: &str,
        received_at: Instant,
    ) -> Result<&AnsweredQuestion, SessionError> {
        let index = self.in_progress_index()?;
        if self.is_answered(index) {
            return Err(SessionError::AlreadyAnswered { index });
        }

        let question = Arc::clone(&self.questions[index]);
        if self.deadline_passed(received_at) {
            debug!(session = %self.id, index, "answer arrived after the deadline");
            return Ok(self.record(AnsweredQuestion::timed_out(question)));
        }

        if !answer.trim().is_empty() && !question.is_presented_option(answer) {
            debug!(session = %self.id, index, answer, "answer is not one of the options");
        }

        let elapsed = self
            .armed_at
            .map(|armed| received_at.saturating_duration_since(armed))
            .unwrap_or_default();
        let response_secs = u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX);
        Ok(self.record(AnsweredQuestion::new(question, answer, response_secs)))
    }

    /// Records a timeout for the current question unless it was already answered.
    pub fn on_timeout(&mut self) -> Result<&AnsweredQuestion, SessionError> {
        let index = self.in_progress_index()?;
        if self.is_answered(index) {
            return Err(SessionError::AlreadyAnswered { index });
        }
        debug!(session = %self.id, index, "question timed out");
        let question = Arc::clone(&self.questions[index]);
        Ok(self.record(AnsweredQuestion::timed_out(question)))
    }

    /// Cooperative deadline check for callers that poll instead of running a timer.
    /// Returns true when a timeout was recorded.
    pub fn expire_if_due(&mut self) -> bool {
        match self.current_index() {
            Some(index) if !self.is_answered(index) && self.deadline_passed(self.clock.now()) => {
                self.on_timeout().is_ok()
            }
            _ => false,
        }
    }

    pub fn advance(&mut self) -> Result<SessionState, SessionError> {
        let index = self.in_progress_index()?;
        if !self.is_answered(index) {
            return Err(SessionError::NotAnswered { index });
        }

        if index + 1 < self.questions.len() {
            self.arm(index + 1);
        } else {
            self.complete();
        }
        Ok(self.state)
    }

    fn complete(&mut self) {
        let elapsed = self
            .started_at
            .map(|started| self.clock.now().saturating_duration_since(started))
            .unwrap_or_default();
        let outcome = aggregate_outcome(
            &self.answered,
            elapsed,
            self.category.as_deref(),
            &self.history,
        );
        info!(
            session = %self.id,
            score = outcome.total_score,
            max = outcome.max_possible_score,
            percentage = outcome.percentage,
            xp = outcome.experience_points,
            tier = %outcome.tier,
            "quiz session completed"
        );
        for badge in &outcome.new_badges {
            info!(session = %self.id, badge = %badge, "badge unlocked");
        }

        self.state = SessionState::Completed;
        self.armed_at = None;
        self.deadline = None;
        self.presented_options.clear();
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Result<&QuizOutcome, SessionError> {
        self.outcome.as_ref().ok_or(SessionError::SessionNotComplete)
    }

    /// Consumes the session, handing over its outcome.
    pub fn into_outcome(self) -> Result<QuizOutcome, SessionError> {
        self.outcome.ok_or(SessionError::SessionNotComplete)
    }
}
