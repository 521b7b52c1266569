use crate::error::{QuizError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIME_LIMIT_SECS: u32 = 15;
pub const DEFAULT_MAX_SCORE: u32 = 100;
pub const TRUE_FALSE_OPTIONS: [&str; 2] = ["True", "False"];

fn default_time_limit() -> u32 {
    DEFAULT_TIME_LIMIT_SECS
}

fn default_max_score() -> u32 {
    DEFAULT_MAX_SCORE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[strum(serialize = "true/false")]
    TrueFalse,
    #[strum(serialize = "multiple choice")]
    MultipleChoice,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A single quiz question as delivered by a quiz source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub correct_answer: String,
    /// Multiple-choice options, including the correct one. Always `True`/`False`
    /// for true/false questions once normalized.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u32,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Question {
    pub fn true_false(id: impl Into<String>, text: impl Into<String>, answer: bool) -> Self {
        let correct = if answer {
            TRUE_FALSE_OPTIONS[0]
        } else {
            TRUE_FALSE_OPTIONS[1]
        };
        Self {
            id: id.into(),
            text: text.into(),
            question_type: QuestionType::TrueFalse,
            correct_answer: correct.to_string(),
            options: TRUE_FALSE_OPTIONS.iter().map(|o| o.to_string()).collect(),
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            max_score: DEFAULT_MAX_SCORE,
            explanation: None,
            category: None,
            difficulty: None,
        }
    }

    pub fn multiple_choice<S: Into<String>>(
        id: impl Into<String>,
        text: impl Into<String>,
        correct_answer: impl Into<String>,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            question_type: QuestionType::MultipleChoice,
            correct_answer: correct_answer.into(),
            options: options.into_iter().map(Into::into).collect(),
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            max_score: DEFAULT_MAX_SCORE,
            explanation: None,
            category: None,
            difficulty: None,
        }
    }

    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_max_score(mut self, max_score: u32) -> Self {
        self.max_score = max_score;
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Checks the option invariants and canonicalizes true/false questions so
    /// they always carry exactly `["True", "False"]`.
    pub fn normalized(mut self) -> Result<Self> {
        let invalid = |id: &str, reason: &str| QuizError::InvalidQuestion {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if self.text.trim().is_empty() {
            return Err(invalid(&self.id, "question text is empty"));
        }
        if self.time_limit_secs == 0 {
            return Err(invalid(&self.id, "time limit must be at least one second"));
        }

        match self.question_type {
            QuestionType::TrueFalse => {
                let canonical = TRUE_FALSE_OPTIONS
                    .iter()
                    .find(|o| answers_match(o, &self.correct_answer))
                    .ok_or_else(|| invalid(&self.id, "true/false answer must be True or False"))?;
                let options_ok = self.options.is_empty()
                    || (self.options.len() == 2
                        && TRUE_FALSE_OPTIONS
                            .iter()
                            .all(|o| self.options.iter().any(|opt| answers_match(o, opt))));
                if !options_ok {
                    return Err(invalid(&self.id, "true/false options must be True and False"));
                }
                self.correct_answer = canonical.to_string();
                self.options = TRUE_FALSE_OPTIONS.iter().map(|o| o.to_string()).collect();
            }
            QuestionType::MultipleChoice => {
                let occurrences = self
                    .options
                    .iter()
                    .filter(|o| answers_match(o, &self.correct_answer))
                    .count();
                if occurrences != 1 {
                    return Err(invalid(
                        &self.id,
                        "options must contain the correct answer exactly once",
                    ));
                }
            }
        }

        Ok(self)
    }

    /// Case-insensitive comparison against the correct answer. Blank answers never match.
    pub fn is_correct(&self, answer: &str) -> bool {
        !answer.trim().is_empty() && answers_match(answer, &self.correct_answer)
    }

    /// Whether `answer` names one of the options shown to the user.
    pub fn is_presented_option(&self, answer: &str) -> bool {
        self.options.iter().any(|o| answers_match(o, answer))
    }

    /// Options in presentation order: shuffled for multiple choice, fixed for true/false.
    pub fn presented_options<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut options = self.options.clone();
        if self.question_type == QuestionType::MultipleChoice {
            options.shuffle(rng);
        }
        options
    }
}

/// Replaces the stock time limit on questions that did not set their own.
pub fn apply_default_time_limit(questions: &mut [Question], secs: u32) {
    if secs == 0 {
        return;
    }
    for q in questions
        .iter_mut()
        .filter(|q| q.time_limit_secs == DEFAULT_TIME_LIMIT_SECS)
    {
        q.time_limit_secs = secs;
    }
}

fn answers_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
