use crate::scoring::{level_for_xp, AnsweredQuestion, QuizOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const SPEED_DEMON_FAST_ANSWERS: usize = 10;
pub const QUIZ_MASTER_QUIZZES: u32 = 50;
pub const CATEGORY_EXPERT_QUIZZES: u32 = 5;
pub const CATEGORY_EXPERT_PERCENTAGE: u32 = 90;

const STREAK_BADGES: [(u32, Badge); 2] = [(5, Badge::Streak5), (10, Badge::Streak10)];
const LEVEL_BADGES: [(u32, Badge); 3] = [
    (10, Badge::Level10),
    (25, Badge::Level25),
    (50, Badge::Level50),
];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Badge {
    FirstQuiz,
    PerfectScore,
    SpeedDemon,
    QuizMaster,
    CategoryExpert,
    #[serde(rename = "STREAK_5")]
    #[strum(serialize = "STREAK_5")]
    Streak5,
    #[serde(rename = "STREAK_10")]
    #[strum(serialize = "STREAK_10")]
    Streak10,
    #[serde(rename = "LEVEL_10")]
    #[strum(serialize = "LEVEL_10")]
    Level10,
    #[serde(rename = "LEVEL_25")]
    #[strum(serialize = "LEVEL_25")]
    Level25,
    #[serde(rename = "LEVEL_50")]
    #[strum(serialize = "LEVEL_50")]
    Level50,
}

impl Badge {
    pub const ALL: [Badge; 10] = [
        Badge::FirstQuiz,
        Badge::PerfectScore,
        Badge::SpeedDemon,
        Badge::QuizMaster,
        Badge::CategoryExpert,
        Badge::Streak5,
        Badge::Streak10,
        Badge::Level10,
        Badge::Level25,
        Badge::Level50,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.to_string() == id)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Badge::FirstQuiz => "First Steps",
            Badge::PerfectScore => "Perfectionist",
            Badge::SpeedDemon => "Speed Demon",
            Badge::QuizMaster => "Quiz Master",
            Badge::CategoryExpert => "Category Expert",
            Badge::Streak5 => "On Fire",
            Badge::Streak10 => "Unstoppable",
            Badge::Level10 => "Rising Star",
            Badge::Level25 => "Veteran",
            Badge::Level50 => "Legend",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Badge::FirstQuiz => "Complete your first quiz",
            Badge::PerfectScore => "Score 100% on a quiz",
            Badge::SpeedDemon => "Answer 10 questions correctly in under 3 seconds in one quiz",
            Badge::QuizMaster => "Complete 50 quizzes",
            Badge::CategoryExpert => "Score 90% or more on 5 quizzes in one category",
            Badge::Streak5 => "Play on 5 consecutive days",
            Badge::Streak10 => "Play on 10 consecutive days",
            Badge::Level10 => "Reach level 10",
            Badge::Level25 => "Reach level 25",
            Badge::Level50 => "Reach level 50",
        }
    }
}

/// The player's totals before the session being scored, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalContext {
    pub quizzes_completed: u32,
    /// Daily streak counting the day of the session being scored.
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Quizzes scored at or above `CATEGORY_EXPERT_PERCENTAGE`, keyed by category.
    pub excellent_by_category: HashMap<String, u32>,
    pub earned_badges: BTreeSet<Badge>,
    pub total_xp: u32,
}

impl HistoricalContext {
    pub fn excellent_in(&self, category: &str) -> u32 {
        self.excellent_by_category
            .get(category)
            .copied()
            .unwrap_or_default()
    }
}

/// Badges the outcome qualifies for that were not already earned, in declaration order.
pub fn evaluate_badges(
    outcome: &QuizOutcome,
    answered: &[AnsweredQuestion],
    history: &HistoricalContext,
) -> Vec<Badge> {
    let mut qualifying = Vec::new();

    if history.quizzes_completed == 0 {
        qualifying.push(Badge::FirstQuiz);
    }
    if outcome.percentage == 100 {
        qualifying.push(Badge::PerfectScore);
    }
    if answered.iter().filter(|a| a.is_fast_correct()).count() >= SPEED_DEMON_FAST_ANSWERS {
        qualifying.push(Badge::SpeedDemon);
    }
    if history.quizzes_completed + 1 >= QUIZ_MASTER_QUIZZES {
        qualifying.push(Badge::QuizMaster);
    }
    if let Some(category) = outcome.category.as_deref() {
        let this_one = u32::from(outcome.percentage >= CATEGORY_EXPERT_PERCENTAGE);
        if history.excellent_in(category) + this_one >= CATEGORY_EXPERT_QUIZZES {
            qualifying.push(Badge::CategoryExpert);
        }
    }
    for (days, badge) in STREAK_BADGES {
        if history.current_streak >= days {
            qualifying.push(badge);
        }
    }

    let level_before = level_for_xp(history.total_xp);
    let level_after = level_for_xp(history.total_xp + outcome.experience_points);
    for (level, badge) in LEVEL_BADGES {
        if level_before < level && level_after >= level {
            qualifying.push(badge);
        }
    }

    qualifying
        .into_iter()
        .filter(|b| !history.earned_badges.contains(b))
        .collect()
}
