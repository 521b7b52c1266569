//! Pure scoring rules: points per answer, experience, levels and the
//! aggregation of a finished session into a [`QuizOutcome`].
//!
//! Nothing in here reads the clock or touches shared state, so the same inputs
//! always produce the same outcome and can be re-verified elsewhere.

use crate::badges::{evaluate_badges, Badge, HistoricalContext};
use crate::question::Question;
use crate::tier::PerformanceTier;
use crate::util::percentage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const BASE_XP: u32 = 10;
pub const PERFECT_SCORE_BONUS_XP: u32 = 20;
pub const XP_PER_LEVEL: u32 = 100;

/// Response-time windows as (inclusive upper bound in seconds, percent of max score).
/// Anything slower than the last window scores nothing.
const SPEED_MULTIPLIERS: [(u32, u64); 3] = [(5, 100), (10, 70), (15, 40)];

pub fn score_for_answer(max_score: u32, is_correct: bool, response_time_secs: u32) -> u32 {
    if !is_correct {
        return 0;
    }
    let percent = SPEED_MULTIPLIERS
        .iter()
        .find(|(limit, _)| response_time_secs <= *limit)
        .map(|(_, percent)| *percent)
        .unwrap_or(0);
    (u64::from(max_score) * percent / 100) as u32
}

pub fn experience_for_answer(is_correct: bool, response_time_secs: u32) -> u32 {
    if !is_correct {
        return 0;
    }
    let bonus = match response_time_secs {
        0..=2 => 5,
        3..=5 => 3,
        _ => 0,
    };
    BASE_XP + bonus
}

/// Levels start at 1 and every level is `XP_PER_LEVEL` wide.
pub fn level_for_xp(total_xp: u32) -> u32 {
    total_xp / XP_PER_LEVEL + 1
}

pub fn xp_to_next_level(total_xp: u32) -> u32 {
    level_for_xp(total_xp) * XP_PER_LEVEL - total_xp
}

/// Fraction of the current level window `(level-1)*100 .. level*100` already earned.
pub fn progress_to_next_level(total_xp: u32) -> f64 {
    let floor = (level_for_xp(total_xp) - 1) * XP_PER_LEVEL;
    f64::from(total_xp - floor) / f64::from(XP_PER_LEVEL)
}

/// The recorded result for one question. Built once by the session and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuestion {
    pub question: Arc<Question>,
    /// Empty when the question timed out.
    pub answer: String,
    pub is_correct: bool,
    pub response_time_secs: u32,
    pub points: u32,
    pub experience: u32,
}

impl AnsweredQuestion {
    pub fn new(question: Arc<Question>, answer: impl Into<String>, response_time_secs: u32) -> Self {
        let answer = answer.into();
        let response_time_secs = response_time_secs.min(question.time_limit_secs);
        let is_correct = question.is_correct(&answer);
        Self {
            points: score_for_answer(question.max_score, is_correct, response_time_secs),
            experience: experience_for_answer(is_correct, response_time_secs),
            question,
            answer,
            is_correct,
            response_time_secs,
        }
    }

    pub fn timed_out(question: Arc<Question>) -> Self {
        let limit = question.time_limit_secs;
        Self::new(question, String::new(), limit)
    }

    pub fn is_timeout(&self) -> bool {
        self.answer.is_empty()
    }

    pub fn is_fast_correct(&self) -> bool {
        self.is_correct && self.response_time_secs < 3
    }
}

/// Final, immutable result of one completed quiz session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub category: Option<String>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub total_score: u64,
    pub max_possible_score: u64,
    pub percentage: u32,
    pub elapsed_secs: u64,
    pub experience_points: u32,
    pub tier: PerformanceTier,
    pub new_badges: Vec<Badge>,
}

impl QuizOutcome {
    pub fn is_perfect(&self) -> bool {
        self.total_questions > 0 && self.correct_count == self.total_questions
    }
}

pub fn aggregate_outcome(
    answered: &[AnsweredQuestion],
    elapsed: Duration,
    category: Option<&str>,
    history: &HistoricalContext,
) -> QuizOutcome {
    let total_questions = answered.len() as u32;
    let correct_count = answered.iter().filter(|a| a.is_correct).count() as u32;
    let total_score: u64 = answered.iter().map(|a| u64::from(a.points)).sum();
    let max_possible_score: u64 = answered
        .iter()
        .map(|a| u64::from(a.question.max_score))
        .sum();
    let mut experience_points = answered
        .iter()
        .fold(0u32, |xp, a| xp.saturating_add(a.experience));
    if total_questions > 0 && correct_count == total_questions {
        experience_points = experience_points.saturating_add(PERFECT_SCORE_BONUS_XP);
    }
    let percentage = percentage(total_score, max_possible_score);

    let mut outcome = QuizOutcome {
        category: category.map(str::to_string),
        correct_count,
        total_questions,
        total_score,
        max_possible_score,
        percentage,
        elapsed_secs: elapsed.as_secs(),
        experience_points,
        tier: PerformanceTier::from_percentage(percentage),
        new_badges: Vec::new(),
    };
    outcome.new_badges = evaluate_badges(&outcome, answered, history);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc(id: &str) -> Arc<Question> {
        Arc::new(Question::multiple_choice(id, "pick", "A", ["A", "B", "C", "D"]))
    }

    #[test]
    fn score_windows() {
        assert_eq!(score_for_answer(100, true, 0), 100);
        assert_eq!(score_for_answer(100, true, 5), 100);
        assert_eq!(score_for_answer(100, true, 6), 70);
        assert_eq!(score_for_answer(100, true, 10), 70);
        assert_eq!(score_for_answer(100, true, 11), 40);
        assert_eq!(score_for_answer(100, true, 15), 40);
        assert_eq!(score_for_answer(100, true, 16), 0);
        assert_eq!(score_for_answer(100, false, 1), 0);
    }

    #[test]
    fn score_floors_fractional_points() {
        assert_eq!(score_for_answer(33, true, 7), 23);
        assert_eq!(score_for_answer(33, true, 12), 13);
        assert_eq!(score_for_answer(0, true, 1), 0);
    }

    #[test]
    fn score_is_non_increasing_in_response_time() {
        for max in [0, 1, 7, 50, 100, 250, 1000] {
            let mut previous = u32::MAX;
            for secs in 0..=30 {
                let score = score_for_answer(max, true, secs);
                assert!(score <= previous, "max={max} secs={secs}");
                assert_eq!(score_for_answer(max, false, secs), 0);
                previous = score;
            }
        }
    }

    #[test]
    fn experience_bonuses() {
        assert_eq!(experience_for_answer(true, 0), 15);
        assert_eq!(experience_for_answer(true, 2), 15);
        assert_eq!(experience_for_answer(true, 3), 13);
        assert_eq!(experience_for_answer(true, 5), 13);
        assert_eq!(experience_for_answer(true, 6), 10);
        assert_eq!(experience_for_answer(false, 1), 0);
    }

    #[test]
    fn levels() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(950), 10);

        assert_eq!(xp_to_next_level(0), 100);
        assert_eq!(xp_to_next_level(99), 1);
        assert_eq!(xp_to_next_level(100), 100);
        assert_eq!(xp_to_next_level(250), 50);

        assert_eq!(progress_to_next_level(0), 0.0);
        assert_eq!(progress_to_next_level(150), 0.5);
        assert_eq!(progress_to_next_level(299), 0.99);
    }

    #[test]
    fn answered_question_clamps_and_scores() {
        let q = mc("q1");
        let a = AnsweredQuestion::new(q.clone(), "a", 40);
        assert!(a.is_correct);
        assert_eq!(a.response_time_secs, 15);
        assert_eq!(a.points, 40);
        assert_eq!(a.experience, 10);

        let t = AnsweredQuestion::timed_out(q);
        assert!(t.is_timeout());
        assert!(!t.is_correct);
        assert_eq!(t.points, 0);
        assert_eq!(t.experience, 0);
    }

    #[test]
    fn three_question_scenario() {
        let answered = vec![
            AnsweredQuestion::new(mc("q1"), "A", 2),
            AnsweredQuestion::new(mc("q2"), "A", 6),
            AnsweredQuestion::new(mc("q3"), "A", 11),
        ];
        let points: Vec<u32> = answered.iter().map(|a| a.points).collect();
        assert_eq!(points, vec![100, 70, 40]);

        let history = HistoricalContext {
            quizzes_completed: 3,
            ..Default::default()
        };
        let outcome = aggregate_outcome(&answered, Duration::from_secs(19), None, &history);
        assert_eq!(outcome.total_score, 210);
        assert_eq!(outcome.max_possible_score, 300);
        assert_eq!(outcome.percentage, 70);
        assert_eq!(outcome.tier, PerformanceTier::Good);
        assert_eq!(outcome.correct_count, 3);
        // 15 + 10 + 10, plus the perfect-score bonus
        assert_eq!(outcome.experience_points, 55);
        assert_eq!(outcome.elapsed_secs, 19);
        assert!(outcome.is_perfect());
    }

    #[test]
    fn perfect_bonus_only_when_everything_correct() {
        let answered = vec![
            AnsweredQuestion::new(mc("q1"), "A", 1),
            AnsweredQuestion::new(mc("q2"), "B", 1),
        ];
        let outcome = aggregate_outcome(
            &answered,
            Duration::ZERO,
            None,
            &HistoricalContext::default(),
        );
        assert_eq!(outcome.experience_points, 15);
        assert_eq!(outcome.percentage, 50);
        assert!(!outcome.is_perfect());
    }

    #[test]
    fn empty_answers_resolve_to_zero() {
        let outcome = aggregate_outcome(&[], Duration::ZERO, None, &HistoricalContext::default());
        assert_eq!(outcome.total_questions, 0);
        assert_eq!(outcome.max_possible_score, 0);
        assert_eq!(outcome.percentage, 0);
        assert_eq!(outcome.experience_points, 0);
        assert_eq!(outcome.tier, PerformanceTier::NeedsImprovement);
    }

    #[test]
    fn large_max_scores_do_not_overflow() {
        let q = Arc::new(
            Question::multiple_choice("big", "pick", "A", ["A", "B"]).with_max_score(3_000_000_000),
        );
        let answered = vec![
            AnsweredQuestion::new(q.clone(), "A", 1),
            AnsweredQuestion::new(q, "A", 1),
        ];
        let outcome = aggregate_outcome(
            &answered,
            Duration::ZERO,
            None,
            &HistoricalContext::default(),
        );
        assert_eq!(outcome.total_score, 6_000_000_000);
        assert_eq!(outcome.max_possible_score, 6_000_000_000);
        assert_eq!(outcome.percentage, 100);
        assert_eq!(outcome.tier, PerformanceTier::Excellent);
    }

    #[test]
    fn zero_max_score_questions_give_zero_percentage() {
        let q = Arc::new(Question::true_false("tf", "free points", true).with_max_score(0));
        let answered = vec![AnsweredQuestion::new(q, "true", 1)];
        let outcome = aggregate_outcome(
            &answered,
            Duration::ZERO,
            None,
            &HistoricalContext::default(),
        );
        assert_eq!(outcome.percentage, 0);
        assert_eq!(outcome.experience_points, 15 + PERFECT_SCORE_BONUS_XP);
    }
}
