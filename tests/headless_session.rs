use std::time::Duration;

use kwiz::clock::ManualClock;
use kwiz::runtime::{ChannelEventSource, FixedTicker, QuizEvent, RunEnd, Runner, SessionObserver};
use kwiz::scoring::AnsweredQuestion;
use kwiz::session::PresentedQuestion;
use kwiz::{Badge, PerformanceTier, Question, QuizSession, SessionState};

// Headless run of a whole quiz through the Runner without a terminal. The
// observer moves the shared manual clock forward when each question appears,
// which stands in for the player thinking before the queued answer lands.
struct Pacer {
    clock: ManualClock,
    think_secs: Vec<u64>,
    results: Vec<(u32, u32)>,
}

impl SessionObserver for Pacer {
    fn question_shown(&mut self, question: &PresentedQuestion) {
        self.clock.advance_secs(self.think_secs[question.index]);
    }

    fn answer_recorded(&mut self, answered: &AnsweredQuestion) {
        self.results
            .push((answered.response_time_secs, answered.points));
    }
}

fn science_quiz() -> Vec<Question> {
    vec![
        Question::multiple_choice("s1", "Symbol for gold?", "Au", ["Ag", "Au", "Fe", "Pb"]),
        Question::multiple_choice("s2", "Closest planet to the sun?", "Mercury", ["Venus", "Mercury", "Mars"]),
        Question::true_false("s3", "Sound travels faster than light", false),
    ]
}

#[test]
fn headless_quiz_scores_by_response_time() {
    let clock = ManualClock::new();
    let mut session = QuizSession::with_clock(clock.clone())
        .with_category("science")
        .with_shuffle(false);
    session.start(science_quiz()).unwrap();

    let (tx, es) = ChannelEventSource::channel();
    tx.send(QuizEvent::answer("2")).unwrap();
    tx.send(QuizEvent::answer("mercury")).unwrap();
    tx.send(QuizEvent::answer("False")).unwrap();
    let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

    let mut pacer = Pacer {
        clock,
        think_secs: vec![2, 7, 12],
        results: Vec::new(),
    };
    let end = runner.run(&mut session, &tx, &mut pacer).unwrap();

    assert_eq!(end, RunEnd::Completed);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(pacer.results, vec![(2, 100), (7, 70), (12, 40)]);

    let outcome = session.outcome().unwrap();
    assert_eq!(outcome.category.as_deref(), Some("science"));
    assert_eq!(outcome.correct_count, 3);
    assert_eq!(outcome.total_score, 210);
    assert_eq!(outcome.max_possible_score, 300);
    assert_eq!(outcome.percentage, 70);
    assert_eq!(outcome.tier, PerformanceTier::Good);
    // every answer correct, so the perfect bonus applies despite the 70%
    assert_eq!(outcome.experience_points, 15 + 10 + 10 + 20);
    assert_eq!(outcome.elapsed_secs, 21);
    assert_eq!(outcome.new_badges, vec![Badge::FirstQuiz]);
}

#[test]
fn headless_quiz_answer_after_deadline_is_a_timeout() {
    let clock = ManualClock::new();
    let mut session = QuizSession::with_clock(clock.clone()).with_shuffle(false);
    session.start(science_quiz()).unwrap();

    let (tx, es) = ChannelEventSource::channel();
    for answer in ["Au", "Mercury", "False"] {
        tx.send(QuizEvent::answer(answer)).unwrap();
    }
    let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

    let mut pacer = Pacer {
        clock,
        think_secs: vec![1, 15, 1],
        results: Vec::new(),
    };
    runner.run(&mut session, &tx, &mut pacer).unwrap();

    let answered = session.answered();
    assert!(answered[1].is_timeout());
    assert_eq!(answered[1].answer, "");
    assert_eq!(answered[1].response_time_secs, 15);

    let outcome = session.outcome().unwrap();
    assert_eq!(outcome.correct_count, 2);
    assert_eq!(outcome.total_score, 200);
    assert_eq!(outcome.percentage, 66);
    assert_eq!(outcome.tier, PerformanceTier::Good);
}

#[test]
fn headless_quiz_cooperative_expiry_without_answers() {
    let clock = ManualClock::new();
    let mut session = QuizSession::with_clock(clock.clone()).with_shuffle(false);
    session
        .start(vec![Question::true_false("t", "Rust is fun", true).with_time_limit(3)])
        .unwrap();

    // nothing queued: the countdown or the tick-time check records the timeout
    let (tx, es) = ChannelEventSource::channel();
    let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));
    let mut pacer = Pacer {
        clock,
        think_secs: vec![3],
        results: Vec::new(),
    };
    assert_eq!(runner.run(&mut session, &tx, &mut pacer).unwrap(), RunEnd::Completed);
    assert_eq!(pacer.results, vec![(3, 0)]);

    let outcome = session.outcome().unwrap();
    assert_eq!(outcome.percentage, 0);
    assert_eq!(outcome.tier, PerformanceTier::NeedsImprovement);
    assert_eq!(outcome.experience_points, 0);
}
