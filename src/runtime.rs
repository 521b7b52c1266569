use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::SessionError;
use crate::scoring::AnsweredQuestion;
use crate::session::{PresentedQuestion, QuizSession, SessionState};

/// Unified event type consumed by the quiz runner
#[derive(Clone, Debug, PartialEq)]
pub enum QuizEvent {
    /// A typed answer. `received_at` is a reading of the session clock taken when the
    /// line arrived; `None` judges the answer when it is handled.
    Answer {
        text: String,
        received_at: Option<Instant>,
    },
    /// Fired by the countdown armed for question `index`.
    Timeout { index: usize },
    Quit,
    Tick,
}

impl QuizEvent {
    pub fn answer(text: impl Into<String>) -> Self {
        QuizEvent::Answer {
            text: text.into(),
            received_at: None,
        }
    }
}

/// Source of quiz events (typed answers, timer expiry, etc.)
pub trait QuizEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError>;
}

/// Event source fed through an mpsc channel; the sender side is shared with
/// the input reader and the countdown timers.
pub struct ChannelEventSource {
    rx: Receiver<QuizEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<QuizEvent>) -> Self {
        Self { rx }
    }

    pub fn channel() -> (Sender<QuizEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl QuizEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Reads answers line by line on a background thread, stamping each with `clock`,
/// which must be the session's clock. `:q`, `quit` and end of input become
/// `QuizEvent::Quit`.
pub fn spawn_line_reader<R, C>(reader: R, clock: C, tx: Sender<QuizEvent>)
where
    R: BufRead + Send + 'static,
    C: Clock + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let received_at = clock.now();
            let event = match line.trim() {
                ":q" | "quit" => QuizEvent::Quit,
                _ => QuizEvent::Answer {
                    text: line,
                    received_at: Some(received_at),
                },
            };
            let quit = event == QuizEvent::Quit;
            if tx.send(event).is_err() || quit {
                return;
            }
        }
        let _ = tx.send(QuizEvent::Quit);
    });
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Single-fire countdown for one question. Sends `QuizEvent::Timeout` once the
/// duration elapses unless cancelled first. Cancelling joins the timer thread,
/// so after `cancel` returns no further event can be sent.
#[derive(Debug)]
pub struct CountdownTimer {
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    pub fn arm(events: Sender<QuizEvent>, index: usize, after: Duration) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(after) {
                let _ = events.send(QuizEvent::Timeout { index });
            }
        });
        Self {
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Callbacks for rendering a running session.
pub trait SessionObserver {
    fn question_shown(&mut self, question: &PresentedQuestion);
    fn answer_recorded(&mut self, answered: &AnsweredQuestion);
    fn tick(&mut self, _remaining: Option<Duration>) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    Quit,
}

/// Maps a 1-based option number to the option text; anything else passes through.
pub fn resolve_choice(question: &PresentedQuestion, input: &str) -> String {
    match input.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= question.options.len() => question.options[n - 1].clone(),
        _ => input.trim().to_string(),
    }
}

/// Runner that advances the quiz one event/tick at a time
pub struct Runner<E: QuizEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: QuizEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> QuizEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => QuizEvent::Tick,
        }
    }

    /// Plays a started session to completion. `timer_events` must feed the same
    /// channel this runner reads from.
    pub fn run<C: Clock, O: SessionObserver>(
        &self,
        session: &mut QuizSession<C>,
        timer_events: &Sender<QuizEvent>,
        observer: &mut O,
    ) -> Result<RunEnd, SessionError> {
        loop {
            let presented = session.current_question()?;
            observer.question_shown(&presented);
            let mut timer = CountdownTimer::arm(
                timer_events.clone(),
                presented.index,
                session.remaining_time().unwrap_or_default(),
            );

            loop {
                let recorded = match self.step() {
                    QuizEvent::Answer { text, received_at } => {
                        let answer = resolve_choice(&presented, &text);
                        match received_at {
                            Some(at) => session.submit_answer_at(&answer, at),
                            None => session.submit_answer(&answer),
                        }
                    }
                    QuizEvent::Timeout { index } if index == presented.index => {
                        session.on_timeout()
                    }
                    QuizEvent::Timeout { .. } => continue,
                    QuizEvent::Tick => {
                        if !session.expire_if_due() {
                            observer.tick(session.remaining_time());
                            continue;
                        }
                        session
                            .answered()
                            .last()
                            .ok_or(SessionError::NotAnswered {
                                index: presented.index,
                            })
                    }
                    QuizEvent::Quit => return Ok(RunEnd::Quit),
                };

                match recorded {
                    Ok(answered) => {
                        timer.cancel();
                        observer.answer_recorded(answered);
                        break;
                    }
                    Err(e) if e.is_recoverable() => continue,
                    Err(e) => return Err(e),
                }
            }

            if session.advance()? == SessionState::Completed {
                return Ok(RunEnd::Completed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::question::Question;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        shown: Vec<String>,
        answers: Vec<(String, bool)>,
    }

    impl SessionObserver for Recorder {
        fn question_shown(&mut self, question: &PresentedQuestion) {
            self.shown.push(question.question.id.clone());
        }

        fn answer_recorded(&mut self, answered: &AnsweredQuestion) {
            self.answers
                .push((answered.answer.clone(), answered.is_correct));
        }
    }

    fn quiz() -> Vec<Question> {
        vec![
            Question::true_false("tf", "Rust is memory safe", true),
            Question::multiple_choice("mc", "2 + 2?", "4", ["3", "4", "5"]),
        ]
    }

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, es) = ChannelEventSource::channel();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(1)));
        assert_eq!(runner.step(), QuizEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, es) = ChannelEventSource::channel();
        tx.send(QuizEvent::answer("True")).unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(10)));
        assert_eq!(runner.step(), QuizEvent::answer("True"));
    }

    #[test]
    fn countdown_fires_once() {
        let (tx, rx) = mpsc::channel();
        let _timer = CountdownTimer::arm(tx, 3, Duration::from_millis(5));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            QuizEvent::Timeout { index: 3 }
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn cancelled_countdown_never_fires() {
        let (tx, rx) = mpsc::channel();
        let mut timer = CountdownTimer::arm(tx, 0, Duration::from_millis(50));
        timer.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn resolve_choice_maps_numbers() {
        let presented = PresentedQuestion {
            index: 0,
            total: 1,
            question: std::sync::Arc::new(Question::true_false("tf", "?", true)),
            options: vec!["True".into(), "False".into()],
        };
        assert_eq!(resolve_choice(&presented, "2"), "False");
        assert_eq!(resolve_choice(&presented, " 1 "), "True");
        assert_eq!(resolve_choice(&presented, "3"), "3");
        assert_eq!(resolve_choice(&presented, "true"), "true");
    }

    #[test]
    fn line_reader_emits_stamped_answers_then_quit() {
        let clock = ManualClock::new();
        let stamp = clock.now();
        let (tx, rx) = mpsc::channel();
        spawn_line_reader(Cursor::new("True\n2\n"), clock, tx);
        let timeout = Duration::from_secs(2);
        for expected in ["True", "2"] {
            assert_eq!(
                rx.recv_timeout(timeout).unwrap(),
                QuizEvent::Answer {
                    text: expected.to_string(),
                    received_at: Some(stamp),
                }
            );
        }
        assert_eq!(rx.recv_timeout(timeout).unwrap(), QuizEvent::Quit);
    }

    #[test]
    fn run_judges_answers_by_arrival_time() {
        let clock = ManualClock::new();
        let mut session = QuizSession::with_clock(clock.clone()).with_shuffle(false);
        session
            .start(vec![Question::true_false("tf", "Rust is memory safe", true)])
            .unwrap();

        // read 14s in, but only handled after the 15s deadline
        clock.advance_secs(14);
        let received_at = clock.now();
        clock.advance_secs(3);

        let (tx, es) = ChannelEventSource::channel();
        tx.send(QuizEvent::Answer {
            text: "1".into(),
            received_at: Some(received_at),
        })
        .unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

        let mut recorder = Recorder::default();
        assert_eq!(
            runner.run(&mut session, &tx, &mut recorder).unwrap(),
            RunEnd::Completed
        );
        assert_eq!(recorder.answers, vec![("True".to_string(), true)]);
        let answered = &session.answered()[0];
        assert_eq!(answered.response_time_secs, 14);
        assert_eq!(answered.points, 40);
    }

    #[test]
    fn run_completes_session_from_queued_answers() {
        let clock = ManualClock::new();
        let mut session = QuizSession::with_clock(clock.clone()).with_shuffle(false);
        session.start(quiz()).unwrap();

        let (tx, es) = ChannelEventSource::channel();
        tx.send(QuizEvent::answer("true")).unwrap();
        // option 2 of ["3", "4", "5"]
        tx.send(QuizEvent::answer("2")).unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

        let mut recorder = Recorder::default();
        let end = runner.run(&mut session, &tx, &mut recorder).unwrap();

        assert_eq!(end, RunEnd::Completed);
        assert_eq!(recorder.shown, vec!["tf", "mc"]);
        assert_eq!(
            recorder.answers,
            vec![("true".to_string(), true), ("4".to_string(), true)]
        );
        assert_eq!(session.outcome().unwrap().percentage, 100);
    }

    #[test]
    fn run_ignores_stale_timeouts_and_duplicate_answers() {
        let clock = ManualClock::new();
        let mut session = QuizSession::with_clock(clock.clone()).with_shuffle(false);
        session.start(quiz()).unwrap();

        let (tx, es) = ChannelEventSource::channel();
        tx.send(QuizEvent::Timeout { index: 0 }).unwrap();
        // stale: question 0 already timed out and the runner moved on
        tx.send(QuizEvent::Timeout { index: 0 }).unwrap();
        tx.send(QuizEvent::answer("4")).unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

        let mut recorder = Recorder::default();
        let end = runner.run(&mut session, &tx, &mut recorder).unwrap();

        assert_eq!(end, RunEnd::Completed);
        assert_eq!(
            recorder.answers,
            vec![(String::new(), false), ("4".to_string(), true)]
        );
    }

    #[test]
    fn run_stops_on_quit() {
        let clock = ManualClock::new();
        let mut session = QuizSession::with_clock(clock);
        session.start(quiz()).unwrap();

        let (tx, es) = ChannelEventSource::channel();
        tx.send(QuizEvent::Quit).unwrap();
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(5)));

        let mut recorder = Recorder::default();
        assert_eq!(
            runner.run(&mut session, &tx, &mut recorder).unwrap(),
            RunEnd::Quit
        );
        assert!(recorder.answers.is_empty());
        assert!(session.outcome().is_err());
    }
}
