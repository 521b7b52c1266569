use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use crossterm::style::Stylize;
use kwiz::{
    config::{Config, ConfigStore, FileConfigStore},
    history::{HistoryDb, HistoryProvider, OutcomeSink},
    question::apply_default_time_limit,
    runtime::{spawn_line_reader, ChannelEventSource, FixedTicker, RunEnd, Runner, SessionObserver},
    scoring::{level_for_xp, xp_to_next_level, AnsweredQuestion, QuizOutcome},
    clock::SystemClock,
    session::{PresentedQuestion, QuizSession},
    source::{QuestionBank, QuizSource},
    Difficulty, HistoricalContext, TICK_RATE_MS,
};
use std::{
    error::Error,
    fs::File,
    io::{stdin, BufReader},
    path::PathBuf,
    time::Duration,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// timed quizzes with scores, experience levels, badges and local history
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "A terminal quiz runner. Answer each question before its timer runs out: faster correct answers score more, earn experience towards levels and unlock badges."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// history database to use instead of the default location
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// play a quiz, answering on stdin (the default)
    Play(PlayArgs),
    /// show totals, level, streaks, badges and recent quizzes
    Stats,
    /// show the best result per category
    Leaderboard,
    /// export every recorded quiz as CSV
    Export {
        /// destination file
        path: PathBuf,
    },
    /// list the categories available in the question bank
    Categories {
        /// question bank to read instead of the built-in one
        #[clap(short = 'b', long)]
        bank: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct PlayArgs {
    /// number of questions in the quiz
    #[clap(short = 'n', long)]
    count: Option<usize>,

    /// only ask questions from this category
    #[clap(short = 'c', long)]
    category: Option<String>,

    /// only ask questions of this difficulty
    #[clap(short = 'd', long, value_enum)]
    difficulty: Option<Difficulty>,

    /// seconds per question for questions without their own limit
    #[clap(short = 't', long)]
    time_limit: Option<u32>,

    /// JSON question bank to use instead of the built-in one
    #[clap(short = 'b', long)]
    bank: Option<PathBuf>,

    /// keep multiple-choice options in their stored order
    #[clap(long)]
    no_shuffle: bool,

    /// remember these settings as the new defaults
    #[clap(long)]
    save_config: bool,
}

impl PlayArgs {
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(count) = self.count {
            cfg.question_count = count;
        }
        if let Some(ref category) = self.category {
            cfg.category = Some(category.clone());
        }
        if let Some(difficulty) = self.difficulty {
            cfg.difficulty = Some(difficulty);
        }
        if let Some(secs) = self.time_limit {
            cfg.default_time_limit_secs = secs;
        }
        if let Some(ref bank) = self.bank {
            cfg.quiz_bank = Some(bank.clone());
        }
        if self.no_shuffle {
            cfg.shuffle_options = false;
        }
        cfg
    }
}

/// Prints questions and feedback as the session runs.
#[derive(Default)]
struct TerminalObserver {
    warned: bool,
}

impl SessionObserver for TerminalObserver {
    fn question_shown(&mut self, question: &PresentedQuestion) {
        self.warned = false;
        println!();
        println!(
            "{} {}",
            format!("Question {}/{}", question.index + 1, question.total).bold(),
            format!(
                "[{}, {}s]",
                question.question.question_type, question.question.time_limit_secs
            )
            .dim()
        );
        println!("{}", question.question.text);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
    }

    fn answer_recorded(&mut self, answered: &AnsweredQuestion) {
        if answered.is_timeout() {
            println!(
                "{} The answer was {}.",
                "Time's up!".yellow(),
                answered.question.correct_answer
            );
        } else if answered.is_correct {
            println!(
                "{} +{} points, +{} XP ({}s)",
                "Correct!".green(),
                answered.points,
                answered.experience,
                answered.response_time_secs
            );
        } else {
            println!(
                "{} The answer was {}.",
                "Wrong.".red(),
                answered.question.correct_answer
            );
        }
        if let Some(ref explanation) = answered.question.explanation {
            println!("{}", explanation.as_str().dim());
        }
    }

    fn tick(&mut self, remaining: Option<Duration>) {
        if let Some(remaining) = remaining {
            if !self.warned && remaining > Duration::ZERO && remaining <= Duration::from_secs(5) {
                self.warned = true;
                println!("{}", "5 seconds left...".yellow());
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(ref path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };

    match cli.command {
        None => play(&cli, &store, &PlayArgs::default()),
        Some(Command::Play(ref args)) => play(&cli, &store, args),
        Some(Command::Stats) => stats(&open_history(&cli)?),
        Some(Command::Leaderboard) => leaderboard(&open_history(&cli)?),
        Some(Command::Export { ref path }) => {
            let written = open_history(&cli)?.export_csv(File::create(path)?)?;
            println!("Exported {} quizzes to {}", written, path.display());
            Ok(())
        }
        Some(Command::Categories { ref bank }) => {
            for category in load_bank(bank.as_ref())?.categories() {
                println!("{category}");
            }
            Ok(())
        }
    }
}

fn open_history(cli: &Cli) -> Result<HistoryDb, Box<dyn Error>> {
    let db = match cli.db {
        Some(ref path) => HistoryDb::open(path)?,
        None => HistoryDb::new()?,
    };
    Ok(db)
}

fn load_bank(path: Option<&PathBuf>) -> Result<QuestionBank, Box<dyn Error>> {
    let bank = match path {
        Some(path) => QuestionBank::from_path(path)?,
        None => QuestionBank::builtin()?,
    };
    Ok(bank)
}

fn play(cli: &Cli, store: &FileConfigStore, args: &PlayArgs) -> Result<(), Box<dyn Error>> {
    let cfg = args.apply(store.load());
    if args.save_config {
        store.save(&cfg)?;
    }

    let bank = load_bank(cfg.quiz_bank.as_ref())?;
    let mut questions =
        bank.fetch_quiz(cfg.category.as_deref(), cfg.difficulty, cfg.question_count)?;
    apply_default_time_limit(&mut questions, cfg.default_time_limit_secs);

    let mut history = match open_history(cli) {
        Ok(db) => Some(db),
        Err(e) => {
            warn!("history unavailable, results will not be saved: {e}");
            None
        }
    };
    let context = match history.as_ref().map(|db| db.context(Local::now().date_naive())) {
        Some(Ok(context)) => context,
        Some(Err(e)) => {
            warn!("could not read history: {e}");
            HistoricalContext::default()
        }
        None => HistoricalContext::default(),
    };
    let xp_before = context.total_xp;

    let mut session = QuizSession::new()
        .with_history(context)
        .with_shuffle(cfg.shuffle_options);
    if let Some(ref category) = cfg.category {
        let category = bank
            .canonical_category(category)
            .unwrap_or_else(|| category.clone());
        session = session.with_category(category);
    }
    if let Err(e) = session.start(questions) {
        eprintln!("{e}");
        return Err(e.into());
    }

    println!(
        "{} {} questions. Answer with the option number or text, :q to quit.",
        "kwiz".bold().cyan(),
        session.total_questions()
    );

    let (tx, event_source) = ChannelEventSource::channel();
    spawn_line_reader(BufReader::new(stdin()), SystemClock, tx.clone());
    let runner = Runner::new(
        event_source,
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    if runner.run(&mut session, &tx, &mut TerminalObserver::default())? == RunEnd::Quit {
        println!("{}", "Quiz abandoned, nothing recorded.".dim());
        return Ok(());
    }

    let session_id = session.id().to_string();
    let outcome = session.into_outcome()?;
    print_outcome(&outcome, xp_before);

    if let Some(ref mut db) = history {
        if let Err(e) = db.submit_outcome(&session_id, &outcome) {
            warn!(session = %session_id, "could not save quiz result: {e}");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &QuizOutcome, xp_before: u32) {
    let xp_after = xp_before + outcome.experience_points;
    println!();
    println!(
        "Score: {}/{} ({}%)  {}  {}",
        outcome.total_score,
        outcome.max_possible_score,
        outcome.percentage,
        outcome.tier.to_string().bold(),
        outcome.tier.message()
    );
    println!(
        "Correct: {}/{} in {}s",
        outcome.correct_count, outcome.total_questions, outcome.elapsed_secs
    );
    println!(
        "XP: +{}  Level {} ({} XP to next level)",
        outcome.experience_points,
        level_for_xp(xp_after),
        xp_to_next_level(xp_after)
    );
    if level_for_xp(xp_after) > level_for_xp(xp_before) {
        println!("{}", "Level up!".green().bold());
    }
    for badge in &outcome.new_badges {
        println!(
            "{} {} - {}",
            "New badge:".magenta().bold(),
            badge.title(),
            badge.description()
        );
    }
}

fn stats(db: &HistoryDb) -> Result<(), Box<dyn Error>> {
    let now = Local::now();
    let summary = db.summary(now.date_naive())?;
    println!(
        "Quizzes: {}  Level {}  ({} XP, {} to next level)",
        summary.quizzes, summary.level, summary.total_xp, summary.xp_to_next_level
    );
    if let (Some(average), Some(best)) = (summary.average_percentage, summary.best_percentage) {
        println!("Average: {average:.1}%  Best: {best}%");
    }
    println!(
        "Streak: {} days (longest {})",
        summary.streaks.current, summary.streaks.longest
    );

    let badges = db.earned_badges()?;
    if !badges.is_empty() {
        println!();
        println!("{}", "Badges".bold());
        for (badge, earned_at) in badges {
            println!(
                "  {} - {} ({})",
                badge.title(),
                badge.description(),
                relative_age(earned_at, now)
            );
        }
    }

    let recent = db.recent_attempts(10)?;
    if !recent.is_empty() {
        println!();
        println!("{}", "Recent quizzes".bold());
        for attempt in recent {
            println!(
                "  {:<12} {:>3}%  {:<17} {}",
                attempt.category.as_deref().unwrap_or("mixed"),
                attempt.percentage,
                attempt.tier.to_string(),
                relative_age(attempt.completed_at, now)
            );
        }
    }
    Ok(())
}

fn leaderboard(db: &HistoryDb) -> Result<(), Box<dyn Error>> {
    let entries = db.leaderboard()?;
    if entries.is_empty() {
        println!("No categorized quizzes played yet.");
        return Ok(());
    }
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "{:>2}. {:<12} {:>3}%  {:>5} pts  {:>4}s  ({} attempts)",
            rank + 1,
            entry.category,
            entry.best.percentage,
            entry.best.total_score,
            entry.best.elapsed_secs,
            entry.attempts
        );
    }
    Ok(())
}

fn relative_age(then: DateTime<Local>, now: DateTime<Local>) -> String {
    let age = now.signed_duration_since(then);
    match (age.num_days(), age.num_hours(), age.num_minutes()) {
        (d, _, _) if d >= 1 => format!("{d}d ago"),
        (_, h, _) if h >= 1 => format!("{h}h ago"),
        (_, _, m) if m >= 1 => format!("{m}m ago"),
        _ => "just now".to_string(),
    }
}
