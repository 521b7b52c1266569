use crate::app_dirs::AppDirs;
use crate::badges::{Badge, HistoricalContext, CATEGORY_EXPERT_PERCENTAGE};
use crate::error::Result;
use crate::scoring::{level_for_xp, xp_to_next_level, QuizOutcome};
use crate::tier::PerformanceTier;
use crate::util::mean;
use chrono::{DateTime, Days, Local, NaiveDate};
use itertools::Itertools;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Receives finished outcomes; called once per completed session.
pub trait OutcomeSink {
    fn submit_outcome(&mut self, session_id: &str, outcome: &QuizOutcome) -> Result<()>;
}

/// Supplies the pre-session totals needed for badge checks.
pub trait HistoryProvider {
    /// Snapshot of history as it stands before a session completing on `today`.
    fn context(&self, today: NaiveDate) -> Result<HistoricalContext>;
}

/// One stored quiz attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub session_id: String,
    pub category: Option<String>,
    pub completed_at: DateTime<Local>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub total_score: u64,
    pub max_score: u64,
    pub percentage: u32,
    pub elapsed_secs: u64,
    pub experience: u32,
    pub tier: PerformanceTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub category: String,
    pub best: AttemptRecord,
    pub attempts: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub quizzes: u32,
    pub total_xp: u32,
    pub level: u32,
    pub xp_to_next_level: u32,
    pub average_percentage: Option<f64>,
    pub best_percentage: Option<u32>,
    pub streaks: Streaks,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL UNIQUE,
        category TEXT,
        completed_at TEXT NOT NULL,
        completed_on TEXT NOT NULL,
        correct_count INTEGER NOT NULL,
        total_questions INTEGER NOT NULL,
        total_score INTEGER NOT NULL,
        max_score INTEGER NOT NULL,
        percentage INTEGER NOT NULL,
        elapsed_secs INTEGER NOT NULL,
        experience INTEGER NOT NULL,
        tier TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_category ON attempts(category);
    CREATE INDEX IF NOT EXISTS idx_attempts_completed_on ON attempts(completed_on);
    CREATE TABLE IF NOT EXISTS badges (
        badge TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        earned_at TEXT NOT NULL
    );
"#;

const ATTEMPT_COLUMNS: &str = "session_id, category, completed_at, correct_count, total_questions, \
     total_score, max_score, percentage, elapsed_secs, experience, tier";

/// Local quiz history backed by SQLite
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open the history database at the default location, creating it if needed
    pub fn new() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("kwiz_history.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.as_ref().display(), "opening history database");
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Stores an outcome completed at `completed_at`. Submitting the same session twice
    /// is a no-op; returns whether anything was written.
    pub fn record_outcome_at(
        &mut self,
        session_id: &str,
        outcome: &QuizOutcome,
        completed_at: DateTime<Local>,
    ) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO attempts
            (session_id, category, completed_at, completed_on, correct_count, total_questions,
             total_score, max_score, percentage, elapsed_secs, experience, tier)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                session_id,
                outcome.category,
                completed_at.to_rfc3339(),
                completed_at.date_naive().to_string(),
                outcome.correct_count,
                outcome.total_questions,
                sql_int(outcome.total_score),
                sql_int(outcome.max_possible_score),
                outcome.percentage,
                sql_int(outcome.elapsed_secs),
                outcome.experience_points,
                outcome.tier.to_string(),
            ],
        )?;

        if inserted == 0 {
            debug!(session = session_id, "outcome already recorded");
            return Ok(false);
        }

        for badge in &outcome.new_badges {
            tx.execute(
                "INSERT OR IGNORE INTO badges (badge, session_id, earned_at) VALUES (?1, ?2, ?3)",
                params![badge.to_string(), session_id, completed_at.to_rfc3339()],
            )?;
        }
        tx.commit()?;

        info!(
            session = session_id,
            percentage = outcome.percentage,
            badges = outcome.new_badges.len(),
            "outcome recorded"
        );
        Ok(true)
    }

    pub fn total_quizzes(&self) -> Result<u32> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn total_xp(&self) -> Result<u32> {
        let xp: u32 = self.conn.query_row(
            "SELECT COALESCE(SUM(experience), 0) FROM attempts",
            [],
            |row| row.get(0),
        )?;
        Ok(xp)
    }

    pub fn earned_badges(&self) -> Result<Vec<(Badge, DateTime<Local>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT badge, earned_at FROM badges ORDER BY earned_at, badge")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let badge = Badge::from_id(&id).ok_or_else(|| invalid_column(0, "badge"))?;
            Ok((badge, parse_timestamp(row, 1)?))
        })?;

        let mut badges = Vec::new();
        for badge in rows {
            badges.push(badge?);
        }
        Ok(badges)
    }

    /// Count of attempts at or above the category-expert threshold, per category.
    pub fn excellent_by_category(&self) -> Result<HashMap<String, u32>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT category, COUNT(*)
            FROM attempts
            WHERE category IS NOT NULL AND percentage >= ?1
            GROUP BY category
            "#,
        )?;
        let rows = stmt.query_map([CATEGORY_EXPERT_PERCENTAGE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (category, count) = row?;
            counts.insert(category, count);
        }
        Ok(counts)
    }

    pub fn play_dates(&self) -> Result<BTreeSet<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT completed_on FROM attempts")?;
        let rows = stmt.query_map([], |row| {
            let day: String = row.get(0)?;
            day.parse::<NaiveDate>()
                .map_err(|_| invalid_column(0, "completed_on"))
        })?;

        let mut dates = BTreeSet::new();
        for date in rows {
            dates.insert(date?);
        }
        Ok(dates)
    }

    pub fn attempts(&self) -> Result<Vec<AttemptRecord>> {
        self.query_attempts(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts ORDER BY completed_at, id"),
            None,
        )
    }

    pub fn recent_attempts(&self, limit: usize) -> Result<Vec<AttemptRecord>> {
        self.query_attempts(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts ORDER BY completed_at DESC, id DESC LIMIT ?1"),
            Some(limit as i64),
        )
    }

    fn query_attempts(&self, sql: &str, limit: Option<i64>) -> Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = match limit {
            Some(limit) => stmt.query_map([limit], attempt_from_row)?,
            None => stmt.query_map([], attempt_from_row)?,
        };

        let mut attempts = Vec::new();
        for attempt in rows {
            attempts.push(attempt?);
        }
        Ok(attempts)
    }

    /// Best attempt per category: highest percentage, then score, then fastest.
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let grouped = self
            .attempts()?
            .into_iter()
            .filter_map(|a| a.category.clone().map(|c| (c, a)))
            .into_group_map();

        let entries = grouped
            .into_iter()
            .filter_map(|(category, attempts)| {
                let count = attempts.len();
                attempts
                    .into_iter()
                    .max_by(|a, b| {
                        (a.percentage, a.total_score)
                            .cmp(&(b.percentage, b.total_score))
                            .then(b.elapsed_secs.cmp(&a.elapsed_secs))
                    })
                    .map(|best| LeaderboardEntry {
                        category,
                        best,
                        attempts: count,
                    })
            })
            .sorted_by(|a, b| {
                b.best
                    .percentage
                    .cmp(&a.best.percentage)
                    .then(a.category.cmp(&b.category))
            })
            .collect();
        Ok(entries)
    }

    pub fn streaks(&self, today: NaiveDate) -> Result<Streaks> {
        Ok(daily_streaks(&self.play_dates()?, today))
    }

    pub fn summary(&self, today: NaiveDate) -> Result<HistorySummary> {
        let attempts = self.attempts()?;
        let percentages: Vec<f64> = attempts.iter().map(|a| f64::from(a.percentage)).collect();
        let total_xp = self.total_xp()?;
        Ok(HistorySummary {
            quizzes: attempts.len() as u32,
            total_xp,
            level: level_for_xp(total_xp),
            xp_to_next_level: xp_to_next_level(total_xp),
            average_percentage: mean(&percentages),
            best_percentage: attempts.iter().map(|a| a.percentage).max(),
            streaks: self.streaks(today)?,
        })
    }

    /// Write every attempt as CSV; returns the number of rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let attempts = self.attempts()?;
        let mut csv = csv::Writer::from_writer(writer);
        for attempt in &attempts {
            csv.serialize(attempt)?;
        }
        csv.flush()?;
        Ok(attempts.len())
    }

    /// Clear all history (for testing or reset purposes)
    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM attempts; DELETE FROM badges;")?;
        Ok(())
    }

    /// Get the database file path being used
    pub fn database_path() -> Option<PathBuf> {
        AppDirs::db_path()
    }
}

impl OutcomeSink for HistoryDb {
    fn submit_outcome(&mut self, session_id: &str, outcome: &QuizOutcome) -> Result<()> {
        self.record_outcome_at(session_id, outcome, Local::now())
            .map(|_| ())
    }
}

impl HistoryProvider for HistoryDb {
    fn context(&self, today: NaiveDate) -> Result<HistoricalContext> {
        let mut dates = self.play_dates()?;
        dates.insert(today);
        let streaks = daily_streaks(&dates, today);

        Ok(HistoricalContext {
            quizzes_completed: self.total_quizzes()?,
            current_streak: streaks.current,
            longest_streak: streaks.longest,
            excellent_by_category: self.excellent_by_category()?,
            earned_badges: self.earned_badges()?.into_iter().map(|(b, _)| b).collect(),
            total_xp: self.total_xp()?,
        })
    }
}

/// Current and longest runs of consecutive play days. The current run may end
/// today or yesterday; anything older means the streak is broken.
pub fn daily_streaks(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streaks {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for &date in dates {
        run = match previous {
            Some(prev) if prev.checked_add_days(Days::new(1)) == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }

    let mut cursor = if dates.contains(&today) {
        Some(today)
    } else {
        today.checked_sub_days(Days::new(1))
    };
    let mut current = 0;
    while let Some(day) = cursor.filter(|d| dates.contains(d)) {
        current += 1;
        cursor = day.checked_sub_days(Days::new(1));
    }

    Streaks { current, longest }
}

fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn invalid_column(idx: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, name.to_string(), rusqlite::types::Type::Text)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|_| invalid_column(idx, "timestamp"))
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let tier: String = row.get(10)?;
    Ok(AttemptRecord {
        session_id: row.get(0)?,
        category: row.get(1)?,
        completed_at: parse_timestamp(row, 2)?,
        correct_count: row.get(3)?,
        total_questions: row.get(4)?,
        total_score: row.get::<_, i64>(5)?.max(0) as u64,
        max_score: row.get::<_, i64>(6)?.max(0) as u64,
        percentage: row.get(7)?,
        elapsed_secs: row.get::<_, i64>(8)?.max(0) as u64,
        experience: row.get(9)?,
        tier: PerformanceTier::from_id(&tier).ok_or_else(|| invalid_column(10, "tier"))?,
    })
}
