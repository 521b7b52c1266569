use crate::error::{QuizError, Result};
use crate::question::{Difficulty, Question};
use include_dir::{include_dir, Dir};
use itertools::Itertools;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

static QUIZ_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/quizzes");

/// Anything that can hand out an ordered list of questions for a quiz.
pub trait QuizSource {
    fn fetch_quiz(
        &self,
        category: Option<&str>,
        difficulty: Option<Difficulty>,
        count: usize,
    ) -> Result<Vec<Question>>;

    fn categories(&self) -> Vec<String>;

    /// The source's own spelling of `category`, matched case-insensitively.
    fn canonical_category(&self, category: &str) -> Option<String> {
        self.categories()
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

/// One category worth of questions as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizBankFile {
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BankDocument {
    Many(Vec<QuizBankFile>),
    One(QuizBankFile),
}

/// In-memory pool of validated questions.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn from_files(files: Vec<QuizBankFile>) -> Result<Self> {
        let mut questions = Vec::new();
        for file in files {
            for mut question in file.questions {
                if question.category.is_none() {
                    question.category = Some(file.category.clone());
                }
                questions.push(question.normalized()?);
            }
        }
        Ok(Self { questions })
    }

    /// Accepts either a single bank object or an array of banks.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let files = match serde_json::from_str::<BankDocument>(json)? {
            BankDocument::Many(files) => files,
            BankDocument::One(file) => vec![file],
        };
        Self::from_files(files)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loading quiz bank");
        Self::from_json_str(&json)
    }

    /// Questions shipped with the binary.
    pub fn builtin() -> Result<Self> {
        let files = QUIZ_DIR
            .files()
            .filter(|f| f.path().extension().is_some_and(|ext| ext == "json"))
            .map(|f| parse_bank_file(f.path(), f.contents()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_files(files)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    fn matching(&self, category: Option<&str>, difficulty: Option<Difficulty>) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| match category {
                Some(wanted) => q
                    .category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(wanted)),
                None => true,
            })
            .filter(|q| difficulty.is_none() || q.difficulty == difficulty)
            .collect()
    }
}

fn parse_bank_file(path: &Path, contents: &[u8]) -> Result<QuizBankFile> {
    let text = std::str::from_utf8(contents).map_err(|e| {
        QuizError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("quiz bank {} is not valid UTF-8: {e}", path.display()),
        ))
    })?;
    Ok(serde_json::from_str(text)?)
}

impl QuizSource for QuestionBank {
    fn fetch_quiz(
        &self,
        category: Option<&str>,
        difficulty: Option<Difficulty>,
        count: usize,
    ) -> Result<Vec<Question>> {
        let pool = self.matching(category, difficulty);
        if pool.is_empty() || count == 0 {
            return Err(QuizError::EmptyQuiz {
                category: category.map(str::to_string),
                difficulty: difficulty.map(|d| d.to_string()),
            });
        }

        let mut rng = rand::thread_rng();
        let picked: Vec<Question> = pool
            .choose_multiple(&mut rng, count)
            .map(|q| (*q).clone())
            .collect();
        debug!(
            available = pool.len(),
            picked = picked.len(),
            ?category,
            "quiz fetched"
        );
        Ok(picked)
    }

    fn categories(&self) -> Vec<String> {
        self.questions
            .iter()
            .filter_map(|q| q.category.clone())
            .unique()
            .sorted()
            .collect()
    }
}
