//! Human-in-the-loop questions and the Interviewer interface.
//!
//! `wait.human` nodes block on an [`Interviewer`], which maps a [`Question`]
//! to an [`Answer`]. The console implementation prompts on stdin; the
//! scripted one feeds canned answers to tests.

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Question form presented to the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    YesNo,
    Confirmation,
    MultipleChoice,
    FreeForm,
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone)]
pub struct Choice {
    /// Accelerator key, e.g. `y`.
    pub key: String,
    /// Human-facing label, e.g. `[Y] Yes`.
    pub label: String,
}

/// A question for the human operator.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<Choice>,
    /// Default answer applied on empty input.
    pub default: Option<String>,
    /// Give up and report a timeout after this long.
    pub timeout: Option<Duration>,
}

impl Question {
    /// Free-form question with no options.
    pub fn free_form(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind: QuestionKind::FreeForm,
            options: Vec::new(),
            default: None,
            timeout: None,
        }
    }

    /// Multiple-choice question over the given options.
    pub fn multiple_choice(
        id: impl Into<String>,
        text: impl Into<String>,
        options: Vec<Choice>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind: QuestionKind::MultipleChoice,
            options,
            default: None,
            timeout: None,
        }
    }
}

/// The human's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// Chosen option label (multiple choice).
    Option(String),
    /// Free-form text.
    Text(String),
    /// No answer arrived within the question's timeout.
    Timeout,
    /// The human declined to answer.
    Skipped,
}

/// Interviewer failure (I/O, closed terminal).
#[derive(Debug, Error)]
#[error("interviewer: {0}")]
pub struct InterviewError(pub String);

/// Maps questions to answers, possibly blocking.
#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn ask(&self, question: &Question) -> Result<Answer, InterviewError>;
}

/// Parses an accelerator prefix out of an option label.
///
/// `[Y] Yes` yields `(Some('y'), "Yes")`; labels without a prefix come back
/// unchanged with no key.
pub fn parse_accelerator(label: &str) -> (Option<char>, &str) {
    let trimmed = label.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'[' && bytes[2] == b']' {
        let key = (bytes[1] as char).to_ascii_lowercase();
        return (Some(key), trimmed[3..].trim_start());
    }
    (None, trimmed)
}

/// Interviewer that prompts on the terminal.
///
/// Reading happens on a blocking task so the runtime is never stalled; the
/// optional question timeout is enforced around it.
#[derive(Debug, Default)]
pub struct ConsoleInterviewer;

impl ConsoleInterviewer {
    pub fn new() -> Self {
        Self
    }

    async fn read_line(timeout: Option<Duration>) -> Result<Option<String>, InterviewError> {
        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map(|_| line)
                .map_err(|e| InterviewError(e.to_string()))
        });
        let joined = match timeout {
            Some(t) => match tokio::time::timeout(t, read).await {
                Ok(j) => j,
                Err(_) => return Ok(None),
            },
            None => read.await,
        };
        let line = joined.map_err(|e| InterviewError(e.to_string()))??;
        Ok(Some(line))
    }
}

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer, InterviewError> {
        let mut out = std::io::stdout();
        writeln!(out, "\n{}", "=".repeat(60)).map_err(|e| InterviewError(e.to_string()))?;
        writeln!(out, "  {}", question.text).map_err(|e| InterviewError(e.to_string()))?;
        writeln!(out, "{}", "=".repeat(60)).map_err(|e| InterviewError(e.to_string()))?;

        match question.kind {
            QuestionKind::YesNo | QuestionKind::Confirmation => {
                write!(out, "  [Y]es / [N]o: ").map_err(|e| InterviewError(e.to_string()))?;
                out.flush().map_err(|e| InterviewError(e.to_string()))?;
                let raw = match Self::read_line(question.timeout).await? {
                    Some(r) => r,
                    None => return Ok(Answer::Timeout),
                };
                match raw.trim().to_ascii_lowercase().as_str() {
                    "y" | "yes" => Ok(Answer::Yes),
                    "n" | "no" => Ok(Answer::No),
                    "" => match question.default.as_deref() {
                        Some(d) if d.eq_ignore_ascii_case("y") || d.eq_ignore_ascii_case("yes") => {
                            Ok(Answer::Yes)
                        }
                        Some(_) => Ok(Answer::No),
                        None => Ok(Answer::Skipped),
                    },
                    _ => Ok(Answer::No),
                }
            }
            QuestionKind::MultipleChoice => {
                for opt in &question.options {
                    writeln!(out, "  {}", opt.label).map_err(|e| InterviewError(e.to_string()))?;
                }
                write!(out, "  Choice: ").map_err(|e| InterviewError(e.to_string()))?;
                out.flush().map_err(|e| InterviewError(e.to_string()))?;
                let raw = match Self::read_line(question.timeout).await? {
                    Some(r) => r,
                    None => return Ok(Answer::Timeout),
                };
                let input = raw.trim().to_ascii_lowercase();
                if input.is_empty() {
                    return Ok(Answer::Skipped);
                }
                for opt in &question.options {
                    let (key, clean) = parse_accelerator(&opt.label);
                    let key_match = key.map(|k| k.to_string()) == Some(input.clone())
                        || opt.key.eq_ignore_ascii_case(&input);
                    if key_match || clean.eq_ignore_ascii_case(&input) {
                        return Ok(Answer::Option(opt.label.clone()));
                    }
                }
                Ok(Answer::Text(raw.trim().to_string()))
            }
            QuestionKind::FreeForm => {
                write!(out, "  > ").map_err(|e| InterviewError(e.to_string()))?;
                out.flush().map_err(|e| InterviewError(e.to_string()))?;
                match Self::read_line(question.timeout).await? {
                    Some(raw) => Ok(Answer::Text(raw.trim().to_string())),
                    None => Ok(Answer::Timeout),
                }
            }
        }
    }
}

/// Interviewer that replays a fixed script of answers. Test double.
#[derive(Default)]
pub struct ScriptedInterviewer {
    answers: Mutex<VecDeque<Answer>>,
}

impl ScriptedInterviewer {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Interviewer for ScriptedInterviewer {
    async fn ask(&self, _question: &Question) -> Result<Answer, InterviewError> {
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| InterviewError("script exhausted".to_string()))
    }
}
