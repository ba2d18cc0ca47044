//! Interactive quiz over generated questions and its JSON report.

use std::io::{self, BufRead, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::QuizError;
use crate::mcq::{Question, LETTERS};

/// One line of user input, interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Choice(usize),
    Quit,
    Invalid,
}

/// `A`-`D` in any case or `1`-`4` select an option; `q`/`quit` stops.
pub fn parse_answer(input: &str) -> Answer {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Answer::Quit;
    }
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => match c.to_ascii_uppercase() {
            'A'..='D' => Answer::Choice(c.to_ascii_uppercase() as usize - 'A' as usize),
            '1'..='4' => Answer::Choice(c as usize - '1' as usize),
            _ => Answer::Invalid,
        },
        _ => Answer::Invalid,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub options: [String; 4],
    pub selected: char,
    pub selected_text: String,
    pub correct: char,
    pub correct_text: String,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizReport {
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub total_questions: usize,
    pub answered: usize,
    pub score: usize,
    pub percentage: f64,
    pub completed: bool,
    pub answers: Vec<AnswerRecord>,
}

impl QuizReport {
    fn new(source: &str, total_questions: usize, answers: Vec<AnswerRecord>, completed: bool) -> Self {
        let score = answers.iter().filter(|a| a.is_correct).count();
        let percentage = if total_questions == 0 {
            0.0
        } else {
            score as f64 / total_questions as f64 * 100.0
        };
        Self {
            generated_at: Utc::now(),
            source: source.to_string(),
            total_questions,
            answered: answers.len(),
            score,
            percentage,
            completed,
            answers,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), QuizError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), score = self.score, total = self.total_questions, "Saved quiz report");
        Ok(())
    }
}

pub struct QuizSession {
    questions: Vec<Question>,
    source: String,
}

impl QuizSession {
    pub fn new(questions: Vec<Question>, source: impl Into<String>) -> Self {
        Self { questions, source: source.into() }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Ask every question on `output`, reading answers from `input`.
    ///
    /// Ends early on `q`/`quit` or end of input; the report then has
    /// `completed == false`.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, output: &mut W) -> io::Result<QuizReport> {
        let total = self.questions.len();
        let mut answers = Vec::with_capacity(total);
        let mut completed = true;

        'questions: for (n, q) in self.questions.iter().enumerate() {
            writeln!(output, "\n{}", format!("Question {}/{}", n + 1, total).bold())?;
            writeln!(output, "{}", q.prompt)?;
            for (letter, option) in LETTERS.iter().zip(&q.options) {
                writeln!(output, "  {}) {}", letter, option)?;
            }

            let choice = loop {
                write!(output, "Your answer (A-D or 1-4, q to quit): ")?;
                output.flush()?;

                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    completed = false;
                    break 'questions;
                }
                match parse_answer(&line) {
                    Answer::Choice(i) => break i,
                    Answer::Quit => {
                        completed = false;
                        break 'questions;
                    }
                    Answer::Invalid => {
                        writeln!(output, "{}", "Please answer with A, B, C or D (or 1-4).".yellow())?;
                    }
                }
            };

            let is_correct = choice == q.correct;
            if is_correct {
                writeln!(output, "{}", "Correct!".green())?;
            } else {
                writeln!(
                    output,
                    "{} The correct answer is {}) {}",
                    "Incorrect.".red(),
                    q.correct_letter(),
                    q.correct_option()
                )?;
            }
            writeln!(output, "Explanation: {}", q.explanation)?;

            answers.push(AnswerRecord {
                question: q.prompt.clone(),
                options: q.options.clone(),
                selected: LETTERS[choice],
                selected_text: q.options[choice].clone(),
                correct: q.correct_letter(),
                correct_text: q.correct_option().to_string(),
                is_correct,
                explanation: q.explanation.clone(),
            });
        }

        let report = QuizReport::new(&self.source, total, answers, completed);
        if !completed {
            writeln!(output, "\nQuiz ended early after {} of {} questions.", report.answered, total)?;
        }
        writeln!(
            output,
            "\n{}",
            format!("Score: {}/{} ({:.1}%)", report.score, total, report.percentage).bold()
        )?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_accept_letters_and_digits() {
        assert_eq!(parse_answer("a\n"), Answer::Choice(0));
        assert_eq!(parse_answer(" D "), Answer::Choice(3));
        assert_eq!(parse_answer("2"), Answer::Choice(1));
        assert_eq!(parse_answer("QUIT"), Answer::Quit);
        assert_eq!(parse_answer("q"), Answer::Quit);
        assert_eq!(parse_answer("e"), Answer::Invalid);
        assert_eq!(parse_answer("5"), Answer::Invalid);
        assert_eq!(parse_answer("ab"), Answer::Invalid);
        assert_eq!(parse_answer(""), Answer::Invalid);
    }

    #[test]
    fn empty_quiz_scores_zero_percent() {
        let report = QuizSession::new(vec![], "doc.pdf").run(&b""[..], &mut Vec::new()).unwrap();
        assert_eq!(report.total_questions, 0);
        assert_eq!(report.percentage, 0.0);
        assert!(report.completed);
    }
}
