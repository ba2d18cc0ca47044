//! Multiple-choice question generation from a retrieved context.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::{LowLevelClient, QueryResolver};
use crate::error::{QueryResolverError, QuizError};

pub const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

static OPTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\(?[A-Da-d1-4]\)|[A-Da-d1-4][.:\-])(?:\s+|$)").unwrap());

/// A multiple-choice question as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Mcq {
    /// Direct question that never mentions "the text" or "the context"
    pub question: String,
    /// Exactly 4 answer options without letter labels
    pub options: Vec<String>,
    /// Letter of the correct option: A, B, C or D
    pub answer: String,
    /// Short justification grounded in the context
    pub explanation: String,
}

/// A validated question ready to be asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionRecord")]
pub struct Question {
    pub prompt: String,
    pub options: [String; 4],
    /// Index into `options`
    pub correct: usize,
    pub explanation: String,
    pub topic: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// On-disk shape of a `Question`, checked before it becomes one.
#[derive(Deserialize)]
struct QuestionRecord {
    prompt: String,
    options: [String; 4],
    correct: usize,
    explanation: String,
    topic: String,
    #[serde(default)]
    sources: Vec<String>,
}

impl TryFrom<QuestionRecord> for Question {
    type Error = String;

    fn try_from(record: QuestionRecord) -> Result<Self, Self::Error> {
        if record.correct >= LETTERS.len() {
            return Err(format!("correct index {} is out of range 0-3", record.correct));
        }
        if record.options.iter().any(|o| o.trim().is_empty()) {
            return Err("question has an empty option".to_string());
        }
        Ok(Question {
            prompt: record.prompt,
            options: record.options,
            correct: record.correct,
            explanation: record.explanation,
            topic: record.topic,
            sources: record.sources,
        })
    }
}

impl Question {
    pub fn correct_letter(&self) -> char {
        LETTERS[self.correct]
    }

    pub fn correct_option(&self) -> &str {
        &self.options[self.correct]
    }
}

/// Remove a leading `A)`, `(b)`, `C.` or `4-` style label.
pub fn strip_option_label(option: &str) -> String {
    OPTION_LABEL.replace(option.trim(), "").trim().to_string()
}

/// Upper-case `answer` and drop the punctuation around it: `" b) "` -> `"B"`.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_uppercase()
}

/// Check a raw `Mcq` and turn it into a `Question`.
pub fn validate_mcq(mcq: Mcq, topic: &str, sources: Vec<String>) -> Result<Question, String> {
    let prompt = mcq.question.trim().to_string();
    if prompt.is_empty() {
        return Err("question is empty".to_string());
    }

    let options: Vec<String> = mcq.options.iter().map(|o| strip_option_label(o)).collect();
    let options: [String; 4] = options
        .try_into()
        .map_err(|o: Vec<String>| format!("expected 4 options, got {}", o.len()))?;
    if let Some(i) = options.iter().position(String::is_empty) {
        return Err(format!("option {} is empty", LETTERS[i]));
    }
    let mut seen = HashSet::new();
    if !options.iter().all(|o| seen.insert(o.to_lowercase())) {
        return Err("options are not distinct".to_string());
    }

    let answer = normalize_answer(&mcq.answer);
    let correct = LETTERS
        .iter()
        .position(|l| answer.len() == 1 && answer.starts_with(*l))
        .ok_or_else(|| format!("answer '{}' is not one of A, B, C, D", mcq.answer))?;

    let explanation = mcq.explanation.trim().to_string();
    if explanation.is_empty() {
        return Err("explanation is empty".to_string());
    }

    Ok(Question {
        prompt,
        options,
        correct,
        explanation,
        topic: topic.to_string(),
        sources,
    })
}

pub fn build_prompt(context: &str) -> String {
    format!(
        r#"Write ONE multiple-choice question based ONLY on the context below.
Rules:
- Do not invent anything beyond what the context states.
- Do not use phrases like "according to the text", "based on the context" or similar.
- The question must be direct and clear, without mentioning the text or the context.
- Write exactly 4 options.
- Do NOT put labels or letters on the options (no "A)", "B.", etc). Give only the plain text of each option.
- Exactly 1 option is correct and supported by the context.
- Write the question, options and explanation in the same language as the context.

Context:
{context}

EXACT response format (valid JSON only):
{{
  "question": "direct question that does not mention the text",
  "options": ["option 1 text", "option 2 text", "option 3 text", "option 4 text"],
  "answer": "D",
  "explanation": "short justification based on the context"
}}"#
    )
}

/// Ask the model for one question about `context` and validate it.
#[instrument(skip(resolver, context, sources), fields(context_len = context.len()))]
pub async fn generate_mcq<C: LowLevelClient>(
    resolver: &QueryResolver<C>,
    context: &str,
    topic: &str,
    sources: Vec<String>,
) -> Result<Question, QueryResolverError> {
    let question = resolver
        .query_validated::<Mcq, _, _>(build_prompt(context), |mcq| validate_mcq(mcq, topic, sources.clone()))
        .await?;
    debug!(answer = %question.correct_letter(), "Generated question");
    Ok(question)
}

pub fn save_questions_json(questions: &[Question], path: &Path) -> Result<(), QuizError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(questions)?)?;
    Ok(())
}

pub fn load_questions_json(path: &Path) -> Result<Vec<Question>, QuizError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::{MockClient, MockResponse};
    use crate::core::RetryConfig;

    fn mcq(options: &[&str], answer: &str) -> Mcq {
        Mcq {
            question: "Qual é o prazo de pagamento?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            answer: answer.into(),
            explanation: "O regulamento fixa 30 dias.".into(),
        }
    }

    #[test]
    fn labels_are_stripped_from_options() {
        assert_eq!(strip_option_label("A) 30 dias"), "30 dias");
        assert_eq!(strip_option_label("(b) 60 dias"), "60 dias");
        assert_eq!(strip_option_label("C. Nunca"), "Nunca");
        assert_eq!(strip_option_label("1.000 pontos"), "1.000 pontos");
        assert_eq!(strip_option_label("Ativação imediata"), "Ativação imediata");
    }

    #[test]
    fn answers_are_normalised() {
        assert_eq!(normalize_answer(" b) "), "B");
        assert_eq!(normalize_answer("\"d\""), "D");
        assert_eq!(normalize_answer("C."), "C");
    }

    #[test]
    fn valid_mcq_becomes_question() {
        let q = validate_mcq(mcq(&["A) 10 dias", "B) 30 dias", "C) 60 dias", "D) 90 dias"], "b"), "Prazo", vec![])
            .unwrap();
        assert_eq!(q.options[1], "30 dias");
        assert_eq!(q.correct, 1);
        assert_eq!(q.correct_letter(), 'B');
        assert_eq!(q.correct_option(), "30 dias");
        assert_eq!(q.topic, "Prazo");
    }

    #[test]
    fn invalid_mcqs_are_rejected() {
        let three = validate_mcq(mcq(&["a1", "a2", "a3"], "A"), "t", vec![]).unwrap_err();
        assert!(three.contains("expected 4 options"));

        let dup = validate_mcq(mcq(&["Sim", "sim", "Não", "Talvez"], "A"), "t", vec![]).unwrap_err();
        assert!(dup.contains("distinct"));

        let empty = validate_mcq(mcq(&["A)", "x", "y", "z"], "B"), "t", vec![]).unwrap_err();
        assert!(empty.contains("option A is empty"));

        let letter = validate_mcq(mcq(&["w", "x", "y", "z"], "E"), "t", vec![]).unwrap_err();
        assert!(letter.contains("not one of"));

        let mut no_expl = mcq(&["w", "x", "y", "z"], "A");
        no_expl.explanation = "  ".into();
        assert!(validate_mcq(no_expl, "t", vec![]).is_err());
    }

    #[test]
    fn prompt_embeds_context_and_rules() {
        let prompt = build_prompt("O prazo é de 30 dias.");
        assert!(prompt.contains("Context:\nO prazo é de 30 dias."));
        assert!(prompt.contains("exactly 4 options"));
        assert!(prompt.contains("\"answer\": \"D\""));
    }

    #[tokio::test]
    async fn generation_retries_invalid_replies() {
        let (client, handle) = MockClient::with_responses(vec![
            MockResponse::Success(r#"{"question": "Q?", "options": ["a", "b"], "answer": "A", "explanation": "e"}"#.into()),
            MockResponse::Success(
                r#"Aqui está: {"question": "Q?", "options": ["a", "b", "c", "d"], "answer": "c", "explanation": "e"}"#
                    .into(),
            ),
        ]);
        let resolver = QueryResolver::new(client, RetryConfig::default());

        let q = generate_mcq(&resolver, "ctx", "Prazo", vec!["Doc (pages 1-2)".into()]).await.unwrap();
        assert_eq!(q.correct, 2);
        assert_eq!(q.sources, vec!["Doc (pages 1-2)"]);
        assert_eq!(handle.call_count(), 2);
    }

    #[test]
    fn questions_survive_a_save_and_load() {
        let path = std::env::temp_dir().join(format!("reg-quiz-q-{}", uuid::Uuid::new_v4())).join("questions.json");
        let q = validate_mcq(mcq(&["w", "x", "y", "z"], "A"), "t", vec![]).unwrap();
        save_questions_json(std::slice::from_ref(&q), &path).unwrap();
        assert_eq!(load_questions_json(&path).unwrap(), vec![q]);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn loading_rejects_an_out_of_range_answer() {
        let dir = std::env::temp_dir().join(format!("reg-quiz-q-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("questions.json");
        std::fs::write(
            &path,
            r#"[{"prompt": "P?", "options": ["a", "b", "c", "d"], "correct": 7, "explanation": "e", "topic": "t"}]"#,
        )
        .unwrap();

        match load_questions_json(&path) {
            Err(QuizError::Json(e)) => assert!(e.to_string().contains("correct index 7")),
            other => panic!("unexpected result: {other:?}"),
        }
        std::fs::remove_dir_all(dir).unwrap();
    }
}
