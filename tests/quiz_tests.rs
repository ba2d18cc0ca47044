mod test_utils;

use reg_quiz::{QuizReport, QuizSession};

use crate::test_utils::{question, temp_dir};

fn run(correct: &[usize], input: &str) -> (QuizReport, String) {
    let questions = correct
        .iter()
        .enumerate()
        .map(|(i, c)| question(&format!("Pergunta {}?", i + 1), *c))
        .collect();
    let mut out = Vec::new();
    let report = QuizSession::new(questions, "regulamento.pdf")
        .run(input.as_bytes(), &mut out)
        .unwrap();
    (report, String::from_utf8(out).unwrap())
}

#[test]
fn score_counts_correct_answers_out_of_ten() {
    let correct: Vec<usize> = (0..10).map(|i| i % 4).collect();
    let (report, output) = run(&correct, &"A\n".repeat(10));

    assert_eq!(report.total_questions, 10);
    assert_eq!(report.answered, 10);
    assert_eq!(report.score, 3);
    assert_eq!(report.score, report.answers.iter().filter(|a| a.is_correct).count());
    assert!((report.percentage - 30.0).abs() < 1e-9);
    assert!(report.completed);
    assert!(output.contains("Score: 3/10 (30.0%)"));
}

#[test]
fn invalid_input_reprompts_until_a_valid_answer() {
    let (report, output) = run(&[1], "\nfoo\n7\n2\n");

    assert_eq!(report.score, 1);
    assert_eq!(report.answers[0].selected, 'B');
    assert_eq!(output.matches("Please answer with A, B, C or D").count(), 3);
    assert_eq!(output.matches("Your answer").count(), 4);
}

#[test]
fn wrong_answer_shows_the_correct_option_and_explanation() {
    let (report, output) = run(&[2], "a\n");

    assert_eq!(report.score, 0);
    let record = &report.answers[0];
    assert_eq!((record.selected, record.correct), ('A', 'C'));
    assert_eq!(record.selected_text, "10 dias");
    assert_eq!(record.correct_text, "60 dias");
    assert!(output.contains("The correct answer is C) 60 dias"));
    assert!(output.contains("Explanation: Explicação para Pergunta 1?"));
}

#[test]
fn options_are_listed_with_letters() {
    let (_, output) = run(&[0], "1\n");
    for line in ["  A) 10 dias", "  B) 30 dias", "  C) 60 dias", "  D) 90 dias"] {
        assert!(output.contains(line), "missing {line:?}");
    }
    assert!(output.contains("Correct!"));
}

#[test]
fn quit_ends_the_quiz_early() {
    let (report, output) = run(&[0, 1, 2], "a\nQuit\n");

    assert!(!report.completed);
    assert_eq!(report.answered, 1);
    assert_eq!(report.total_questions, 3);
    assert_eq!(report.score, 1);
    assert!(output.contains("ended early after 1 of 3"));
}

#[test]
fn end_of_input_ends_the_quiz_early() {
    let (report, _) = run(&[0, 1], "a");
    assert!(!report.completed);
    assert_eq!(report.answered, 1);
    assert_eq!(report.score, 1);
}

#[test]
fn report_is_written_as_json() {
    let (report, _) = run(&[0, 3], "a\nb\n");
    let path = temp_dir("reg-quiz-report").join("nested").join("report.json");
    report.write_json(&path).unwrap();

    let loaded: QuizReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded, report);
    assert_eq!(loaded.source, "regulamento.pdf");
    assert_eq!(loaded.score, 1);
    assert!((loaded.percentage - 50.0).abs() < 1e-9);
}
