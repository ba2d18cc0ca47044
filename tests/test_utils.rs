#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use reg_quiz::clients::mock::{MockClient, MockHandle, MockResponse};
use reg_quiz::core::{QueryResolver, RetryConfig};
use reg_quiz::mcq::Question;

/// A small two-page regulation in the layout the extractor expects.
/// Pages are separated by form feeds.
pub const REGULATION: &str = "Regulamento Ponto Ton\n\
1. Objetivo:\n\
O programa Ponto Ton recompensa clientes que realizam vendas com a maquininha durante o período da campanha.\n\
2. Prazo:\n\
Os pontos serão creditados em até trinta dias após a confirmação de cada venda aprovada.\
\u{000C}\
3. Resgate:\n\
Os pontos acumulados podem ser trocados por produtos do catálogo oficial dentro do aplicativo.";

/// Fresh directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Write `contents` to `name` inside a fresh temp directory.
pub fn write_document(name: &str, contents: &str) -> PathBuf {
    let path = temp_dir("reg-quiz-doc").join(name);
    std::fs::write(&path, contents).expect("write document");
    path
}

/// Write a PDF with one page per entry of `pages`, each line set on its own
/// baseline in Courier. Text must be ASCII.
pub fn write_pdf(name: &str, pages: &[&[&str]]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Td", vec![50.into(), 780.into()]),
        ];
        for line in lines.iter() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode page")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = temp_dir("reg-quiz-pdf").join(name);
    doc.save(&path).expect("write pdf");
    path
}

/// Model reply in the shape the generator asks for.
pub fn mcq_json(question: &str, options: [&str; 4], answer: &str) -> String {
    serde_json::json!({
        "question": question,
        "options": options,
        "answer": answer,
        "explanation": format!("A resposta correta é {}.", answer),
    })
    .to_string()
}

/// Resolver over a `MockClient` preloaded with successful replies.
pub fn mock_resolver(replies: Vec<String>, config: RetryConfig) -> (QueryResolver<MockClient>, Arc<MockHandle>) {
    let (client, handle) = MockClient::with_responses(replies.into_iter().map(MockResponse::Success).collect());
    (QueryResolver::new(client, config), handle)
}

pub fn question(prompt: &str, correct: usize) -> Question {
    Question {
        prompt: prompt.to_string(),
        options: ["10 dias".into(), "30 dias".into(), "60 dias".into(), "90 dias".into()],
        correct,
        explanation: format!("Explicação para {}", prompt),
        topic: "Prazo".to_string(),
        sources: vec!["Regulamento Ponto Ton (pages 1-1)".to_string()],
    }
}
