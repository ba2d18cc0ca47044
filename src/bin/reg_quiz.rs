use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reg_quiz::clients::GeminiClient;
use reg_quiz::config::{
    ChunkConfig, GeminiConfig, PipelineConfig, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL,
};
use reg_quiz::core::{QueryResolver, RetryConfig, JSON_PARSE_ERROR, VALIDATION_ERROR};
use reg_quiz::interceptors::FileInterceptor;
use reg_quiz::mcq::{load_questions_json, save_questions_json, Question};
use reg_quiz::pipeline::{build_knowledge_base, generate_questions, ingest};
use reg_quiz::{KnowledgeBase, QuizSession};

#[derive(Parser)]
#[command(author, version, about = "Multiple-choice quizzes generated from regulation PDFs", long_about = None)]
#[command(after_help = "ENVIRONMENT VARIABLES:
    GEMINI_API_KEY  API key for the Gemini API (also read from .env)
    RUST_LOG        Log filter, e.g. reg_quiz=debug [default: info]

EXAMPLES:
    reg-quiz run --pdf regulamentos.pdf
    reg-quiz ingest --pdf regulamentos.pdf --out kb
    reg-quiz generate --kb kb --out questions.json --questions-count 5
    reg-quiz quiz --questions questions.json --report report.json")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: Options,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed a PDF, then save the knowledge base
    Ingest {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long, default_value = "kb")]
        out: PathBuf,
    },
    /// Generate questions from a saved knowledge base
    Generate {
        #[arg(long, default_value = "kb")]
        kb: PathBuf,
        #[arg(long, default_value = "questions.json")]
        out: PathBuf,
    },
    /// Run the quiz from saved questions
    Quiz {
        #[arg(long, default_value = "questions.json")]
        questions: PathBuf,
        #[arg(long, default_value = "quiz_report.json")]
        report: PathBuf,
    },
    /// Full pipeline followed by the quiz
    Run {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long, default_value = "quiz_report.json")]
        report: PathBuf,
        /// Also keep the knowledge base in this directory
        #[arg(long)]
        save_kb: Option<PathBuf>,
        /// Also keep the generated questions in this file
        #[arg(long)]
        save_questions: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Options {
    /// Generation model
    #[arg(long, global = true, default_value = DEFAULT_GENERATION_MODEL)]
    model: String,

    /// Embedding model
    #[arg(long, global = true, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Characters per chunk
    #[arg(long, global = true, default_value_t = 900)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true, default_value_t = 200)]
    overlap: usize,

    /// Texts per embedding request
    #[arg(long, global = true, default_value_t = 50)]
    batch_size: usize,

    /// Passages retrieved per question
    #[arg(long, global = true, default_value_t = 5)]
    top_k: usize,

    /// Context budget in characters
    #[arg(long, global = true, default_value_t = 3000)]
    char_limit: usize,

    /// Leave source headers out of the context
    #[arg(long, global = true)]
    no_source_headers: bool,

    /// Number of questions to generate
    #[arg(long, global = true, default_value_t = 10)]
    questions_count: usize,

    /// Known document title; repeat to replace the built-in list
    #[arg(long = "document-title", global = true)]
    document_titles: Vec<String>,

    /// Retries for malformed or invalid model replies
    #[arg(long, global = true, default_value_t = 2)]
    retries: usize,

    /// Write every prompt and reply to this directory
    #[arg(long, global = true)]
    trace_dir: Option<PathBuf>,
}

impl Options {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_chunking(ChunkConfig { chunk_size: self.chunk_size, overlap: self.overlap })
            .with_top_k(self.top_k)
            .with_question_count(self.questions_count);
        config.embed_batch_size = self.batch_size;
        config.context_char_limit = self.char_limit;
        config.include_source_headers = !self.no_source_headers;
        if !self.document_titles.is_empty() {
            config = config.with_document_titles(self.document_titles.clone());
        }
        config
    }

    fn client(&self) -> Result<GeminiClient> {
        let config = GeminiConfig::default()
            .with_model(&self.model)
            .with_embedding_model(&self.embedding_model);
        GeminiClient::from_env(config).context("Gemini API key is required (set GEMINI_API_KEY)")
    }

    fn resolver(&self, client: GeminiClient) -> QueryResolver<GeminiClient> {
        let retry = RetryConfig::default()
            .with_budget(JSON_PARSE_ERROR, self.retries)
            .with_budget(VALIDATION_ERROR, self.retries);
        let resolver = QueryResolver::new(client, retry);
        match &self.trace_dir {
            Some(dir) => resolver.with_interceptor(Arc::new(FileInterceptor::new(dir.clone()))),
            None => resolver,
        }
    }
}

async fn build_kb(pdf: &Path, client: &GeminiClient, config: &PipelineConfig) -> Result<KnowledgeBase> {
    let chunks = ingest(pdf, config).with_context(|| format!("Failed to ingest {}", pdf.display()))?;
    build_knowledge_base(chunks, client, config)
        .await
        .context("Failed to build the knowledge base")
}

async fn generate(kb: &KnowledgeBase, client: GeminiClient, opts: &Options) -> Result<Vec<Question>> {
    let config = opts.pipeline_config();
    let resolver = opts.resolver(client.clone());
    generate_questions(kb, &resolver, &client, &config)
        .await
        .context("Question generation failed")
}

fn run_quiz(questions: Vec<Question>, source: &str, report_path: &Path) -> Result<()> {
    let session = QuizSession::new(questions, source);
    let report = session.run(io::stdin().lock(), &mut io::stdout())?;
    report
        .write_json(report_path)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
    println!("Report saved to {}", report_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let opts = &cli.opts;

    match &cli.command {
        Command::Ingest { pdf, out } => {
            let client = opts.client()?;
            let kb = build_kb(pdf, &client, &opts.pipeline_config()).await?;
            kb.save(out).with_context(|| format!("Failed to save knowledge base to {}", out.display()))?;
            info!(chunks = kb.len(), out = %out.display(), "Knowledge base ready");
        }
        Command::Generate { kb, out } => {
            let knowledge = KnowledgeBase::load(kb)
                .with_context(|| format!("Failed to load knowledge base from {}", kb.display()))?;
            let questions = generate(&knowledge, opts.client()?, opts).await?;
            save_questions_json(&questions, out)?;
            info!(questions = questions.len(), out = %out.display(), "Questions saved");
        }
        Command::Quiz { questions, report } => {
            let loaded = load_questions_json(questions)
                .with_context(|| format!("Failed to load questions from {}", questions.display()))?;
            run_quiz(loaded, &questions.display().to_string(), report)?;
        }
        Command::Run { pdf, report, save_kb, save_questions } => {
            let client = opts.client()?;
            let kb = build_kb(pdf, &client, &opts.pipeline_config()).await?;
            if let Some(dir) = save_kb {
                kb.save(dir)?;
            }
            let questions = generate(&kb, client, opts).await?;
            if let Some(path) = save_questions {
                save_questions_json(&questions, path)?;
            }
            run_quiz(questions, &pdf.display().to_string(), report)?;
        }
    }

    Ok(())
}
