#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use frq_mentor::gateway::{NoopUsageSink, ProviderGateway, StderrUsageSink};
use frq_mentor::pipeline::{AnswerSource, MentorPipeline, PipelineConfig, DEFAULT_MODEL_ID};
use frq_mentor::retrieval::WikipediaSource;
use frq_mentor::student::AnswerQuality;
use frq_mentor::ChatModel;

#[derive(Parser)]
#[command(name = "mentor", version, about = "FRQ mentoring pipeline CLI")]
struct Cli {
    /// Topic to build the session around, e.g. "photosynthesis"
    topic: String,

    /// Quality of the synthesized student answer
    #[arg(long, value_enum, default_value_t = CliQuality::Mediocre)]
    quality: CliQuality,

    /// Use this file's contents as the student answer instead of synthesizing one
    #[arg(long)]
    answer_file: Option<PathBuf>,

    /// Model to use for all evaluator calls
    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    model: String,

    /// Number of candidate questions to generate before ranking
    #[arg(long, default_value_t = 5)]
    questions: usize,

    /// Skip the text cleanup pass
    #[arg(long)]
    no_clean: bool,

    /// Write the session record JSON here (defaults to stdout)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log each provider call as a JSON line on stderr
    #[arg(long)]
    usage: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliQuality {
    Good,
    Mediocre,
    Poor,
}

impl From<CliQuality> for AnswerQuality {
    fn from(q: CliQuality) -> Self {
        match q {
            CliQuality::Good => AnswerQuality::Good,
            CliQuality::Mediocre => AnswerQuality::Mediocre,
            CliQuality::Poor => AnswerQuality::Poor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let gateway: Arc<dyn frq_mentor::ChatGateway> = if cli.usage {
        Arc::new(ProviderGateway::from_env(Arc::new(StderrUsageSink))?)
    } else {
        Arc::new(ProviderGateway::from_env(Arc::new(NoopUsageSink))?)
    };

    let config = PipelineConfig {
        model: ChatModel::openai(cli.model),
        question_count: cli.questions,
        clean_text: !cli.no_clean,
    };
    let pipeline = MentorPipeline::new(gateway, config);

    let answer_source = match cli.answer_file {
        Some(path) => AnswerSource::Provided(tokio::fs::read_to_string(path).await?),
        None => AnswerSource::Synthesize(cli.quality.into()),
    };

    let source = WikipediaSource::new()?;
    let session = pipeline.run(&source, &cli.topic, answer_source).await?;

    let json = serde_json::to_string_pretty(&session)?;
    match cli.out {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{json}"),
    }

    Ok(())
}
