use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use copymill::creator::GenerationOutcome;
use copymill::store::memory::MemoryStore;
use copymill::{
    CompletionClient, Config, Generator, ImagePipeline, OpenAiCompletions, OpenAiImages,
};

#[derive(Parser)]
#[command(name = "copymill", about = "Content generation pipeline", version)]
struct Cli {
    /// JSON fixture seeding the in-memory store.
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate content for a stored prompt (short- or long-form per its params).
    Generate {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        prompt: i64,
    },
    /// Generate a topic list for an explicit topic.
    Topics {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        prompt: i64,
        #[arg(long)]
        topic: String,
    },
    /// Generate and store images for an existing content row.
    Images {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        content: i64,
        #[arg(long)]
        iprompt: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store: Arc<MemoryStore> = Arc::new(match &cli.seed {
        Some(path) => MemoryStore::from_seed_file(path)
            .with_context(|| format!("loading seed fixture {}", path.display()))?,
        None => MemoryStore::new(),
    });
    let client = Arc::new(CompletionClient::new(
        Arc::new(OpenAiCompletions::new(&config)),
        store.clone(),
        &config,
    ));

    match cli.command {
        Command::Generate { user, prompt } => {
            let generator = Generator::new(store.clone(), client, config);
            let outcome = generator.generate(user, prompt, None).await?;
            report(&store, outcome);
        }
        Command::Topics {
            user,
            prompt,
            topic,
        } => {
            let generator = Generator::new(store.clone(), client, config);
            let outcome = generator.generate(user, prompt, Some(&topic)).await?;
            report(&store, outcome);
        }
        Command::Images {
            user,
            content,
            iprompt,
        } => {
            let images = ImagePipeline::new(
                store.clone(),
                Arc::new(OpenAiImages::new(&config)),
                client,
                &config,
            );
            let filenames = images.run(user, content, iprompt).await?;
            info!(count = filenames.len(), "images stored");
            for filename in filenames {
                println!("{filename}");
            }
        }
    }

    Ok(())
}

fn report(store: &MemoryStore, outcome: GenerationOutcome) {
    match outcome {
        GenerationOutcome::Topics(topics) => {
            for (i, topic) in topics.iter().enumerate() {
                println!("{}. {topic}", i + 1);
            }
        }
        GenerationOutcome::Content {
            content_id,
            debug: is_debug,
        } => {
            info!(content_id, debug = is_debug, "content persisted");
            if let Some(content) = store.contents().into_iter().find(|c| c.id == content_id) {
                println!("# {}\n\n{}", content.title, content.text);
            }
        }
    }
}
