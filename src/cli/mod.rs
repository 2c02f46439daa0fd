//! CLI module
//!
//! helpdesk-rag command definitions and implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::call::CallAnalyzer;
use crate::completion::create_completer;
use crate::config::{api_key, Config, ELEVENLABS_KEY_VARS};
use crate::embedding::create_embedder;
use crate::faq::{FaqPipeline, Query};
use crate::knowledge::{load_chunks, ChunkConfig, FaqEntry, KnowledgeStore, RecursiveChunker};
use crate::server::run_server;
use crate::voice::VoiceSynthesizer;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "helpdesk-rag")]
#[command(version, about = "Customer FAQ answering over a local knowledge base", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Answer one question
    Ask {
        /// Customer question
        question: String,

        /// Extra context placed before the retrieved knowledge
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Append an FAQ entry and rebuild the index
    AddFaq {
        #[arg(short, long)]
        question: String,

        #[arg(short, long)]
        answer: String,

        #[arg(long, default_value = "general")]
        category: String,
    },

    /// Show configuration and knowledge base status (no embedding calls)
    Stats,

    /// Summarise a call transcript
    SummarizeCall {
        /// Transcript text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// File containing the transcript
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Synthesize speech to an MP3 file
    Speak {
        #[arg(short, long)]
        text: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Voice to use instead of the configured one
        #[arg(long)]
        voice_id: Option<String>,
    },

    /// List available voices
    Voices,
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => run_server(&config).await,
        Commands::Ask { question, context } => cmd_ask(&config, question, context).await,
        Commands::AddFaq {
            question,
            answer,
            category,
        } => cmd_add_faq(&config, question, answer, category).await,
        Commands::Stats => cmd_stats(&config).await,
        Commands::SummarizeCall { text, file } => cmd_summarize_call(&config, text, file).await,
        Commands::Speak {
            text,
            out,
            voice_id,
        } => cmd_speak(&config, &text, &out, voice_id.as_deref()).await,
        Commands::Voices => cmd_voices(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<KnowledgeStore>> {
    let embedder = create_embedder(&config.embedding)?;
    let store = KnowledgeStore::open(&config.knowledge, embedder).await?;
    Ok(Arc::new(store))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(config: &Config, question: String, context: Option<String>) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let store = open_store(config).await?;
    let completer = create_completer(&config.completion)?;
    let pipeline = FaqPipeline::new(store, completer, &config.faq);

    let query = Query { question, context };
    let result = pipeline.answer_question(&query).await;

    println!("{}", result.answer);
    println!();
    println!(
        "[*] confidence: {:.2}  source: {}",
        result.confidence,
        result.source.as_str()
    );
    if !result.related_questions.is_empty() {
        println!("[*] related questions:");
        for q in &result.related_questions {
            println!("    - {}", truncate_text(q, 120));
        }
    }

    Ok(())
}

async fn cmd_add_faq(
    config: &Config,
    question: String,
    answer: String,
    category: String,
) -> Result<()> {
    if question.trim().is_empty() || answer.trim().is_empty() {
        bail!("--question and --answer must not be empty");
    }

    let store = open_store(config).await?;
    let entry = FaqEntry {
        question,
        answer,
        category,
    };
    let stats = store.add_faq_entry(&entry).await?;

    println!("[OK] Entry added to {}", store.faq_path().display());
    println!("     Knowledge base: {} chunks", stats.documents);
    Ok(())
}

async fn cmd_stats(config: &Config) -> Result<()> {
    println!("helpdesk-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Knowledge directory: {}", config.knowledge.dir.display());
    for path in config.knowledge.file_paths() {
        match std::fs::metadata(&path) {
            Ok(meta) => println!(
                "    {} ({})",
                path.display(),
                format_bytes(meta.len() as usize)
            ),
            Err(_) => println!("    {} (missing)", path.display()),
        }
    }

    for (label, provider) in [
        ("Completion", config.completion.provider),
        ("Embedding", config.embedding.provider),
    ] {
        if provider.has_api_key() {
            println!("[OK] {} API key ({:?}): set", label, provider);
        } else {
            println!("[!] {} API key ({:?}): not set", label, provider);
            println!("    export {}=your-key", provider.key_vars()[0]);
        }
    }
    if api_key(ELEVENLABS_KEY_VARS).is_ok() {
        println!("[OK] Voice API key: set");
    } else {
        println!("[!] Voice API key: not set");
    }
    println!();

    let chunks = count_chunks(config).await?;
    if chunks == 0 {
        println!("[!] Knowledge base: empty");
    } else {
        println!("[OK] Knowledge base: {} chunks to index", chunks);
    }

    Ok(())
}

/// Chunks the configured files would produce, without embedding them.
async fn count_chunks(config: &Config) -> Result<usize> {
    let k = &config.knowledge;
    let chunker = RecursiveChunker::new(ChunkConfig::new(k.chunk_size, k.chunk_overlap))?;
    Ok(load_chunks(&k.file_paths(), &chunker).await.len())
}

async fn cmd_summarize_call(
    config: &Config,
    text: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let transcription = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read transcript {}", path.display()))?,
        (None, None) => bail!("--text or --file is required"),
    };
    if transcription.trim().is_empty() {
        bail!("transcript is empty");
    }

    let analyzer = CallAnalyzer::new(create_completer(&config.completion)?);
    let report = analyzer.summarize(&transcription).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_speak(
    config: &Config,
    text: &str,
    out: &std::path::Path,
    voice_id: Option<&str>,
) -> Result<()> {
    let voice = VoiceSynthesizer::from_env(&config.voice)?;
    let audio = voice.synthesize(text, voice_id).await?;

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(out, &audio)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "[OK] Wrote {} ({})",
        out.display(),
        format_bytes(audio.len())
    );
    Ok(())
}

async fn cmd_voices(config: &Config) -> Result<()> {
    let voice = VoiceSynthesizer::from_env(&config.voice)?;
    let voices = voice.list_voices().await?;

    if voices.is_empty() {
        println!("[!] No voices available.");
        return Ok(());
    }

    println!("[OK] Voices ({}):\n", voices.len());
    for v in &voices {
        let marker = if v.voice_id == voice.default_voice_id() {
            "*"
        } else {
            " "
        };
        println!(
            " {} {:<24} {} {}",
            marker,
            v.voice_id,
            truncate_text(&v.name, 40),
            v.category.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Single-line, char-safe truncation
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
