mod config;
mod download;
mod embeddings;
mod llm;
mod logging;
mod summarize;
mod text_prep;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use serde::Serialize;

use crate::embeddings::engine::{self, EmbeddingEngine};
use crate::embeddings::pooling::{self, EmbedOptions};
use crate::llm::{GenerationConfig, GgufGenerator, HttpGenerator, TextGenerator};
use crate::summarize::{RecursiveCharacterSplitter, ReduceSettings, SummaryRequest};

const USAGE: &str = "\
Usage:
  recap [summarize] [--transcript PATH] [--topic TOPIC] [--focus FOCUS]
                    [--config GEN_CONFIG.json] [--backend gguf|http] [--endpoint URL]
                    [--llm-model PATH.gguf] [--llm-tokenizer PATH] [--device cpu|cuda:N]
                    [--chunk-size CHARS] [--token-max TOKENS] [--show-input] [--show-steps]
  recap embed --input SENTENCES.txt [--batch-size N] [--max-seq-len N]
              [--device cpu|cuda:N] [--model-dir DIR] [--normalize]
  recap --help
";

const SUMMARIZE_VALUE_ARGS: &[&str] = &[
    "--transcript",
    "--topic",
    "--focus",
    "--config",
    "--backend",
    "--endpoint",
    "--llm-model",
    "--llm-tokenizer",
    "--device",
    "--chunk-size",
    "--token-max",
];
const SUMMARIZE_FLAG_ARGS: &[&str] = &["--show-input", "--show-steps"];

const EMBED_VALUE_ARGS: &[&str] = &["--input", "--batch-size", "--max-seq-len", "--device", "--model-dir"];
const EMBED_FLAG_ARGS: &[&str] = &["--normalize"];

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().skip(1).any(|a| a == "--help" || a == "-h") {
        print!("{USAGE}");
        return;
    }

    let logger = match logging::init_logging() {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("[recap] fatal error: {e:?}");
            std::process::exit(1);
        }
    };

    if let Err(e) = real_main(&args) {
        // Duplicate::Warn copies this line to stderr.
        log::error!("[recap] fatal error: {:?}", e);
        logger.flush();
        std::process::exit(1);
    }
}

fn real_main(args: &[String]) -> anyhow::Result<()> {
    match args.get(1).map(String::as_str) {
        None => run_summarize(&[]),
        Some("summarize") => run_summarize(&args[2..]),
        Some("embed") => run_embed(&args[2..]),
        Some(a) if a.starts_with("--") => run_summarize(&args[1..]),
        Some(other) => Err(anyhow::anyhow!(
            "unknown command '{other}' (expected summarize or embed)\n\n{USAGE}"
        )),
    }
}

fn run_summarize(args: &[String]) -> anyhow::Result<()> {
    reject_unknown_args(args, SUMMARIZE_VALUE_ARGS, SUMMARIZE_FLAG_ARGS)?;

    // Read and validate inputs before loading (or downloading) any model.
    let transcript_path = read_arg_value(args, "--transcript")
        .unwrap_or_else(|| config::summarize::DEFAULT_TRANSCRIPT_PATH.to_string());
    let transcript = text_prep::read_transcript(Path::new(&transcript_path))?;
    if transcript.trim().is_empty() {
        bail!("transcript {transcript_path} is empty");
    }

    let gen_config = match read_arg_value(args, "--config") {
        Some(p) => GenerationConfig::from_json_file(Path::new(&p))?,
        None => GenerationConfig::default(),
    };

    let request = SummaryRequest {
        topic: read_arg_value(args, "--topic").unwrap_or_else(|| config::summarize::DEFAULT_TOPIC.to_string()),
        focus: read_arg_value(args, "--focus").unwrap_or_else(|| config::summarize::DEFAULT_FOCUS.to_string()),
        source: config::summarize::DOCUMENT_SOURCE.to_string(),
        chunk_size: parse_usize_arg(args, "--chunk-size", config::summarize::CHUNK_SIZE_CHARS)?,
        reduce: ReduceSettings {
            token_max: parse_usize_arg(args, "--token-max", config::summarize::TOKEN_MAX)?,
            max_collapse_passes: config::summarize::MAX_COLLAPSE_PASSES,
        },
    };
    request.validate()?;

    log::info!(
        "Summarizing {} ({} chars), topic='{}', focus='{}', config={:?}",
        transcript_path,
        transcript.chars().count(),
        request.topic,
        request.focus,
        gen_config
    );

    if has_flag(args, "--show-input") {
        println!("Input text:");
        println!("{transcript}");
    }

    let mut generator = load_generator(args)?;

    let start = Instant::now();
    let output = summarize::summarize_transcript(
        generator.as_mut(),
        &RecursiveCharacterSplitter::default(),
        &transcript,
        &gen_config,
        &request,
    )?;
    let minutes = start.elapsed().as_secs_f64() / 60.0;
    for (i, pass) in output.trace.collapse_passes.iter().enumerate() {
        log::info!(
            "Collapse pass {}: {} summaries -> {} ({} -> {} tokens)",
            i + 1,
            pass.docs_before,
            pass.groups,
            pass.tokens_before,
            pass.tokens_after
        );
    }
    log::info!("Final reduce prompt: {} tokens", output.trace.final_prompt_tokens);
    log::info!(
        "Summary done in {:.2} minutes ({} chunks, {} collapse passes)",
        minutes,
        output.intermediate_steps.len(),
        output.trace.collapse_passes.len()
    );
    println!("Time taken: {minutes} minutes.");

    if has_flag(args, "--show-steps") {
        println!("Section summaries:");
        for (i, step) in output.intermediate_steps.iter().enumerate() {
            println!("[{}] {}", i + 1, step);
        }
    }

    println!("Summary:");
    println!("{}", output.output_text);
    Ok(())
}

fn load_generator(args: &[String]) -> anyhow::Result<Box<dyn TextGenerator>> {
    let backend = read_arg_value(args, "--backend").unwrap_or_else(|| "gguf".to_string());
    match backend.as_str() {
        "gguf" => {
            let device = engine::parse_device(&read_arg_value(args, "--device").unwrap_or_else(|| "cpu".to_string()))?;
            let (weights, tokenizer) = match (read_arg_value(args, "--llm-model"), read_arg_value(args, "--llm-tokenizer")) {
                (Some(w), Some(t)) => (PathBuf::from(w), PathBuf::from(t)),
                (None, None) => llm::gguf::ensure_model_files()?,
                _ => bail!("--llm-model and --llm-tokenizer must be given together"),
            };
            Ok(Box::new(GgufGenerator::load(&weights, &tokenizer, device)?))
        }
        "http" => {
            let endpoint =
                read_arg_value(args, "--endpoint").unwrap_or_else(|| config::llm::DEFAULT_HTTP_ENDPOINT.to_string());
            log::info!("Using llama.cpp server at {}", endpoint);
            Ok(Box::new(HttpGenerator::new(&endpoint)))
        }
        other => bail!("unknown backend '{other}' (expected gguf or http)"),
    }
}

#[derive(Serialize)]
struct EmbedOutput<'a> {
    rows: usize,
    dims: usize,
    embeddings: Vec<&'a [f32]>,
}

fn run_embed(args: &[String]) -> anyhow::Result<()> {
    reject_unknown_args(args, EMBED_VALUE_ARGS, EMBED_FLAG_ARGS)?;

    let input = read_arg_value(args, "--input").context("missing --input")?;
    let sentences = text_prep::read_sentences(Path::new(&input))?;

    let options = EmbedOptions {
        batch_size: parse_usize_arg(args, "--batch-size", config::embedding::DEFAULT_BATCH_SIZE)?,
        max_seq_len: parse_usize_arg(args, "--max-seq-len", config::embedding::DEFAULT_MAX_SEQ_LEN)?,
        normalize: has_flag(args, "--normalize"),
    };
    let device = engine::parse_device(&read_arg_value(args, "--device").unwrap_or_else(|| "cpu".to_string()))?;

    let model_dir = match read_arg_value(args, "--model-dir") {
        Some(d) => PathBuf::from(d),
        None => engine::ensure_model_files()?,
    };
    let engine = EmbeddingEngine::load(&model_dir, device)?;

    let start = Instant::now();
    let matrix = pooling::embed_sentences(&sentences, &engine, &engine, &options)?;
    log::info!(
        "Embedded {} sentences from {} in {:.2}s",
        matrix.rows(),
        input,
        start.elapsed().as_secs_f64()
    );

    let out = EmbedOutput {
        rows: matrix.rows(),
        dims: matrix.dims(),
        embeddings: matrix.iter_rows().collect(),
    };
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer(&mut lock, &out).context("failed writing embeddings")?;
    writeln!(lock)?;
    Ok(())
}

fn read_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn parse_usize_arg(args: &[String], key: &str, default: usize) -> anyhow::Result<usize> {
    match read_arg_value(args, key) {
        Some(v) => v.parse().with_context(|| format!("invalid value for {key}: '{v}'")),
        None => Ok(default),
    }
}

fn reject_unknown_args(args: &[String], value_args: &[&str], flag_args: &[&str]) -> anyhow::Result<()> {
    let mut i = 0;
    while i < args.len() {
        let a = args[i].as_str();
        if value_args.contains(&a) {
            if args.get(i + 1).is_none() {
                bail!("missing value for {a}");
            }
            i += 2;
        } else if flag_args.contains(&a) {
            i += 1;
        } else {
            bail!("unknown argument '{a}'\n\n{USAGE}");
        }
    }
    Ok(())
}
