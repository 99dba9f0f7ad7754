// summarize/ — Map-reduce transcript summarization against a text generator.
//
// split → map (one prompt per chunk, in order) → reduce (collapse until the
// summaries fit the token budget, then one final reduce).

use anyhow::bail;

use crate::config;
use crate::llm::{GenerationConfig, TextGenerator};

pub mod prompts;
pub mod reduce;
pub mod splitter;

pub use prompts::SummaryPrompts;
pub use reduce::{ReduceSettings, ReduceTrace};
pub use splitter::{RecursiveCharacterSplitter, Splitter};

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub topic: String,
    /// What the final summary should be "with respect to".
    pub focus: String,
    pub source: String,
    pub chunk_size: usize,
    pub reduce: ReduceSettings,
}

impl Default for SummaryRequest {
    fn default() -> Self {
        Self {
            topic: config::summarize::DEFAULT_TOPIC.to_string(),
            focus: config::summarize::DEFAULT_FOCUS.to_string(),
            source: config::summarize::DOCUMENT_SOURCE.to_string(),
            chunk_size: config::summarize::CHUNK_SIZE_CHARS,
            reduce: ReduceSettings::default(),
        }
    }
}

impl SummaryRequest {
    /// Reject settings that would make the run degenerate before any model work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk size must be at least 1 character");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SummaryOutput {
    pub output_text: String,
    /// Per-chunk map summaries, in chunk order.
    pub intermediate_steps: Vec<String>,
    pub trace: ReduceTrace,
}

pub fn summarize_transcript<G, S>(
    generator: &mut G,
    splitter: &S,
    transcript: &str,
    gen_config: &GenerationConfig,
    request: &SummaryRequest,
) -> anyhow::Result<SummaryOutput>
where
    G: TextGenerator + ?Sized,
    S: Splitter + ?Sized,
{
    if transcript.trim().is_empty() {
        bail!("transcript is empty");
    }
    request.validate()?;

    let chunks = splitter.split(transcript, &request.source, request.chunk_size);
    log::info!(
        "Split {} chars into {} chunks (max {} chars each)",
        transcript.chars().count(),
        chunks.len(),
        request.chunk_size
    );

    let prompts = SummaryPrompts::new(&request.topic, &request.focus);

    let mut intermediate_steps = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        log::info!(
            "Map step {}/{} ({}@{}, {} chars)",
            i + 1,
            chunks.len(),
            chunk.source,
            chunk.offset,
            chunk.text.chars().count()
        );
        let summary = generator.generate(&prompts.map(&chunk.text), gen_config)?;
        log::debug!("Map step {} summary: {}", i + 1, summary);
        intermediate_steps.push(summary);
    }

    let (output_text, trace) = reduce::reduce_summaries(
        generator,
        &prompts,
        intermediate_steps.clone(),
        &request.reduce,
        gen_config,
    )?;

    Ok(SummaryOutput {
        output_text,
        intermediate_steps,
        trace,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::llm::{GenerationConfig, TextGenerator};

    type Reply = Box<dyn FnMut(&str) -> anyhow::Result<String>>;

    /// Test generator: counts whitespace-separated words as tokens and records every prompt.
    pub(crate) struct ScriptedGenerator {
        pub prompts: Vec<String>,
        reply: Reply,
    }

    impl ScriptedGenerator {
        pub fn with(reply: impl FnMut(&str) -> anyhow::Result<String> + 'static) -> Self {
            Self {
                prompts: Vec::new(),
                reply: Box::new(reply),
            }
        }

        pub fn fixed(text: &str) -> Self {
            let text = text.to_string();
            Self::with(move |_| Ok(text.clone()))
        }

        pub fn failing_after(ok_calls: usize) -> Self {
            let mut calls = 0;
            Self::with(move |_| {
                calls += 1;
                if calls > ok_calls {
                    anyhow::bail!("model ran out of memory");
                }
                Ok("ok".to_string())
            })
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&mut self, prompt: &str, _config: &GenerationConfig) -> anyhow::Result<String> {
            self.prompts.push(prompt.to_string());
            (self.reply)(prompt)
        }

        fn count_tokens(&self, text: &str) -> anyhow::Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    /// `n` distinct words.
    pub fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{words, ScriptedGenerator};
    use super::*;

    const MAP_MARKER: &str = "Identify the main points of the section.";

    /// Map replies name the first word of their chunk; reduce replies are fixed.
    fn echo_generator(reduce_reply: &'static str) -> ScriptedGenerator {
        ScriptedGenerator::with(move |prompt| {
            if prompt.contains(MAP_MARKER) {
                let body = prompt.split("transcript:\n").nth(1).unwrap_or("");
                let first = body.split_whitespace().next().unwrap_or("?");
                Ok(format!("point {first}"))
            } else {
                Ok(reduce_reply.to_string())
            }
        })
    }

    fn request(chunk_size: usize, token_max: usize) -> SummaryRequest {
        SummaryRequest {
            chunk_size,
            reduce: ReduceSettings { token_max, max_collapse_passes: 4 },
            ..Default::default()
        }
    }

    fn paragraphs(heads: &[&str], words_each: usize) -> String {
        heads
            .iter()
            .map(|h| format!("{h} {}", words(words_each)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_three_chunks_three_maps_one_reduce() {
        let transcript = paragraphs(&["alpha", "bravo", "charlie"], 10);
        let mut g = echo_generator("FINAL");
        // One paragraph fits, two do not.
        let out = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            &transcript,
            &GenerationConfig::default(),
            &request(60, 4000),
        )
        .unwrap();

        assert_eq!(out.output_text, "FINAL");
        assert_eq!(out.intermediate_steps, vec!["point alpha", "point bravo", "point charlie"]);
        let maps = g.prompts.iter().filter(|p| p.contains(MAP_MARKER)).count();
        assert_eq!(maps, 3);
        assert_eq!(g.prompts.len(), 4);
        assert!(out.trace.collapse_passes.is_empty());
    }

    #[test]
    fn test_map_order_carries_into_reduce() {
        let heads = ["one", "two", "three", "four", "five"];
        let transcript = paragraphs(&heads, 10);
        let mut g = echo_generator("FINAL");
        summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            &transcript,
            &GenerationConfig::default(),
            &request(60, 4000),
        )
        .unwrap();

        let last = g.prompts.last().unwrap();
        let expected = heads.iter().map(|h| format!("point {h}")).collect::<Vec<_>>().join("\n\n");
        assert!(last.contains(&expected));
    }

    #[test]
    fn test_over_budget_summaries_are_collapsed_first() {
        let heads: Vec<String> = (0..8).map(|i| format!("part{i}")).collect();
        let heads: Vec<&str> = heads.iter().map(String::as_str).collect();
        let transcript = paragraphs(&heads, 10);
        let mut g = ScriptedGenerator::with(|prompt| {
            if prompt.contains(MAP_MARKER) {
                Ok(words(30))
            } else {
                Ok("short collapsed summary".to_string())
            }
        });

        let out = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            &transcript,
            &GenerationConfig::default(),
            &request(60, 100),
        )
        .unwrap();

        assert_eq!(out.intermediate_steps.len(), 8);
        assert!(!out.trace.collapse_passes.is_empty());
        let last_pass = out.trace.collapse_passes.last().unwrap();
        assert!(last_pass.tokens_after <= 100);
        assert!(out.trace.final_prompt_tokens <= 100);
        assert_eq!(out.output_text, "short collapsed summary");
    }

    #[test]
    fn test_reduce_budget_is_not_lowered_to_prompt_room() {
        // Default context leaves 3840 prompt tokens; the 4000 budget still rules.
        let transcript = paragraphs(&["left", "right"], 10);
        let mut g = ScriptedGenerator::with(|prompt| {
            if prompt.contains(MAP_MARKER) {
                Ok(words(1950))
            } else {
                Ok("FINAL".to_string())
            }
        });

        let out = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            &transcript,
            &GenerationConfig::default(),
            &SummaryRequest { chunk_size: 60, ..Default::default() },
        )
        .unwrap();

        assert_eq!(out.intermediate_steps.len(), 2);
        assert!(out.trace.collapse_passes.is_empty());
        assert!(out.trace.final_prompt_tokens > GenerationConfig::default().prompt_budget());
        assert!(out.trace.final_prompt_tokens <= 4000);
        assert_eq!(g.prompts.len(), 3);
        assert_eq!(out.output_text, "FINAL");
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let mut g = ScriptedGenerator::fixed("x");
        let err = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            "some words here",
            &GenerationConfig::default(),
            &request(0, 4000),
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk size"));
        assert!(g.prompts.is_empty());
    }

    #[test]
    fn test_empty_transcript_never_calls_model() {
        let mut g = ScriptedGenerator::fixed("x");
        let err = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            " \n\n\t ",
            &GenerationConfig::default(),
            &SummaryRequest::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(g.prompts.is_empty());
    }

    #[test]
    fn test_map_failure_aborts_without_reduce() {
        let transcript = paragraphs(&["a", "b", "c"], 10);
        let mut g = ScriptedGenerator::failing_after(1);
        let err = summarize_transcript(
            &mut g,
            &RecursiveCharacterSplitter::default(),
            &transcript,
            &GenerationConfig::default(),
            &request(60, 4000),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of memory"));
        assert_eq!(g.prompts.len(), 2);
    }
}
