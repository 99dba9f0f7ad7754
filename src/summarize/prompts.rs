// prompts.rs — Mistral-instruct prompt templates for the map and reduce steps.
//
// Topic and focus are bound once when the prompt set is built; only the
// document text changes per call.

const MAP_TEMPLATE: &str = "<s>[INST] The following is a section from a {topic} transcript:
{docs}
Identify the main points of the section.
Answer:  [/INST] </s>";

const REDUCE_TEMPLATE: &str = "<s>[INST] The following is set of section summaries from the {topic} transcript:
{doc_summaries}
Distill these into a final, consolidated summary with respect to {focus}.
Answer:  [/INST] </s>";

#[derive(Debug, Clone)]
pub struct SummaryPrompts {
    topic: String,
    focus: String,
}

impl SummaryPrompts {
    pub fn new(topic: &str, focus: &str) -> Self {
        Self {
            topic: topic.to_string(),
            focus: focus.to_string(),
        }
    }

    /// Prompt asking for the main points of one chunk.
    pub fn map(&self, chunk_text: &str) -> String {
        MAP_TEMPLATE
            .replace("{topic}", &self.topic)
            .replace("{docs}", chunk_text.trim())
    }

    /// Prompt consolidating already-joined summaries.
    pub fn reduce(&self, doc_summaries: &str) -> String {
        // Summaries go in last so braces inside model output are never treated as placeholders.
        REDUCE_TEMPLATE
            .replace("{topic}", &self.topic)
            .replace("{focus}", &self.focus)
            .replace("{doc_summaries}", doc_summaries)
    }
}
