// http.rs — Text generation through a llama.cpp-compatible server.
//
// Uses the server's native endpoints:
//   POST /completion  {prompt, n_predict, ...} -> {content}
//   POST /tokenize    {content}                -> {tokens}

use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use super::{GenerationConfig, TextGenerator};
use crate::config;

pub struct HttpGenerator {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpGenerator {
    pub fn new(endpoint: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config::llm::HTTP_TIMEOUT_SECS))
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> anyhow::Result<R> {
        let url = format!("{}{}", self.endpoint, path);
        let payload = serde_json::to_string(body).context("failed to serialize request")?;
        let resp = match self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&payload)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let text = resp
                    .into_string()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                bail!("{url} returned {status}: {text}");
            }
            Err(e) => return Err(e).with_context(|| format!("failed to call {url}")),
        };
        serde_json::from_reader(resp.into_reader())
            .with_context(|| format!("failed to parse response from {url}"))
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f64,
    top_k: usize,
    top_p: f64,
    repeat_penalty: f32,
    repeat_last_n: usize,
    seed: u64,
    stop: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: Vec<serde_json::Value>,
}

fn completion_request<'a>(prompt: &'a str, cfg: &GenerationConfig) -> CompletionRequest<'a> {
    CompletionRequest {
        prompt,
        n_predict: cfg.max_new_tokens,
        temperature: cfg.temperature,
        top_k: cfg.top_k,
        top_p: cfg.top_p,
        repeat_penalty: cfg.repetition_penalty,
        repeat_last_n: cfg.last_n_tokens,
        seed: cfg.seed,
        stop: [config::llm::EOS_TOKEN],
    }
}

impl TextGenerator for HttpGenerator {
    fn generate(&mut self, prompt: &str, cfg: &GenerationConfig) -> anyhow::Result<String> {
        let parsed: CompletionResponse = self.post("/completion", &completion_request(prompt, cfg))?;
        Ok(parsed.content.trim().to_string())
    }

    fn count_tokens(&self, text: &str) -> anyhow::Result<usize> {
        let parsed: TokenizeResponse = self.post("/tokenize", &TokenizeRequest { content: text })?;
        Ok(parsed.tokens.len())
    }
}
