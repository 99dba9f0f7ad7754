// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

// NOTE: VERSION must stay in sync with the `version` field in Cargo.toml.
pub const VERSION: &str = "0.1.0";

pub mod logging {
    pub const LOG_DIR_REL: &str = ".recap/logs";
    pub const LOG_FILE_NAME: &str = "recap.log";
    pub const DEFAULT_LEVEL: &str = "info";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod download {
    pub const TIMEOUT_SECS: u64 = 90;
    // GGUF weights are several GB; allow a long transfer.
    pub const LARGE_FILE_TIMEOUT_SECS: u64 = 60 * 60;
    pub const COPY_BUFFER_BYTES: usize = 1024 * 1024;
    pub const HF_TOKEN_ENV: &str = "HF_TOKEN";
}

pub mod embedding {
    pub const EMBEDDING_DIMS: usize = 384;
    pub const EMBEDDING_MODEL_NAME: &str = "all-MiniLM-L6-v2";

    pub const DEFAULT_BATCH_SIZE: usize = 32;
    // Context limit of all-MiniLM-L6-v2 in word-piece tokens.
    pub const DEFAULT_MAX_SEQ_LEN: usize = 256;

    // Denominator floor for mean pooling over an all-padding row.
    pub const POOLING_MASK_EPS: f64 = 1e-9;
    pub const L2_NORM_EPS: f64 = 1e-12;

    pub const PAD_TOKEN: &str = "[PAD]";

    pub const MODEL_BASE_URL: &str =
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

    // SHA256 hashes for integrity verification
    pub const MODEL_SAFETENSORS_SHA256: &str =
        "53aa51172d142c89d9012cce15ae4d6cc0ca6895895114379cacb4fab128d9db";
    pub const TOKENIZER_JSON_SHA256: &str =
        "be50c3628f2bf5bb5e3a7f17b1f74611b2561a3a27eeab05e5aa30f411572037";
    pub const CONFIG_JSON_SHA256: &str =
        "953f9c0d463486b10a6871cc2fd59f223b2c70184f49815e7efbcab5d8908b41";

    // Local model storage directory (relative to home)
    pub const MODEL_DIR_REL: &str = ".recap/models/all-MiniLM-L6-v2";
}

pub mod summarize {
    pub const DEFAULT_TRANSCRIPT_PATH: &str = "transcript.txt";
    pub const DEFAULT_TOPIC: &str = "book";
    pub const DEFAULT_FOCUS: &str = "the plot";
    pub const DOCUMENT_SOURCE: &str = "local";

    // Splitter budget in characters; chunks never overlap.
    pub const CHUNK_SIZE_CHARS: usize = 4000;
    // Reduce prompt budget in model tokens.
    pub const TOKEN_MAX: usize = 4000;
    pub const MAX_COLLAPSE_PASSES: usize = 8;

    pub const SUMMARY_SEPARATOR: &str = "\n\n";
}

pub mod llm {
    pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;
    pub const DEFAULT_CONTEXT_LENGTH: usize = 4096;
    pub const DEFAULT_TOP_K: usize = 40;
    pub const DEFAULT_TOP_P: f64 = 0.95;
    pub const DEFAULT_REPETITION_PENALTY: f32 = 1.1;
    pub const DEFAULT_LAST_N_TOKENS: usize = 64;
    pub const DEFAULT_SEED: u64 = 299_792_458;

    pub const EOS_TOKEN: &str = "</s>";

    pub const GGUF_MODEL_NAME: &str = "mistral-7b-instruct-v0.1";
    pub const GGUF_FILE_NAME: &str = "mistral-7b-instruct-v0.1.Q6_K.gguf";
    pub const GGUF_URL: &str = "https://huggingface.co/TheBloke/Mistral-7B-Instruct-v0.1-GGUF/resolve/main/mistral-7b-instruct-v0.1.Q6_K.gguf";
    pub const TOKENIZER_URL: &str =
        "https://huggingface.co/mistralai/Mistral-7B-Instruct-v0.1/resolve/main/tokenizer.json";
    pub const MODEL_DIR_REL: &str = ".recap/models/mistral-7b-instruct-v0.1";

    // llama.cpp server defaults
    pub const DEFAULT_HTTP_ENDPOINT: &str = "http://127.0.0.1:8080";
    pub const HTTP_TIMEOUT_SECS: u64 = 15 * 60;
}
