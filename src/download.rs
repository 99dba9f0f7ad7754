// download.rs — Model file download with optional SHA256 verification.
//
// Model weights are fetched on first use and cached under ~/.recap/models/.
// Files are streamed to disk (GGUF weights are several GB) and hashed on the way.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};

use crate::config;
use crate::logging::home_dir;

/// A remote file that belongs in a local model directory.
#[derive(Debug, Clone, Copy)]
pub struct RemoteFile<'a> {
    pub file_name: &'a str,
    pub url: &'a str,
    pub sha256: Option<&'a str>,
    pub timeout_secs: u64,
}

/// Resolve a directory relative to the user's home.
pub fn home_relative(rel: &str) -> anyhow::Result<PathBuf> {
    let home = home_dir().context("cannot determine home directory (neither HOME nor USERPROFILE is set)")?;
    Ok(home.join(rel))
}

/// Check if all the given files exist in `dir`.
pub fn files_exist(dir: &Path, files: &[RemoteFile<'_>]) -> bool {
    files.iter().all(|f| dir.join(f.file_name).exists())
}

/// Download any missing files into `dir`. Returns `dir`.
pub fn ensure_files(dir: &Path, files: &[RemoteFile<'_>]) -> anyhow::Result<PathBuf> {
    if files_exist(dir, files) {
        log::info!("Model files already cached at {}", dir.display());
        return Ok(dir.to_path_buf());
    }

    log::info!("Downloading model files to {}", dir.display());
    fs::create_dir_all(dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    for file in files {
        let dest = dir.join(file.file_name);
        if dest.exists() {
            continue;
        }
        download_and_verify(file, &dest)?;
    }

    log::info!("Model download complete");
    Ok(dir.to_path_buf())
}

/// Stream a file from URL to `dest`, verifying its SHA256 when one is pinned.
fn download_and_verify(file: &RemoteFile<'_>, dest: &Path) -> anyhow::Result<()> {
    log::info!("Downloading {} from {}", file.file_name, file.url);

    let mut req = ureq::get(file.url).timeout(Duration::from_secs(file.timeout_secs));
    // Gated Hugging Face repos need a bearer token.
    if let Ok(token) = std::env::var(config::download::HF_TOKEN_ENV) {
        if !token.trim().is_empty() {
            req = req.set("Authorization", &format!("Bearer {}", token.trim()));
        }
    }

    let resp = req.call().with_context(|| format!("failed to download {}", file.url))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {}", file.url);
    }

    // Write atomically: write to .tmp, then rename
    let tmp_path = dest.with_extension("tmp");
    let mut out = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut reader = resp.into_reader();
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; config::download::COPY_BUFFER_BYTES];
    let mut total: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read response body for {}", file.url))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        total += n as u64;
    }
    out.flush()?;
    drop(out);

    let actual_hash = hex::encode(hasher.finalize());
    if let Some(expected) = file.sha256 {
        if actual_hash != expected {
            let _ = fs::remove_file(&tmp_path);
            bail!(
                "SHA256 mismatch for {}: expected {}, got {}",
                file.file_name,
                expected,
                actual_hash
            );
        }
        log::info!("SHA256 verified for {} ({})", file.file_name, &actual_hash[..12]);
    } else {
        log::info!("Downloaded {} ({} bytes, sha256 {})", file.file_name, total, &actual_hash[..12]);
    }

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;

    Ok(())
}
