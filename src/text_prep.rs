// text_prep.rs — Loading transcript and sentence inputs from disk.

use std::path::Path;

use anyhow::Context;

/// Read a transcript as raw bytes and decode it as UTF-8.
///
/// Invalid sequences are replaced with U+FFFD (and logged) instead of aborting;
/// transcripts from speech-to-text tools are not always clean.
pub fn read_transcript(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read transcript {}", path.display()))?;
    Ok(decode_lossy(&bytes, path))
}

/// Read one sentence per line, skipping blank lines.
pub fn read_sentences(path: &Path) -> anyhow::Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read sentences {}", path.display()))?;
    Ok(split_sentences(&decode_lossy(&bytes, path)))
}

fn decode_lossy(bytes: &[u8], path: &Path) -> String {
    match String::from_utf8_lossy(bytes) {
        std::borrow::Cow::Borrowed(s) => s.to_string(),
        std::borrow::Cow::Owned(s) => {
            log::warn!("{} is not valid UTF-8; invalid bytes were replaced", path.display());
            s
        }
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_skips_blank_lines() {
        let got = split_sentences("first line\n\n  second  \r\n\t\nthird");
        assert_eq!(got, vec!["first line", "second", "third"]);
    }

    #[test]
    fn test_decode_lossy_replaces_invalid_bytes() {
        let text = decode_lossy(b"ok \xff end", Path::new("t.txt"));
        assert_eq!(text, "ok \u{fffd} end");
    }

    #[test]
    fn test_read_transcript_missing_file() {
        let err = read_transcript(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read transcript"));
    }
}
