//! Code extraction from model replies
//!
//! Precedence:
//! 1. first fenced block tagged as Python (```` ```python ````, ```` ```py ````, ```` ```python3 ````)
//! 2. first fenced block of any kind
//! 3. the whole reply
//!
//! The result is always trimmed and never contains a fence, so extraction
//! is idempotent.

const FENCE: &str = "```";
const PYTHON_TAGS: &[&str] = &["python", "py", "python3"];

/// Code recovered from a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
}

impl ExtractedCode {
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for ExtractedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

struct FencedBlock<'a> {
    info: &'a str,
    body: &'a str,
}

/// Split text into fenced blocks. An unterminated block runs to the end.
fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(FENCE) {
        let info_start = pos + offset + FENCE.len();
        let rest = &text[info_start..];
        let line_len = rest.find('\n').unwrap_or(rest.len());
        let inline_close = rest[..line_len].find(FENCE);

        let (info, body_start) = match inline_close {
            // Fence line on its own: the whole line is the info string
            None if line_len < rest.len() => (&rest[..line_len], info_start + line_len + 1),
            // One-line block: the first word is the tag, the rest is code
            close => {
                let line = &rest[..close.unwrap_or(line_len)];
                let word = line.trim_start();
                let lead = line.len() - word.len();
                let tag_len = match word.find(char::is_whitespace) {
                    Some(end) => end,
                    None if is_python_tag(word) => word.len(),
                    None => 0,
                };
                (&word[..tag_len], info_start + lead + tag_len)
            }
        };
        let body_end = text[body_start..]
            .find(FENCE)
            .map(|i| body_start + i)
            .unwrap_or(text.len());

        blocks.push(FencedBlock {
            info: info.trim(),
            body: &text[body_start..body_end],
        });
        pos = (body_end + FENCE.len()).min(text.len());
        if body_end >= text.len() {
            break;
        }
    }

    blocks
}

fn is_python_tag(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .map(|tag| PYTHON_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Deterministic, pure extraction of code from a raw reply
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeExtractor;

impl CodeExtractor {
    pub fn extract(&self, raw_text: &str) -> ExtractedCode {
        let blocks = fenced_blocks(raw_text);
        let chosen = blocks
            .iter()
            .find(|b| is_python_tag(b.info))
            .or_else(|| blocks.first())
            .map(|b| b.body)
            .unwrap_or(raw_text);

        ExtractedCode {
            code: chosen.trim().to_string(),
        }
    }
}
