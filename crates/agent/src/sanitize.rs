//! Cleanup of raw model output.
//!
//! Local models leak chat-template tokens and reasoning channels into their
//! replies. [`strip_markers`] removes those before decision parsing;
//! [`tidy`] normalises whitespace in text shown to the user.

use regex_lite::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("static regex"));
static ANALYSIS_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\|analysis\|>.*?<\|message\|>|<\|channel\|>analysis<\|message\|>.*?<\|end\|>")
        .expect("static regex")
});
static TEMPLATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|<>]*\|>").expect("static regex"));
static LEADING_ANALYSIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\A\s*analysis.*?assistant\s?final").expect("static regex"));
static FINAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)assistant\s?final").expect("static regex"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Model text with markers removed, plus any reasoning found inside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanOutput {
    pub text: String,
    pub thought: Option<String>,
}

/// Remove reasoning blocks and template tokens.
///
/// `<think>` contents are returned as the thought instead of being thrown
/// away. Ordinary prose and JSON are left untouched.
pub fn strip_markers(raw: &str) -> CleanOutput {
    let mut thoughts: Vec<String> = THINK_BLOCK
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let mut text = THINK_BLOCK.replace_all(raw, "").into_owned();

    // Template opened the think block for the model; only the close is visible
    if let Some((before, after)) = text.split_once("</think>") {
        let before = before.trim();
        if !before.is_empty() {
            thoughts.insert(0, before.to_string());
        }
        text = after.to_string();
    }

    text = ANALYSIS_CHANNEL.replace_all(&text, "").into_owned();
    text = TEMPLATE_TOKEN.replace_all(&text, "").into_owned();
    text = LEADING_ANALYSIS.replace(&text, "").into_owned();
    text = FINAL_MARKER.replace_all(&text, "").into_owned();

    let thought = (!thoughts.is_empty()).then(|| thoughts.join("\n"));
    CleanOutput {
        text: text.replace('\r', "").trim().to_string(),
        thought,
    }
}

/// Drop carriage returns and collapse blank runs.
///
/// Literal `\n` escapes are unescaped only when the reply has no real line
/// break; otherwise they belong to the content (e.g. `printf("a\n")`).
pub fn tidy(text: &str) -> String {
    let text = text.replace('\r', "");
    let text = if text.contains('\n') {
        text
    } else {
        text.replace("\\n", "\n")
    };
    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_blocks_become_thoughts() {
        let out = strip_markers("<think>user wants Lima</think>\nThe capital is Lima.");
        assert_eq!(out.text, "The capital is Lima.");
        assert_eq!(out.thought.as_deref(), Some("user wants Lima"));
    }

    #[test]
    fn unopened_think_close_splits_reasoning() {
        let out = strip_markers("checking facts...</think>Lima.");
        assert_eq!(out.text, "Lima.");
        assert_eq!(out.thought.as_deref(), Some("checking facts..."));
    }

    #[test]
    fn channel_blocks_and_tokens_removed() {
        let raw = "<|analysis|>internal notes<|message|>Hello<|im_end|>";
        assert_eq!(strip_markers(raw).text, "Hello");

        let raw = "<|channel|>analysis<|message|>scratch<|end|><|start|>assistant<|channel|>final<|message|>Hi there";
        assert_eq!(strip_markers(raw).text, "Hi there");
    }

    #[test]
    fn leading_analysis_section_removed() {
        let out = strip_markers("analysis The user greets. assistantfinal Hello!");
        assert_eq!(out.text, "Hello!");
    }

    #[test]
    fn ordinary_words_and_json_survive() {
        let raw = r#"{"thought": "run the analysis", "final_answer": "Data analysis done"}"#;
        assert_eq!(strip_markers(raw).text, raw);
    }

    #[test]
    fn json_escapes_survive_stripping() {
        let raw = r#"{"final_answer": "a\nb"}"#;
        assert_eq!(strip_markers(raw).text, raw);
    }

    #[test]
    fn tidy_unescapes_single_line_replies() {
        assert_eq!(tidy("line one\\nline two\\n\\n\\n\\nend  "), "line one\nline two\n\nend");
    }

    #[test]
    fn tidy_collapses_real_blank_runs() {
        assert_eq!(tidy("a\r\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn tidy_keeps_escapes_inside_multiline_code() {
        let answer = "```c\nprintf(\"a\\n\");\n```";
        assert_eq!(tidy(answer), answer);
    }

    #[test]
    fn empty_input() {
        assert_eq!(strip_markers(""), CleanOutput::default());
        assert_eq!(tidy(""), "");
    }
}
