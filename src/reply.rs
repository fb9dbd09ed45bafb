//! Assistant reply parsing.
//!
//! Agents answer in prose that may embed a fenced code block and a trailing
//! "Suggestions:" section. [`parse_reply`] splits a raw reply into the three
//! parts the transcript renders separately: remaining prose, extracted code,
//! and suggestion chips.
//!
//! The function is total — malformed input degrades to "no code / no
//! suggestions" and never produces an error. Text with no fence and no
//! suggestions marker passes through unchanged (modulo trimming).

use once_cell::sync::Lazy;
use regex::Regex;

/// A raw assistant reply split into prose, code, and suggestions.
///
/// `code` is present only when a fenced block was found. `suggestions` is
/// `Some` only when a suggestions section was found — a found-but-empty
/// section yields `Some(vec![])`, which is distinct from `None` ("none
/// offered").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedReply {
    pub content: String,
    pub code: Option<String>,
    pub suggestions: Option<Vec<String>>,
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").unwrap());

static SUGGESTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:suggestions|suggested next steps)[ \t]*:").unwrap());

/// Split a raw assistant reply into prose, extracted code, and suggestions.
///
/// The first fenced block's inner text (trimmed) becomes `code`; *all*
/// fenced blocks are removed from the prose. A case-insensitive line opening
/// a `Suggestions:` or `Suggested Next Steps:` section is consumed to the end
/// of the text: bullet lines (`-` or `•`) become `suggestions`, and the prose
/// is truncated before the section header.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut code = FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    let mut working = FENCE_RE.replace_all(raw, "").into_owned();

    // An odd number of fence markers leaves one dangling. Treat everything
    // from the dangling marker to the end as the block: the prose stops
    // there, and if no closed block was found the remainder is the code.
    if let Some(pos) = working.find("```") {
        if code.is_none() {
            let block = &working[pos + 3..];
            let inner = match block.find('\n') {
                Some(nl) => &block[nl + 1..],
                None => "",
            };
            let inner = inner.trim();
            if !inner.is_empty() {
                code = Some(inner.to_string());
            }
        }
        working.truncate(pos);
    }

    let suggestions_span = SUGGESTIONS_RE.find(&working).map(|m| (m.start(), m.end()));
    let suggestions = suggestions_span.map(|(start, end)| {
        let items = working[end..]
            .lines()
            .map(|line| line.trim_start())
            .filter(|line| line.starts_with('-') || line.starts_with('•'))
            .map(|line| line.trim_start_matches(|c| c == '-' || c == '•').trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        working.truncate(start);
        items
    });

    ParsedReply {
        content: working.trim().to_string(),
        code,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = "The revenue trend looks healthy overall.";
        let parsed = parse_reply(text);
        assert_eq!(parsed.content, text);
        assert_eq!(parsed.code, None);
        assert_eq!(parsed.suggestions, None);
    }

    #[test]
    fn extracts_code_and_suggestions() {
        let raw = "Here is code:\n```python\nprint(1)\n```\nSuggestions:\n- try X\n- try Y";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.content, "Here is code:");
        assert_eq!(parsed.code.as_deref(), Some("print(1)"));
        assert_eq!(
            parsed.suggestions,
            Some(vec!["try X".to_string(), "try Y".to_string()])
        );
    }

    #[test]
    fn removes_every_fence_but_keeps_only_the_first_block() {
        let raw = "First:\n```python\na = 1\n```\nSecond:\n```sql\nSELECT 1;\n```\nDone.";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.code.as_deref(), Some("a = 1"));
        assert!(!parsed.content.contains("```"));
        assert!(!parsed.content.contains("SELECT"));
        assert!(parsed.content.contains("Done."));
    }

    #[test]
    fn suggested_next_steps_header_is_case_insensitive() {
        let raw = "All set.\nSUGGESTED NEXT STEPS:\n• plot the residuals\n• check for nulls";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.content, "All set.");
        assert_eq!(
            parsed.suggestions,
            Some(vec![
                "plot the residuals".to_string(),
                "check for nulls".to_string()
            ])
        );
    }

    #[test]
    fn suggestions_section_without_bullets_is_explicitly_empty() {
        let parsed = parse_reply("Done.\nSuggestions:\nnothing structured here");
        assert_eq!(parsed.content, "Done.");
        assert_eq!(parsed.suggestions, Some(vec![]));
    }

    #[test]
    fn unclosed_fence_degrades_to_trailing_code() {
        let raw = "Run this:\n```python\nprint('hi')";
        let parsed = parse_reply(raw);
        assert_eq!(parsed.content, "Run this:");
        assert_eq!(parsed.code.as_deref(), Some("print('hi')"));
    }

    #[test]
    fn empty_input_is_fine() {
        let parsed = parse_reply("");
        assert_eq!(parsed.content, "");
        assert_eq!(parsed.code, None);
        assert_eq!(parsed.suggestions, None);
    }

    #[test]
    fn non_bullet_lines_in_suggestions_are_dropped() {
        let raw = "Summary.\nSuggestions:\n- keep this\nplain line\n- and this";
        let parsed = parse_reply(raw);
        assert_eq!(
            parsed.suggestions,
            Some(vec!["keep this".to_string(), "and this".to_string()])
        );
    }
}
