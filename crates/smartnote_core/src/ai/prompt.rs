//! Prompt construction for summary and tag tasks.

use crate::model::note::{MAX_TAGS_PER_NOTE, MAX_TAG_CHARS};

/// Note content beyond this many characters is cut before prompting.
pub const MAX_INPUT_CHARS: usize = 8_000;

/// Returns at most `max_chars` leading characters of `content`.
pub fn truncate_content(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_end, _)) => &content[..byte_end],
        None => content,
    }
}

pub fn summary_prompt(title: &str, content: &str) -> String {
    let title = title.trim();
    let title_line = if title.is_empty() {
        String::new()
    } else {
        format!("Title: {title}\n")
    };
    format!(
        "Summarize the following note in two or three sentences.\n\
         Write the summary in the same language as the note.\n\
         Return only the summary text without headings or bullet points.\n\n\
         {title_line}Note:\n{content}"
    )
}

pub fn tags_prompt(content: &str) -> String {
    format!(
        "Extract up to {MAX_TAGS_PER_NOTE} short topic tags for the following note.\n\
         Each tag must be at most {MAX_TAG_CHARS} characters and in the same language as the note.\n\
         Return only the tags as a single comma-separated line, for example: tag1, tag2, tag3\n\n\
         Note:\n{content}"
    )
}

#[cfg(test)]
mod tests {
    use super::{summary_prompt, tags_prompt, truncate_content, MAX_INPUT_CHARS};
    use crate::ai::client::MAX_PROMPT_CHARS;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_content("가나다라", 2), "가나");
        assert_eq!(truncate_content("short", 100), "short");
    }

    #[test]
    fn prompts_for_max_input_fit_the_client_limit() {
        let content = "가".repeat(MAX_INPUT_CHARS);
        assert!(summary_prompt("a title", &content).chars().count() <= MAX_PROMPT_CHARS);
        assert!(tags_prompt(&content).chars().count() <= MAX_PROMPT_CHARS);
    }

    #[test]
    fn blank_title_is_omitted() {
        assert!(!summary_prompt("  ", "body").contains("Title:"));
        assert!(summary_prompt("Plan", "body").contains("Title: Plan"));
    }
}
