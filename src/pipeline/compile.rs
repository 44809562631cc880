// src/pipeline/compile.rs

//! Per-subscriber message rendering.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::{Category, Flags};
use crate::pipeline::diff::DiffResult;

/// Default width of one entry, in graphemes.
pub const DEFAULT_ENTRY_WIDTH: usize = 40;

/// Outcome of compiling a diff for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compiled {
    Message(String),
    /// Nothing visible to this subscriber.
    NoChange,
}

impl Compiled {
    pub fn into_message(self) -> Option<String> {
        match self {
            Self::Message(text) => Some(text),
            Self::NoChange => None,
        }
    }
}

/// Render the categories `flags` shows, one numbered line per header and entry.
pub fn compile(flags: &Flags, diff: &DiffResult, width: usize) -> Compiled {
    if flags.is_muted() {
        return Compiled::NoChange;
    }

    let mut lines = Vec::new();

    for category in Category::ALL {
        if !flags.shows(category) {
            continue;
        }
        let entries = match category {
            Category::Removed => &diff.removed,
            Category::Added => &diff.added,
            Category::Common => &diff.common,
        };
        if entries.is_empty() {
            continue;
        }

        lines.push(format!("{} {}:", category.icon(), category.label()));
        lines.extend(entries.iter().map(|line| truncate(&entry_text(line), width)));
    }

    if lines.is_empty() {
        return Compiled::NoChange;
    }

    let numbered: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect();
    Compiled::Message(numbered.join("\n"))
}

/// First column of a snapshot line; lines without one are flagged.
fn entry_text(line: &str) -> String {
    match line.split_once(',') {
        Some((first, _)) => first.to_string(),
        None => format!("ERR:{}", line),
    }
}

/// Shorten `text` to at most `width` graphemes.
///
/// Cuts after the last non-letter grapheme inside the limit and trims
/// trailing whitespace; without such a break it hard-cuts at the limit.
pub fn truncate(text: &str, width: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= width {
        return text.to_string();
    }

    let head = &graphemes[..width];
    let last_break = head
        .iter()
        .rposition(|g| !g.chars().next().is_some_and(char::is_alphabetic));

    match last_break {
        Some(idx) => head[..=idx].concat().trim_end().to_string(),
        None => head.concat(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::diff::diff;

    fn flags(s: &str) -> Flags {
        s.parse().unwrap()
    }

    #[test]
    fn test_removed_and_added_shown_common_hidden() {
        let result = diff("A\nB\nC", "A\nC\nD");
        let compiled = compile(&flags("1110"), &result, DEFAULT_ENTRY_WIDTH);
        assert_eq!(
            compiled,
            Compiled::Message("1. 🔴 removed:\n2. ERR:B\n3. 🟢 added:\n4. ERR:D".into())
        );
    }

    #[test]
    fn test_flags_gate_by_position() {
        let result = diff("A\nB\nC", "A\nC\nD");
        let compiled = compile(&flags("1101"), &result, DEFAULT_ENTRY_WIDTH);
        assert_eq!(
            compiled,
            Compiled::Message(
                "1. 🔴 removed:\n2. ERR:B\n3. 🔵 common:\n4. ERR:A\n5. ERR:C".into()
            )
        );
    }

    #[test]
    fn test_entries_take_first_column() {
        let result = diff("Acme,FR,100", "Acme,FR,100\nGlobex,US,5000");
        let compiled = compile(&flags("1111"), &result, DEFAULT_ENTRY_WIDTH);
        assert_eq!(
            compiled,
            Compiled::Message("1. 🟢 added:\n2. Globex\n3. 🔵 common:\n4. Acme".into())
        );
    }

    #[test]
    fn test_hidden_categories_yield_no_change() {
        let result = diff("A\nB", "B\nC");
        assert_eq!(compile(&flags("1000"), &result, 40), Compiled::NoChange);
        assert_eq!(compile(&flags("0000"), &result, 40), Compiled::NoChange);
    }

    #[test]
    fn test_empty_visible_categories_yield_no_change() {
        let result = diff("A,1\nB,2", "A,1\nB,2");
        assert_eq!(compile(&flags("1110"), &result, 40), Compiled::NoChange);
        assert!(matches!(compile(&flags("1001"), &result, 40), Compiled::Message(_)));
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("Acme Bug Bounty", 40), "Acme Bug Bounty");
    }

    #[test]
    fn test_truncate_hard_cut_without_break() {
        assert_eq!(truncate("abcdefghij", 4), "abcd");
    }

    #[test]
    fn test_truncate_at_last_break() {
        assert_eq!(truncate("Acme Private Program", 10), "Acme");
        assert_eq!(truncate("Acme-Private Program", 10), "Acme-");
        assert_eq!(truncate("Ab Cd-Ef", 6), "Ab Cd-");
    }

    #[test]
    fn test_truncate_counts_graphemes() {
        let text = "e\u{301}e\u{301}e\u{301}e\u{301}";
        assert_eq!(truncate(text, 2), "e\u{301}e\u{301}");
        assert_eq!(truncate("🇫🇷🇫🇷🇫🇷", 2), "🇫🇷🇫🇷");
    }
}
