//! Deterministic reply checks and strip fixes.
//!
//! Everything here is pure over the configured rules: no I/O and no completion calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::stage_data::contains_phrase;

const MAX_STRIP_PASSES: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleRules {
    pub banned_openers: Vec<String>,
    pub max_lines: usize,
    pub banned_phrases: Vec<String>,
    pub broken_starts: Vec<String>,
}

impl Default for StyleRules {
    fn default() -> Self {
        Self {
            banned_openers: to_strings(&[
                "great",
                "awesome",
                "perfect",
                "got it",
                "understood",
                "sure",
                "absolutely",
                "ok",
                "okay",
                "i understand",
                "thanks for sharing",
            ]),
            max_lines: 4,
            banned_phrases: to_strings(&[
                "synergy",
                "leverage",
                "circle back",
                "touch base",
                "best-in-class",
                "game changer",
                "world-class",
            ]),
            broken_starts: to_strings(&["and", "but", "or", "so", "because", "which", "...", ",", ";", "-"]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", content = "detail", rename_all = "snake_case")]
pub enum StyleIssue {
    NoQuestion,
    MultipleQuestions(usize),
    BannedOpener(String),
    TooManyLines(usize),
    BannedPhrase(String),
    BrokenStart(String),
}

impl fmt::Display for StyleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoQuestion => f.write_str("the reply must end with exactly one question"),
            Self::MultipleQuestions(count) => {
                write!(f, "the reply asks {count} questions; ask exactly one")
            }
            Self::BannedOpener(opener) => write!(f, "do not open with `{opener}`"),
            Self::TooManyLines(lines) => write!(f, "the reply has {lines} lines; keep it shorter"),
            Self::BannedPhrase(phrase) => write!(f, "remove the phrase `{phrase}`"),
            Self::BrokenStart(prefix) => {
                write!(f, "the reply starts mid-sentence with `{prefix}`")
            }
        }
    }
}

impl StyleRules {
    /// Returns every rule the draft breaks. Empty means the draft is acceptable.
    pub fn check(&self, draft: &str) -> Vec<StyleIssue> {
        let text = draft.trim();
        let lowered = text.to_lowercase();
        let mut issues = Vec::new();

        match text.matches('?').count() {
            0 => issues.push(StyleIssue::NoQuestion),
            1 => {}
            count => issues.push(StyleIssue::MultipleQuestions(count)),
        }

        if let Some(opener) = self.leading_opener(&lowered) {
            issues.push(StyleIssue::BannedOpener(opener.to_string()));
        }

        let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
        if lines > self.max_lines {
            issues.push(StyleIssue::TooManyLines(lines));
        }

        for phrase in &self.banned_phrases {
            if contains_phrase(&lowered, &phrase.to_lowercase()) {
                issues.push(StyleIssue::BannedPhrase(phrase.clone()));
            }
        }

        if let Some(prefix) = self.leading_broken_start(&lowered) {
            issues.push(StyleIssue::BrokenStart(prefix.to_string()));
        }

        issues
    }

    pub fn is_valid(&self, draft: &str) -> bool {
        self.check(draft).is_empty()
    }

    /// Strips leading banned openers and broken-start fragments until neither applies.
    ///
    /// The result is a fixpoint, so applying it again returns the same text.
    pub fn strip_fixes(&self, draft: &str) -> String {
        let mut text = draft.trim().to_string();
        for _ in 0..MAX_STRIP_PASSES {
            let lowered = text.to_lowercase();
            let rest = self
                .leading_opener(&lowered)
                .or_else(|| self.leading_broken_start(&lowered))
                .and_then(|prefix| text.get(prefix.len()..));
            match rest {
                Some(rest) => text = capitalize_first(strip_separators(rest)),
                None => break,
            }
        }
        text
    }

    fn leading_opener(&self, lowered: &str) -> Option<&str> {
        self.banned_openers
            .iter()
            .map(String::as_str)
            .filter(|opener| starts_with_token(lowered, &opener.to_lowercase()))
            .max_by_key(|opener| opener.len())
    }

    fn leading_broken_start(&self, lowered: &str) -> Option<&str> {
        self.broken_starts
            .iter()
            .map(String::as_str)
            .filter(|prefix| starts_with_token(lowered, &prefix.to_lowercase()))
            .max_by_key(|prefix| prefix.len())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportStyleRules {
    pub cold_words: Vec<String>,
    pub max_chars: usize,
    pub sales_phrases: Vec<String>,
    pub qualification_phrases: Vec<String>,
}

impl Default for SupportStyleRules {
    fn default() -> Self {
        Self {
            cold_words: to_strings(&[
                "unfortunately",
                "as i said",
                "as previously stated",
                "per our policy",
                "you should have",
                "obviously",
                "calm down",
            ]),
            max_chars: 600,
            sales_phrases: to_strings(&[
                "upgrade",
                "special offer",
                "discount",
                "buy now",
                "premium plan",
                "limited time",
            ]),
            qualification_phrases: to_strings(&[
                "budget",
                "decision maker",
                "who decides",
                "timeline for purchase",
                "how much are you willing",
            ]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", content = "detail", rename_all = "snake_case")]
pub enum SupportIssue {
    Empty,
    ColdTone(String),
    TooLong(usize),
    SalesLanguage(String),
    QualificationQuestion(String),
}

impl fmt::Display for SupportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("the reply is empty"),
            Self::ColdTone(word) => write!(f, "`{word}` sounds cold; use a warmer wording"),
            Self::TooLong(chars) => write!(f, "the reply has {chars} characters; be more concise"),
            Self::SalesLanguage(phrase) => {
                write!(f, "`{phrase}` is sales language; focus on the customer's issue")
            }
            Self::QualificationQuestion(phrase) => {
                write!(f, "`{phrase}` belongs to sales qualification, not support")
            }
        }
    }
}

impl SupportStyleRules {
    pub fn check(&self, draft: &str) -> Vec<SupportIssue> {
        let text = draft.trim();
        if text.is_empty() {
            return vec![SupportIssue::Empty];
        }
        let lowered = text.to_lowercase();
        let mut issues = Vec::new();

        issues.extend(
            first_match(&lowered, &self.cold_words).map(|word| SupportIssue::ColdTone(word.to_string())),
        );
        let chars = text.chars().count();
        if chars > self.max_chars {
            issues.push(SupportIssue::TooLong(chars));
        }
        issues.extend(
            first_match(&lowered, &self.sales_phrases)
                .map(|phrase| SupportIssue::SalesLanguage(phrase.to_string())),
        );
        issues.extend(
            first_match(&lowered, &self.qualification_phrases)
                .map(|phrase| SupportIssue::QualificationQuestion(phrase.to_string())),
        );
        issues
    }

    /// Cuts an over-long reply at the last sentence end that fits.
    pub fn truncate(&self, draft: &str) -> String {
        let text = draft.trim();
        if text.chars().count() <= self.max_chars {
            return text.to_string();
        }
        let head = text.chars().take(self.max_chars).collect::<String>();
        match head.rfind(['.', '!', '?']) {
            Some(end) => head[..=end].to_string(),
            None => head.trim_end().to_string(),
        }
    }
}

fn first_match<'a>(lowered: &str, phrases: &'a [String]) -> Option<&'a str> {
    phrases
        .iter()
        .map(String::as_str)
        .find(|phrase| contains_phrase(lowered, &phrase.to_lowercase()))
}

/// True when `text` starts with `token` and the token ends on a word boundary.
fn starts_with_token(text: &str, token: &str) -> bool {
    if token.is_empty() || !text.starts_with(token) {
        return false;
    }
    let token_is_word = token.chars().next_back().is_some_and(char::is_alphanumeric);
    !token_is_word || !text[token.len()..].chars().next().is_some_and(char::is_alphanumeric)
}

fn strip_separators(text: &str) -> &str {
    text.trim_start_matches(|ch: char| {
        ch.is_whitespace() || matches!(ch, ',' | '.' | '!' | '-' | ':' | ';')
    })
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}
