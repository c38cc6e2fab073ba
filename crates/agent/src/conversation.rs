use std::collections::BTreeMap;

use leadflow_core::domain::bant::keys;
use leadflow_core::domain::stage_data::{contains_phrase, NOT_BUYING_CUES};

const PAIN_CUES: &[&str] = &[
    "problem",
    "struggle",
    "struggling",
    "losing",
    "lose",
    "lost",
    "hard to",
    "can't keep up",
    "cannot keep up",
    "frustrating",
    "frustrated",
    "too slow",
    "manual",
    "wasting",
    "waste",
    "falling through",
    "challenge",
    "pain",
    "headache",
];

const SOLUTION_CUES: &[&str] =
    &["we use", "we're using", "currently using", "spreadsheet", "excel", "crm", "by hand"];

const NEED_CUES: &[&str] =
    &["we need", "must have", "looking for", "we want", "would love", "need something", "nice to have"];

const CRITICAL_URGENCY_CUES: &[&str] =
    &["asap", "urgent", "urgently", "critical", "right now", "immediately", "bleeding"];
const HIGH_URGENCY_CUES: &[&str] = &["soon", "important", "pressing", "this month"];
const LOW_URGENCY_CUES: &[&str] = &["no rush", "not urgent", "eventually", "someday"];

const NO_BUDGET_CUES: &[&str] =
    &["no budget", "don't have budget", "don't have a budget", "can't afford", "no money"];
const BUDGET_CUES: &[&str] =
    &["budget", "approved", "allocated", "set aside", "spend", "per month", "a month", "per year"];

const NO_AUTHORITY_CUES: &[&str] = &["not my call", "not my decision", "someone else decides", "no say"];
const DECISION_MAKER_CUES: &[&str] =
    &["i decide", "my call", "my decision", "i'm the owner", "i own", "founder", "ceo", "final say"];
const INFLUENCER_CUES: &[&str] =
    &["my boss", "check with", "run it by", "the team decides", "my manager", "approval from"];
const TECHNICAL_CUES: &[&str] = &["i'm the engineer", "i'm evaluating", "technical evaluation", "it team"];

const NO_TIMELINE_CUES: &[&str] = &["no timeline", "no plans", "not planning", "no date"];
const TIMELINE_PATTERNS: &[&str] = &[
    "asap",
    "right away",
    "this week",
    "next week",
    "this month",
    "next month",
    "this quarter",
    "next quarter",
    "30 days",
    "60 days",
    "90 days",
    "this year",
    "next year",
    "q1",
    "q2",
    "q3",
    "q4",
];

/// Field values recognised in one message, keyed by BANT field key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedSignals {
    pub values: BTreeMap<String, String>,
    pub confidence_score: u8,
}

impl ExtractedSignals {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Deterministic keyword extractor. Used to fill fields the planner left empty.
#[derive(Clone, Debug, Default)]
pub struct SignalExtractor;

impl SignalExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> ExtractedSignals {
        let normalized_text = normalize_text(text);
        let sentences = split_sentences(text);
        let mut values = BTreeMap::new();

        if let Some(pain) = sentence_with_cue(&sentences, PAIN_CUES) {
            values.insert(keys::PAIN_POINT.to_string(), pain);
        }
        if let Some(solution) = sentence_with_cue(&sentences, SOLUTION_CUES) {
            values.insert(keys::CURRENT_SOLUTION.to_string(), solution);
        }
        if let Some(urgency) = extract_urgency(&normalized_text) {
            values.insert(keys::URGENCY.to_string(), urgency.to_string());
        }
        if let Some(budget) = extract_budget(&normalized_text, &sentences) {
            values.insert(keys::BUDGET.to_string(), budget);
        }
        if let Some(authority) = extract_authority(&normalized_text) {
            values.insert(keys::AUTHORITY.to_string(), authority.to_string());
        }
        if let Some(need) = sentence_with_cue(&sentences, NEED_CUES) {
            values.insert(keys::NEED.to_string(), need);
        }
        if let Some(timeline) = extract_timeline(&normalized_text) {
            values.insert(keys::TIMELINE.to_string(), timeline);
        }

        let confidence_score = confidence_score(values.len());
        ExtractedSignals { values, confidence_score }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().replace('’', "'").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_sentences(text: &str) -> Vec<String> {
    text.replace('’', "'")
        .split(['.', '!', '?', '\n', ';'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| contains_phrase(haystack, needle))
}

fn sentence_with_cue(sentences: &[String], cues: &[&str]) -> Option<String> {
    sentences.iter().find(|sentence| contains_any(&normalize_text(sentence), cues)).cloned()
}

fn extract_urgency(normalized_text: &str) -> Option<&'static str> {
    if contains_any(normalized_text, NOT_BUYING_CUES) || contains_any(normalized_text, LOW_URGENCY_CUES)
    {
        Some("low")
    } else if contains_any(normalized_text, CRITICAL_URGENCY_CUES) {
        Some("critical")
    } else if contains_any(normalized_text, HIGH_URGENCY_CUES) {
        Some("high")
    } else {
        None
    }
}

fn extract_budget(normalized_text: &str, sentences: &[String]) -> Option<String> {
    if contains_any(normalized_text, NO_BUDGET_CUES) {
        return Some("no budget".to_string());
    }
    let has_money = normalized_text.split_whitespace().any(is_money_token);
    if has_money || contains_any(normalized_text, BUDGET_CUES) {
        return sentences
            .iter()
            .find(|sentence| {
                let normalized = normalize_text(sentence);
                normalized.split_whitespace().any(is_money_token)
                    || contains_any(&normalized, BUDGET_CUES)
            })
            .cloned();
    }
    None
}

fn is_money_token(token: &str) -> bool {
    let token = token.trim_matches(|c: char| c == ',' || c == '.' || c == ')' || c == '(');
    let Some(amount) = token.strip_prefix('$').or_else(|| token.strip_prefix('€')) else {
        return false;
    };
    let amount = amount.trim_end_matches(['k', 'm']);
    !amount.is_empty() && amount.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.')
}

fn extract_authority(normalized_text: &str) -> Option<&'static str> {
    if contains_any(normalized_text, NO_AUTHORITY_CUES) {
        Some("no authority")
    } else if contains_any(normalized_text, DECISION_MAKER_CUES) {
        Some("decision maker")
    } else if contains_any(normalized_text, INFLUENCER_CUES) {
        Some("influencer, needs sign off")
    } else if contains_any(normalized_text, TECHNICAL_CUES) {
        Some("technical evaluation")
    } else {
        None
    }
}

fn extract_timeline(normalized_text: &str) -> Option<String> {
    if contains_any(normalized_text, NOT_BUYING_CUES) || contains_any(normalized_text, NO_TIMELINE_CUES)
    {
        return Some("no timeline".to_string());
    }
    TIMELINE_PATTERNS
        .iter()
        .find(|pattern| contains_phrase(normalized_text, pattern))
        .map(|pattern| (*pattern).to_string())
}

fn confidence_score(fields_found: usize) -> u8 {
    let score = 10 + fields_found * 15;
    score.min(100) as u8
}
