//! Quiz rules that do not touch storage: colon-delimited lists, answer
//! checking, verdict strings and random selection.

use std::collections::{BTreeSet, HashSet};

use rand::seq::SliceRandom;

/// Verdict recorded in the activity log for a correct answer.
pub const CORRECT_VERDICT: &str = "正解";

const INCORRECT_VERDICT_PREFIX: &str = "不正解。正しい答えは: ";

/// Splits a colon-delimited field, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(':')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

pub fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

/// A submission is correct when its de-duplicated, trimmed choices equal the
/// stored answer set exactly. Order and repetition are irrelevant.
pub fn is_correct_answer(submitted: &[String], stored_answer: &str) -> bool {
    let submitted: HashSet<&str> = submitted
        .iter()
        .map(|choice| choice.trim())
        .filter(|choice| !choice.is_empty())
        .collect();

    let expected: HashSet<&str> = stored_answer
        .split(':')
        .map(str::trim)
        .filter(|choice| !choice.is_empty())
        .collect();

    !expected.is_empty() && submitted == expected
}

pub fn verdict(is_correct: bool, correct_answers: &[String]) -> String {
    if is_correct {
        CORRECT_VERDICT.to_string()
    } else {
        format!("{}{}", INCORRECT_VERDICT_PREFIX, correct_answers.join(", "))
    }
}

/// Exact match against the correct sentinel; anything else is a miss.
pub fn is_correct_verdict(verdict: &str) -> bool {
    verdict.trim() == CORRECT_VERDICT
}

/// Individual tags of a colon-delimited genre field.
pub fn genre_tags(genre: &str) -> BTreeSet<String> {
    split_list(genre).into_iter().collect()
}

/// Uniform sample of up to `count` items without replacement.
pub fn sample<T>(mut items: Vec<T>, count: usize) -> Vec<T> {
    let mut rng = rand::rng();
    items.shuffle(&mut rng);
    items.truncate(count);
    items
}

pub fn shuffled(items: Vec<String>) -> Vec<String> {
    let len = items.len();
    sample(items, len)
}

/// Rounds a percentage to one decimal place.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `correct / total * 100`, or 0 when nothing was answered.
pub fn accuracy(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round_one_decimal(correct as f64 / total as f64 * 100.0)
}
