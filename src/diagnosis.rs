//! Learning-pattern diagnosis over a user's chronological answer history.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::quiz::round_one_decimal;

/// Below this many answers every history is diagnosed as `Beginner`.
pub const MIN_ANSWERS: usize = 5;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Balanced,
    Specialist,
    Growth,
    Improvement,
    Beginner,
}

impl PatternType {
    pub fn recommendation(&self) -> &'static str {
        match self {
            PatternType::Balanced => {
                "Balanced: you study every genre evenly and have broad knowledge."
            }
            PatternType::Specialist => {
                "Specialist: you focus on your strongest genres. Consider going deeper there."
            }
            PatternType::Growth => "Growth: your results keep improving as you study. Keep it up!",
            PatternType::Improvement => {
                "Improvement: scores are still low but steadily improving. Consistency matters."
            }
            PatternType::Beginner => {
                "Beginner: answer more questions for a more detailed diagnosis."
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenreRate {
    pub correct_rate: f64,
    pub count: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub pattern_type: PatternType,
    pub score: i64,
    pub genre_stats: BTreeMap<String, GenreRate>,
    pub genre_concentration: i64,
    pub growth_rate: f64,
    pub recommendation: String,
}

impl Diagnosis {
    fn beginner() -> Self {
        Self {
            pattern_type: PatternType::Beginner,
            score: 0,
            genre_stats: BTreeMap::new(),
            genre_concentration: 0,
            growth_rate: 0.0,
            recommendation: PatternType::Beginner.recommendation().to_string(),
        }
    }
}

fn correct_rate(history: &[(&str, bool)]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let correct = history.iter().filter(|(_, is_correct)| *is_correct).count();
    correct as f64 / history.len() as f64 * 100.0
}

fn halves<'h, 'a>(history: &'h [(&'a str, bool)]) -> (&'h [(&'a str, bool)], &'h [(&'a str, bool)]) {
    history.split_at(history.len() / 2)
}

/// Relative change of the correct rate between the two halves of the history.
fn growth_rate(history: &[(&str, bool)]) -> f64 {
    let (first, second) = halves(history);
    if first.is_empty() {
        return 0.0;
    }

    let first_rate = correct_rate(first);
    if first_rate == 0.0 {
        return 0.0;
    }
    (correct_rate(second) - first_rate) / first_rate * 100.0
}

/// Population standard deviation.
fn spread(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn max_rate(rates: &[f64]) -> f64 {
    rates.iter().copied().fold(f64::MIN, f64::max)
}

fn min_rate(rates: &[f64]) -> f64 {
    rates.iter().copied().fold(f64::MAX, f64::min)
}

fn is_balanced(rates: &[f64]) -> bool {
    rates.len() >= 2 && rates.iter().all(|rate| *rate >= 70.0) && spread(rates) <= 15.0
}

fn is_specialist(rates: &[f64]) -> bool {
    if rates.len() < 2 {
        return false;
    }
    let best = max_rate(rates);
    best - min_rate(rates) >= 30.0 && best >= 70.0
}

fn is_growth(history: &[(&str, bool)]) -> bool {
    let (first, second) = halves(history);
    if first.is_empty() || second.is_empty() {
        return false;
    }

    let first_rate = correct_rate(first);
    let second_rate = correct_rate(second);
    // From a zero start any second half above the bar counts as growth.
    let grown = first_rate == 0.0 || (second_rate - first_rate) / first_rate * 100.0 >= 20.0;
    grown && second_rate >= 60.0
}

fn is_improving(overall: f64, growth: f64) -> bool {
    overall < 60.0 && growth > 10.0
}

fn concentration(rates: &[f64]) -> f64 {
    if rates.len() < 2 {
        return 0.0;
    }
    (max_rate(rates) - min_rate(rates)).min(100.0)
}

/// Classifies `history`, given oldest first as `(genre, is_correct)` pairs.
pub fn diagnose<'a, I>(history: I) -> Diagnosis
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let history: Vec<(&str, bool)> = history.into_iter().collect();
    if history.len() < MIN_ANSWERS {
        return Diagnosis::beginner();
    }

    let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for (genre, is_correct) in &history {
        let genre = if genre.trim().is_empty() { "Unknown" } else { *genre };
        let tally = tallies.entry(genre.to_string()).or_default();
        tally.1 += 1;
        if *is_correct {
            tally.0 += 1;
        }
    }

    let rates: Vec<f64> = tallies
        .values()
        .map(|(correct, total)| *correct as f64 / *total as f64 * 100.0)
        .collect();

    let overall = correct_rate(&history);
    let growth = growth_rate(&history);

    let (pattern_type, score) = if is_balanced(&rates) {
        (PatternType::Balanced, overall.min(100.0))
    } else if is_specialist(&rates) {
        (PatternType::Specialist, max_rate(&rates).min(100.0))
    } else if is_growth(&history) {
        (PatternType::Growth, (overall * 1.2).min(100.0))
    } else if is_improving(overall, growth) {
        (PatternType::Improvement, overall * 0.8 + 10.0)
    } else {
        (PatternType::Beginner, overall)
    };

    let genre_stats = tallies
        .into_iter()
        .map(|(genre, (correct, total))| {
            let rate = GenreRate {
                correct_rate: round_one_decimal(correct as f64 / total as f64 * 100.0),
                count: total,
            };
            (genre, rate)
        })
        .collect();

    Diagnosis {
        pattern_type,
        score: score.round() as i64,
        genre_stats,
        genre_concentration: concentration(&rates).round() as i64,
        growth_rate: (growth * 100.0).round() / 100.0,
        recommendation: pattern_type.recommendation().to_string(),
    }
}
