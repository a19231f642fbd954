//! Score is `(yes - no) / no` over the strongest surface form of each class.
//! Signed and unbounded; only the sign and rough magnitude carry meaning.

use std::collections::HashMap;

/// Weight used for a class with no known surface form, and for a zero "no" weight.
pub const NEGLIGIBLE_WEIGHT: f64 = 1e-10;

pub trait Vocabulary {
    /// `None` for forms the tokenizer maps to its unknown token.
    fn token_id(&self, surface: &str) -> Option<u32>;
}

pub trait NextTokenLogits {
    fn weight(&self, token_id: u32) -> Option<f64>;
}

impl NextTokenLogits for [f32] {
    fn weight(&self, token_id: u32) -> Option<f64> {
        self.get(token_id as usize).map(|&w| f64::from(w))
    }
}

impl NextTokenLogits for Vec<f32> {
    fn weight(&self, token_id: u32) -> Option<f64> {
        self.as_slice().weight(token_id)
    }
}

impl NextTokenLogits for HashMap<u32, f64> {
    fn weight(&self, token_id: u32) -> Option<f64> {
        self.get(&token_id).copied()
    }
}

impl Vocabulary for HashMap<String, u32> {
    fn token_id(&self, surface: &str) -> Option<u32> {
        self.get(surface).copied()
    }
}

// bare, capitalized, and both with a leading space
pub fn surface_forms(word: &str) -> [String; 4] {
    let cap = capitalize(word);
    [
        word.to_string(),
        cap.clone(),
        format!(" {word}"),
        format!(" {cap}"),
    ]
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassWeights {
    pub positive: f64,
    pub negative: f64,
}

impl ClassWeights {
    pub fn score(&self) -> f64 {
        let negative = if self.negative == 0.0 {
            NEGLIGIBLE_WEIGHT
        } else {
            self.negative
        };
        (self.positive - negative) / negative
    }
}

#[derive(Debug, Clone)]
pub struct ScoreDeriver {
    positive_forms: [String; 4],
    negative_forms: [String; 4],
    softmax: bool,
}

impl Default for ScoreDeriver {
    fn default() -> Self {
        Self::new("yes", "no", false)
    }
}

impl ScoreDeriver {
    pub fn new(positive_word: &str, negative_word: &str, softmax: bool) -> Self {
        Self {
            positive_forms: surface_forms(positive_word),
            negative_forms: surface_forms(negative_word),
            softmax,
        }
    }

    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self::new(
            &cfg.scoring.positive_word,
            &cfg.scoring.negative_word,
            cfg.scoring.softmax,
        )
    }

    pub fn candidate_forms(&self) -> Vec<String> {
        self.positive_forms
            .iter()
            .chain(self.negative_forms.iter())
            .cloned()
            .collect()
    }

    pub fn class_weights<L, V>(&self, logits: &L, vocab: &V) -> ClassWeights
    where
        L: NextTokenLogits + ?Sized,
        V: Vocabulary + ?Sized,
    {
        let positive = lookup(&self.positive_forms, logits, vocab);
        let negative = lookup(&self.negative_forms, logits, vocab);
        let (positive, negative) = if self.softmax {
            normalize(positive, negative)
        } else {
            (positive, negative)
        };
        ClassWeights {
            positive: max_or_floor(&positive),
            negative: max_or_floor(&negative),
        }
    }

    pub fn derive_score<L, V>(&self, logits: &L, vocab: &V) -> f64
    where
        L: NextTokenLogits + ?Sized,
        V: Vocabulary + ?Sized,
    {
        self.class_weights(logits, vocab).score()
    }
}

fn lookup<L, V>(forms: &[String; 4], logits: &L, vocab: &V) -> Vec<f64>
where
    L: NextTokenLogits + ?Sized,
    V: Vocabulary + ?Sized,
{
    forms
        .iter()
        .filter_map(|f| vocab.token_id(f))
        .filter_map(|id| logits.weight(id))
        .collect()
}

fn max_or_floor(weights: &[f64]) -> f64 {
    weights
        .iter()
        .copied()
        .reduce(f64::max)
        .unwrap_or(NEGLIGIBLE_WEIGHT)
}

// Candidate logits only, so this is not a softmax over the full vocabulary.
fn normalize(positive: Vec<f64>, negative: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    let Some(max) = positive
        .iter()
        .chain(negative.iter())
        .copied()
        .reduce(f64::max)
    else {
        return (positive, negative);
    };
    let sum: f64 = positive
        .iter()
        .chain(negative.iter())
        .map(|x| (x - max).exp())
        .sum();
    let scale = |xs: Vec<f64>| -> Vec<f64> { xs.into_iter().map(|x| (x - max).exp() / sum).collect() };
    (scale(positive), scale(negative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[(&str, u32)]) -> HashMap<String, u32> {
        entries.iter().map(|(s, id)| (s.to_string(), *id)).collect()
    }

    #[test]
    fn surface_forms_cover_case_and_space() {
        assert_eq!(surface_forms("yes"), ["yes", "Yes", " yes", " Yes"]);
    }

    #[test]
    fn takes_max_per_class() {
        let v = vocab(&[("yes", 0), ("Yes", 1), ("no", 2), (" No", 3)]);
        let logits = vec![1.0f32, 4.0, 2.0, 1.0];
        let w = ScoreDeriver::default().class_weights(&logits, &v);
        assert_eq!(w.positive, 4.0);
        assert_eq!(w.negative, 2.0);
        assert_eq!(ScoreDeriver::default().derive_score(&logits, &v), 1.0);
    }

    #[test]
    fn negative_when_no_dominates() {
        let v = vocab(&[("Yes", 0), ("No", 1)]);
        let logits = vec![1.0f32, 4.0];
        assert!(ScoreDeriver::default().derive_score(&logits, &v) < 0.0);
    }

    #[test]
    fn tie_scores_zero() {
        let v = vocab(&[("Yes", 0), ("No", 1)]);
        let logits = vec![3.0f32, 3.0];
        assert_eq!(ScoreDeriver::default().derive_score(&logits, &v), 0.0);
    }

    #[test]
    fn unknown_class_falls_back_to_floor() {
        let v = vocab(&[("No", 1)]);
        let logits = vec![0.0f32, 2.0];
        let w = ScoreDeriver::default().class_weights(&logits, &v);
        assert_eq!(w.positive, NEGLIGIBLE_WEIGHT);
    }

    #[test]
    fn zero_negative_weight_is_clamped() {
        let w = ClassWeights {
            positive: 1.0,
            negative: 0.0,
        };
        let s = w.score();
        assert!(s.is_finite());
        assert!(s > 1e9);
    }

    #[test]
    fn out_of_range_token_is_ignored() {
        let v = vocab(&[("Yes", 99), ("yes", 0), ("No", 1)]);
        let logits = vec![2.0f32, 1.0];
        let w = ScoreDeriver::default().class_weights(&logits, &v);
        assert_eq!(w.positive, 2.0);
    }

    #[test]
    fn softmax_keeps_weights_in_unit_range() {
        let v = vocab(&[("Yes", 0), ("yes", 1), ("No", 2)]);
        let logits = vec![5.0f32, 1.0, 3.0];
        let w = ScoreDeriver::new("yes", "no", true).class_weights(&logits, &v);
        assert!(w.positive > 0.0 && w.positive <= 1.0);
        assert!(w.negative > 0.0 && w.negative < w.positive);
        let total: f64 = [5.0f64, 1.0, 3.0].iter().map(|x| (x - 5.0).exp()).sum();
        assert!((w.negative - (-2.0f64).exp() / total).abs() < 1e-12);
    }

    #[test]
    fn candidate_forms_lists_both_classes() {
        let forms = ScoreDeriver::default().candidate_forms();
        assert_eq!(forms.len(), 8);
        assert!(forms.contains(&" No".to_string()));
    }
}
