// src/services/sentiment.rs
use vader_sentiment::SentimentIntensityAnalyzer;

/// Scores text polarity as a single compound value in [-1, 1].
pub trait SentimentScorer: Send + Sync {
    fn compound(&self, text: &str) -> f64;
}

/// Lexicon and rule based scorer (VADER).
pub struct VaderScorer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl VaderScorer {
    pub fn new() -> Self {
        VaderScorer {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }
}

impl Default for VaderScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for VaderScorer {
    fn compound(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let scores = self.analyzer.polarity_scores(text);
        scores
            .get("compound")
            .copied()
            .filter(|score| score.is_finite())
            .unwrap_or(0.0)
            .clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_direction() {
        let scorer = VaderScorer::new();
        assert!(scorer.compound("Shares soared after a great quarter with excellent growth") > 0.0);
        assert!(scorer.compound("The stock crashed after a terrible, disappointing report") < 0.0);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let scorer = VaderScorer::new();
        for text in [
            "GREAT!!! AMAZING!!! BEST EVER!!! :)",
            "horrible awful worst disaster catastrophe fraud",
            "The company reported quarterly results.",
        ] {
            let score = scorer.compound(text);
            assert!((-1.0..=1.0).contains(&score), "{} out of range for {:?}", score, text);
        }
    }

    #[test]
    fn test_empty_text_is_neutral() {
        assert_eq!(VaderScorer::new().compound(""), 0.0);
    }
}
