// src/services/risk.rs
use log::warn;
use serde::Serialize;

use crate::models::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailingMetrics {
    /// Population standard deviation of daily returns (fraction, not percent).
    /// `None` when there are fewer than two closes.
    pub volatility: Option<f64>,
    /// Percent change from the first to the last close.
    pub price_change_1y: f64,
}

fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .filter(|r| r.is_finite())
        .collect()
}

fn calculate_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = calculate_average(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Volatility and one-year change from a year of closes, oldest first.
pub fn trailing_metrics(closes: &[f64]) -> Option<TrailingMetrics> {
    let first = *closes.first()?;
    let last = *closes.last()?;

    let returns = daily_returns(closes);
    let volatility = population_std(&returns);
    if volatility.is_none() {
        warn!("Insufficient closes ({}) for volatility calculation", closes.len());
    }

    Some(TrailingMetrics {
        volatility,
        price_change_1y: (last - first) / first * 100.0,
    })
}

/// Inputs to the risk rules. A value of zero counts as missing, matching how the
/// provider reports unknown metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskInputs {
    pub beta: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub market_cap: Option<f64>,
    /// Percent.
    pub dividend_yield: Option<f64>,
    pub volatility: Option<f64>,
    pub price_change_1y: Option<f64>,
}

fn known(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && v.is_finite())
}

fn above(value: Option<f64>, threshold: f64) -> bool {
    known(value).is_some_and(|v| v > threshold)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    known(value).is_some_and(|v| v < threshold)
}

pub struct RiskRule {
    pub name: &'static str,
    pub label: RiskLevel,
    pub predicate: fn(&RiskInputs) -> bool,
}

impl RiskRule {
    pub fn matches(&self, inputs: &RiskInputs) -> bool {
        (self.predicate)(inputs)
    }
}

/// High-risk markers first, then the Low overrides.
pub fn default_rules() -> Vec<RiskRule> {
    vec![
        RiskRule { name: "beta above 1.5", label: RiskLevel::High, predicate: |i| above(i.beta, 1.5) },
        RiskRule { name: "trailing P/E above 30", label: RiskLevel::High, predicate: |i| above(i.trailing_pe, 30.0) },
        RiskRule { name: "market cap below 5B", label: RiskLevel::High, predicate: |i| below(i.market_cap, 5e9) },
        RiskRule {
            name: "volatility above 3%",
            label: RiskLevel::High,
            predicate: |i| i.volatility.is_some_and(|v| v > 0.03),
        },
        RiskRule { name: "beta below 1", label: RiskLevel::Low, predicate: |i| below(i.beta, 1.0) },
        RiskRule { name: "market cap above 200B", label: RiskLevel::Low, predicate: |i| above(i.market_cap, 200e9) },
        RiskRule { name: "dividend yield above 3%", label: RiskLevel::Low, predicate: |i| above(i.dividend_yield, 3.0) },
        RiskRule {
            name: "one-year change above 20%",
            label: RiskLevel::Low,
            predicate: |i| i.price_change_1y.is_some_and(|v| v > 20.0),
        },
    ]
}

/// Ordered rules, evaluated in sequence; the last matching rule decides.
pub struct RiskClassifier {
    rules: Vec<RiskRule>,
    default: RiskLevel,
}

impl RiskClassifier {
    pub fn new(rules: Vec<RiskRule>, default: RiskLevel) -> Self {
        RiskClassifier { rules, default }
    }

    pub fn classify(&self, inputs: &RiskInputs) -> RiskLevel {
        self.rules
            .iter()
            .filter(|rule| rule.matches(inputs))
            .last()
            .map(|rule| rule.label)
            .unwrap_or(self.default)
    }

    /// Names of the rules that fire, in evaluation order.
    pub fn matching_rules(&self, inputs: &RiskInputs) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(inputs))
            .map(|rule| rule.name)
            .collect()
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        RiskClassifier::new(default_rules(), RiskLevel::Medium)
    }
}
