// src/services/fetch.rs
use log::warn;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{provider} returned HTTP {status} for {symbol}: {body}")]
    Status {
        provider: &'static str,
        symbol: String,
        status: u16,
        body: String,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no data for {symbol}: {reason}")]
    MissingData { symbol: String, reason: String },
    #[error("{0} is not set")]
    NotConfigured(&'static str),
}

impl FetchError {
    pub fn missing(symbol: &str, reason: impl Into<String>) -> Self {
        FetchError::MissingData {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// What a job does when fetching one symbol fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fail the whole job on the first error.
    #[default]
    Abort,
    /// Log the error and carry on with the remaining symbols.
    Skip,
}

impl FailurePolicy {
    /// Apply the policy to one symbol's fetch result. `Ok(None)` means the symbol was skipped.
    pub fn handle<T>(self, symbol: &str, result: Result<T, FetchError>) -> Result<Option<T>, FetchError> {
        match (result, self) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(e), FailurePolicy::Skip) => {
                warn!("Error fetching data for {}, skipping: {}", symbol, e);
                Ok(None)
            }
            (Err(e), FailurePolicy::Abort) => Err(e),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" => Ok(FailurePolicy::Skip),
            other => Err(format!("unknown failure policy '{}', expected 'abort' or 'skip'", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Fetch records for each symbol in order, one request at a time, and concatenate them.
pub async fn fetch_each<T, F, Fut>(
    symbols: &[String],
    policy: FailurePolicy,
    mut fetch: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let mut all = Vec::new();
    for symbol in symbols {
        let result = fetch(symbol.clone()).await;
        if let Some(records) = policy.handle(symbol, result)? {
            all.extend(records);
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["AAPL".to_string(), "BAD".to_string(), "MSFT".to_string()]
    }

    async fn flaky(symbol: String) -> Result<Vec<String>, FetchError> {
        if symbol == "BAD" {
            Err(FetchError::Status {
                provider: "test",
                symbol,
                status: 429,
                body: "rate limited".to_string(),
            })
        } else {
            Ok(vec![format!("{}-1", symbol), format!("{}-2", symbol)])
        }
    }

    #[tokio::test]
    async fn test_skip_policy_continues_past_failures() {
        let records = fetch_each(&symbols(), FailurePolicy::Skip, flaky).await.unwrap();
        assert_eq!(records, vec!["AAPL-1", "AAPL-2", "MSFT-1", "MSFT-2"]);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let mut seen = Vec::new();
        let result = fetch_each(&symbols(), FailurePolicy::Abort, |symbol| {
            seen.push(symbol.clone());
            flaky(symbol)
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 429, .. })));
        assert_eq!(seen, vec!["AAPL", "BAD"]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("skip".parse::<FailurePolicy>(), Ok(FailurePolicy::Skip));
        assert_eq!(" ABORT ".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
