//! Price pair identifiers (`BASE/QUOTE`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A pair string that is not of the form `BASE/QUOTE`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid price pair `{0}`, expected BASE/QUOTE")]
pub struct InvalidPair(pub String);

/// Base/quote asset tuple such as `AAVE/ETH`. Symbols are stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PricePair {
    base: String,
    quote: String,
}

impl PricePair {
    /// Build a pair from its two symbols.
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim().to_uppercase(),
            quote: quote.as_ref().trim().to_uppercase(),
        }
    }

    /// Asset being priced.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Unit the price is expressed in.
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Whether the price is expressed in `unit` (case-insensitive).
    pub fn is_quoted_in(&self, unit: &str) -> bool {
        self.quote.eq_ignore_ascii_case(unit)
    }
}

impl FromStr for PricePair {
    type Err = InvalidPair;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote))
                if !base.trim().is_empty() && !quote.trim().is_empty() && !quote.contains('/') =>
            {
                Ok(Self::new(base, quote))
            }
            _ => Err(InvalidPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for PricePair {
    type Error = InvalidPair;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PricePair> for String {
    fn from(pair: PricePair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for PricePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let pair: PricePair = "aave/eth".parse().unwrap();
        assert_eq!(pair.base(), "AAVE");
        assert_eq!(pair.quote(), "ETH");
        assert!(pair.is_quoted_in("eth"));
        assert_eq!(pair.to_string(), "AAVE/ETH");
    }

    #[test]
    fn test_reject_malformed_pairs() {
        assert!("AAVE".parse::<PricePair>().is_err());
        assert!("/ETH".parse::<PricePair>().is_err());
        assert!("AAVE/".parse::<PricePair>().is_err());
        assert!("A/B/C".parse::<PricePair>().is_err());
    }
}
