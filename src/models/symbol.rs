use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_SYMBOL_LEN: usize = 20;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,
    #[error("symbol {0:?} is longer than {MAX_SYMBOL_LEN} characters")]
    TooLong(String),
    #[error("symbol {0:?} may only contain letters and digits")]
    InvalidCharacters(String),
}

fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+$").expect("static symbol pattern compiles"))
}

/// Internal ticker identifier ("BTC"), always upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trim, upper-case and validate a ticker.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let value = raw.trim().to_uppercase();
        if value.is_empty() {
            return Err(SymbolError::Empty);
        }
        if value.chars().count() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(value));
        }
        if !symbol_pattern().is_match(&value) {
            return Err(SymbolError::InvalidCharacters(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(Symbol::parse(" btc ").unwrap().as_str(), "BTC");
        assert_eq!(Symbol::parse("1inch").unwrap().as_str(), "1INCH");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(Symbol::parse("  "), Err(SymbolError::Empty));
        assert!(matches!(Symbol::parse("BTC-USD"), Err(SymbolError::InvalidCharacters(_))));
        assert!(matches!(Symbol::parse("price:BTC"), Err(SymbolError::InvalidCharacters(_))));
        assert!(matches!(
            Symbol::parse(&"A".repeat(MAX_SYMBOL_LEN + 1)),
            Err(SymbolError::TooLong(_))
        ));
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let symbol: Symbol = serde_json::from_str(r#""eth""#).unwrap();
        assert_eq!(symbol.as_str(), "ETH");
        assert!(serde_json::from_str::<Symbol>(r#""../etc""#).is_err());
    }
}
