use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The longest ticker symbol we accept (NYSE/NASDAQ symbols plus class
/// suffixes like BRK.B or BF-B all fit well below this).
const MAX_TICKER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "KRW")]
    Krw,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Krw => write!(f, "KRW"),
        }
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "KRW" => Ok(Currency::Krw),
            _ => Err(ValidationError::UnknownCurrency(s.to_string())),
        }
    }
}

/// A single buy or sell record. Immutable once created except through
/// explicit edit-replace in the store; deleted by id.
///
/// The serde layout (camelCase keys, `BUY`/`SELL`, `USD`/`KRW`) matches the
/// persisted and backup JSON format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub ticker: String,
    pub broker: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchase_date: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub currency: Currency,
}

impl Transaction {
    /// Builds a validated transaction with a fresh id.
    pub fn new(
        ticker: &str,
        broker: &str,
        quantity: f64,
        purchase_price: f64,
        purchase_date: DateTime<Utc>,
        transaction_type: TransactionType,
        currency: Currency,
    ) -> Result<Transaction, ValidationError> {
        let ticker = validate_ticker(ticker)?;
        if broker.trim().is_empty() {
            return Err(ValidationError::BrokerRequired);
        }
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(ValidationError::NonPositiveQuantity(quantity));
        }
        if purchase_price <= 0.0 || !purchase_price.is_finite() {
            return Err(ValidationError::NonPositivePrice(purchase_price));
        }
        if purchase_date > Utc::now() {
            return Err(ValidationError::FutureDate);
        }

        Ok(Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            ticker,
            broker: broker.trim().to_string(),
            quantity,
            purchase_price,
            purchase_date,
            transaction_type,
            currency,
        })
    }

    /// Quantity with its sign: positive for BUY, negative for SELL.
    pub fn signed_quantity(&self) -> f64 {
        match self.transaction_type {
            TransactionType::Buy => self.quantity,
            TransactionType::Sell => -self.quantity,
        }
    }

    /// Quantity x purchase price.
    pub fn value(&self) -> f64 {
        self.quantity * self.purchase_price
    }
}

/// Normalizes and checks a ticker symbol: 1-10 chars, uppercase ASCII
/// letters and digits plus `.` and `-`, starting with a letter.
pub fn validate_ticker(ticker: &str) -> Result<String, ValidationError> {
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ValidationError::TickerRequired);
    }
    if ticker.len() > MAX_TICKER_LEN {
        return Err(ValidationError::InvalidTicker(ticker));
    }
    let mut chars = ticker.chars();
    let first = chars.next().unwrap_or(' ');
    if !first.is_ascii_uppercase() {
        return Err(ValidationError::InvalidTicker(ticker));
    }
    if !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(ValidationError::InvalidTicker(ticker));
    }
    Ok(ticker)
}

/// Parses a `YYYY-MM-DD` CLI argument into a UTC midnight timestamp.
pub fn parse_purchase_date(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ValidationError::InvalidDate(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(ticker: &str, quantity: f64, price: f64) -> Result<Transaction, ValidationError> {
        Transaction::new(
            ticker,
            "Schwab",
            quantity,
            price,
            Utc::now(),
            TransactionType::Buy,
            Currency::Usd,
        )
    }

    #[test]
    fn test_valid_transaction() {
        let tx = buy("AAPL", 10.0, 178.5).unwrap();
        assert_eq!(tx.ticker, "AAPL");
        assert_eq!(tx.signed_quantity(), 10.0);
        assert_eq!(tx.value(), 1785.0);
        assert!(!tx.id.is_empty());
    }

    #[test]
    fn test_ticker_is_normalized() {
        let tx = buy(" brk.b ", 1.0, 400.0).unwrap();
        assert_eq!(tx.ticker, "BRK.B");
    }

    #[test]
    fn test_rejects_bad_tickers() {
        assert_eq!(buy("", 1.0, 1.0), Err(ValidationError::TickerRequired));
        assert!(matches!(
            buy("1ABC", 1.0, 1.0),
            Err(ValidationError::InvalidTicker(_))
        ));
        assert!(matches!(
            buy("WAYTOOLONGTICKER", 1.0, 1.0),
            Err(ValidationError::InvalidTicker(_))
        ));
        assert!(matches!(
            buy("AA PL", 1.0, 1.0),
            Err(ValidationError::InvalidTicker(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        assert_eq!(
            buy("AAPL", 0.0, 100.0),
            Err(ValidationError::NonPositiveQuantity(0.0))
        );
        assert_eq!(
            buy("AAPL", -3.0, 100.0),
            Err(ValidationError::NonPositiveQuantity(-3.0))
        );
        assert_eq!(
            buy("AAPL", 1.0, 0.0),
            Err(ValidationError::NonPositivePrice(0.0))
        );
        assert_eq!(
            buy("AAPL", 1.0, -5.0),
            Err(ValidationError::NonPositivePrice(-5.0))
        );
    }

    #[test]
    fn test_rejects_future_date() {
        let tomorrow = Utc::now() + chrono::Duration::days(1);
        let result = Transaction::new(
            "AAPL",
            "Schwab",
            1.0,
            100.0,
            tomorrow,
            TransactionType::Buy,
            Currency::Usd,
        );
        assert_eq!(result, Err(ValidationError::FutureDate));
    }

    #[test]
    fn test_rejects_empty_broker() {
        let result = Transaction::new(
            "AAPL",
            "  ",
            1.0,
            100.0,
            Utc::now(),
            TransactionType::Buy,
            Currency::Usd,
        );
        assert_eq!(result, Err(ValidationError::BrokerRequired));
    }

    #[test]
    fn test_parse_purchase_date() {
        let date = parse_purchase_date("2024-05-17").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-05-17T00:00:00+00:00");
        assert!(parse_purchase_date("17/05/2024").is_err());
        assert!(parse_purchase_date("2024-13-01").is_err());
    }

    #[test]
    fn test_serde_layout_matches_persisted_format() {
        let tx = buy("MSFT", 2.0, 410.0).unwrap();
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["ticker"], "MSFT");
        assert_eq!(json["purchasePrice"], 410.0);
        assert_eq!(json["transactionType"], "BUY");
        assert_eq!(json["currency"], "USD");
        assert!(json["purchaseDate"].is_string());

        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
