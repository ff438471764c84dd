//! Aggregation engine: turns the flat transaction list into per-ticker
//! holdings, per-broker value distribution, and a portfolio summary.
//!
//! Everything here is a pure function of the transaction list and an
//! injected price map; callers recompute on every store change. Tickers
//! missing from the price map are valued at their average cost.

use crate::transaction::{Transaction, TransactionType};
use std::collections::HashMap;

/// Derived position in one ticker. Never persisted; recomputed from the
/// full transaction list on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_percent: f64,
    /// Percentage share of total portfolio value.
    pub weight: f64,
}

/// Share of portfolio value attributed to one broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSlice {
    pub broker: String,
    pub value: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_investment: f64,
    pub total_gain_loss: f64,
    pub gain_loss_percent: f64,
}

#[derive(Default)]
struct Accumulator {
    quantity: f64,
    average_price: f64,
}

/// Signed-quantity accumulation per ticker.
///
/// The average price is a running weighted average updated only on BUY;
/// a SELL reduces the quantity but preserves the cost basis. Tickers
/// netting out to zero or negative are dropped from the output.
fn accumulate(transactions: &[Transaction]) -> HashMap<String, Accumulator> {
    let mut positions: HashMap<String, Accumulator> = HashMap::new();

    for transaction in transactions {
        let position = positions.entry(transaction.ticker.clone()).or_default();
        match transaction.transaction_type {
            TransactionType::Buy => {
                let new_quantity = position.quantity + transaction.quantity;
                if new_quantity > 0.0 {
                    position.average_price = (position.quantity * position.average_price
                        + transaction.value())
                        / new_quantity;
                }
                position.quantity = new_quantity;
            }
            TransactionType::Sell => {
                position.quantity -= transaction.quantity;
            }
        }
    }

    positions
}

/// Computes all current holdings, valued against `prices` and weighted by
/// share of total portfolio value. Division guards return 0.0 rather than
/// NaN or infinity. An empty transaction list yields an empty result.
pub fn compute_holdings(
    transactions: &[Transaction],
    prices: &HashMap<String, f64>,
) -> Vec<Holding> {
    let mut holdings: Vec<Holding> = accumulate(transactions)
        .into_iter()
        .filter(|(_, position)| position.quantity > 0.0)
        .map(|(ticker, position)| {
            let price = prices
                .get(&ticker)
                .copied()
                .unwrap_or(position.average_price);
            let current_value = position.quantity * price;
            let invested = position.quantity * position.average_price;
            let gain_loss = current_value - invested;
            let gain_loss_percent = if invested > 0.0 {
                gain_loss / invested * 100.0
            } else {
                0.0
            };
            Holding {
                ticker,
                quantity: position.quantity,
                average_price: position.average_price,
                current_value,
                gain_loss,
                gain_loss_percent,
                weight: 0.0,
            }
        })
        .collect();

    let total_value: f64 = holdings.iter().map(|h| h.current_value).sum();
    if total_value > 0.0 {
        for holding in &mut holdings {
            holding.weight = holding.current_value / total_value * 100.0;
        }
    }

    // largest positions first, ticker as tie-breaker for stable output
    holdings.sort_by(|a, b| {
        b.current_value
            .partial_cmp(&a.current_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    holdings
}

/// Distributes portfolio value over brokers.
///
/// Attribution is per transaction: every transaction of a still-held
/// ticker contributes its signed quantity at that ticker's current unit
/// price to its broker. Summed over all brokers this equals total
/// portfolio value, and a ticker bought through several brokers is split
/// in proportion to the quantity each broker netted. Brokers netting out
/// to zero or negative are dropped.
pub fn compute_broker_distribution(
    transactions: &[Transaction],
    prices: &HashMap<String, f64>,
) -> Vec<BrokerSlice> {
    let unit_prices: HashMap<String, f64> = compute_holdings(transactions, prices)
        .into_iter()
        .map(|h| (h.ticker, h.current_value / h.quantity))
        .collect();

    let mut values: HashMap<String, f64> = HashMap::new();
    for transaction in transactions {
        if let Some(price) = unit_prices.get(&transaction.ticker) {
            *values.entry(transaction.broker.clone()).or_default() +=
                transaction.signed_quantity() * price;
        }
    }

    let mut slices: Vec<BrokerSlice> = values
        .into_iter()
        .filter(|(_, value)| *value > 0.0)
        .map(|(broker, value)| BrokerSlice {
            broker,
            value,
            weight: 0.0,
        })
        .collect();

    let total: f64 = slices.iter().map(|s| s.value).sum();
    if total > 0.0 {
        for slice in &mut slices {
            slice.weight = slice.value / total * 100.0;
        }
    }

    slices.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.broker.cmp(&b.broker))
    });
    slices
}

/// Portfolio totals over a computed set of holdings. A portfolio with no
/// investment reports 0 percent, never NaN.
pub fn compute_summary(holdings: &[Holding]) -> PortfolioSummary {
    let total_value: f64 = holdings.iter().map(|h| h.current_value).sum();
    let total_investment: f64 = holdings.iter().map(|h| h.quantity * h.average_price).sum();
    let total_gain_loss = total_value - total_investment;
    let gain_loss_percent = if total_investment > 0.0 {
        total_gain_loss / total_investment * 100.0
    } else {
        0.0
    };

    PortfolioSummary {
        total_value,
        total_investment,
        total_gain_loss,
        gain_loss_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Currency;
    use chrono::Utc;

    const EPSILON: f64 = 1e-9;

    fn tx(
        ticker: &str,
        broker: &str,
        quantity: f64,
        price: f64,
        transaction_type: TransactionType,
    ) -> Transaction {
        Transaction::new(
            ticker,
            broker,
            quantity,
            price,
            Utc::now(),
            transaction_type,
            Currency::Usd,
        )
        .unwrap()
    }

    fn buy(ticker: &str, quantity: f64, price: f64) -> Transaction {
        tx(ticker, "Schwab", quantity, price, TransactionType::Buy)
    }

    fn sell(ticker: &str, quantity: f64, price: f64) -> Transaction {
        tx(ticker, "Schwab", quantity, price, TransactionType::Sell)
    }

    fn prices(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(t, p)| (t.to_string(), *p))
            .collect()
    }

    #[test]
    fn test_buy_buy_sell_example() {
        // BUY 10 @ 100, BUY 5 @ 120, SELL 3 @ 150
        let transactions = vec![
            buy("AAPL", 10.0, 100.0),
            buy("AAPL", 5.0, 120.0),
            sell("AAPL", 3.0, 150.0),
        ];
        let holdings = compute_holdings(&transactions, &prices(&[("AAPL", 150.0)]));

        assert_eq!(holdings.len(), 1);
        let aapl = &holdings[0];
        assert_eq!(aapl.quantity, 12.0);
        assert!((aapl.average_price - 1600.0 / 15.0).abs() < EPSILON);
        assert!((aapl.current_value - 1800.0).abs() < EPSILON);
        assert!((aapl.gain_loss - (1800.0 - 12.0 * 1600.0 / 15.0)).abs() < EPSILON);
        assert!((aapl.weight - 100.0).abs() < EPSILON);
    }

    #[test]
    fn test_sell_never_changes_average_price() {
        let transactions = vec![buy("AAPL", 10.0, 100.0), sell("AAPL", 5.0, 180.0)];
        let holdings = compute_holdings(&transactions, &prices(&[("AAPL", 180.0)]));
        assert_eq!(holdings[0].quantity, 5.0);
        assert_eq!(holdings[0].average_price, 100.0);
    }

    #[test]
    fn test_quantity_is_signed_sum_and_closed_positions_disappear() {
        let transactions = vec![
            buy("AAPL", 10.0, 100.0),
            sell("AAPL", 10.0, 120.0),
            buy("MSFT", 4.0, 300.0),
            sell("MSFT", 6.0, 310.0), // oversold, must not appear either
            buy("NVDA", 2.0, 500.0),
        ];
        let holdings = compute_holdings(&transactions, &HashMap::new());
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].ticker, "NVDA");
        assert_eq!(holdings[0].quantity, 2.0);
    }

    #[test]
    fn test_weights_sum_to_one_hundred() {
        let transactions = vec![
            buy("AAPL", 10.0, 100.0),
            buy("MSFT", 5.0, 300.0),
            buy("NVDA", 2.0, 500.0),
        ];
        let holdings = compute_holdings(
            &transactions,
            &prices(&[("AAPL", 150.0), ("MSFT", 320.0), ("NVDA", 700.0)]),
        );
        let weight_sum: f64 = holdings.iter().map(|h| h.weight).sum();
        assert!((weight_sum - 100.0).abs() < EPSILON);
    }

    #[test]
    fn test_empty_transactions_yield_empty_outputs() {
        let holdings = compute_holdings(&[], &HashMap::new());
        assert!(holdings.is_empty());
        assert!(compute_broker_distribution(&[], &HashMap::new()).is_empty());
        assert_eq!(compute_summary(&holdings), PortfolioSummary::default());
    }

    #[test]
    fn test_missing_price_falls_back_to_average_cost() {
        let transactions = vec![buy("AAPL", 10.0, 100.0)];
        let holdings = compute_holdings(&transactions, &HashMap::new());
        assert_eq!(holdings[0].current_value, 1000.0);
        assert_eq!(holdings[0].gain_loss, 0.0);
        assert_eq!(holdings[0].gain_loss_percent, 0.0);
    }

    #[test]
    fn test_holdings_sorted_by_value_descending() {
        let transactions = vec![buy("AAPL", 1.0, 10.0), buy("MSFT", 1.0, 400.0)];
        let holdings = compute_holdings(&transactions, &HashMap::new());
        assert_eq!(holdings[0].ticker, "MSFT");
        assert_eq!(holdings[1].ticker, "AAPL");
    }

    #[test]
    fn test_summary_with_zero_investment_reports_zero_percent() {
        let holding = Holding {
            ticker: "FREE".to_string(),
            quantity: 10.0,
            average_price: 0.0,
            current_value: 500.0,
            gain_loss: 500.0,
            gain_loss_percent: 0.0,
            weight: 100.0,
        };
        let summary = compute_summary(&[holding]);
        assert_eq!(summary.total_investment, 0.0);
        assert_eq!(summary.gain_loss_percent, 0.0);
        assert!(summary.gain_loss_percent.is_finite());
    }

    #[test]
    fn test_summary_totals() {
        let transactions = vec![buy("AAPL", 10.0, 100.0), buy("MSFT", 5.0, 300.0)];
        let summary = compute_summary(&compute_holdings(
            &transactions,
            &prices(&[("AAPL", 150.0), ("MSFT", 280.0)]),
        ));
        assert!((summary.total_value - (1500.0 + 1400.0)).abs() < EPSILON);
        assert!((summary.total_investment - 2500.0).abs() < EPSILON);
        assert!((summary.total_gain_loss - 400.0).abs() < EPSILON);
        assert!((summary.gain_loss_percent - 16.0).abs() < EPSILON);
    }

    #[test]
    fn test_broker_distribution_splits_shared_ticker_by_net_quantity() {
        let transactions = vec![
            tx("AAPL", "Schwab", 10.0, 100.0, TransactionType::Buy),
            tx("AAPL", "Fidelity", 5.0, 120.0, TransactionType::Buy),
            tx("AAPL", "Schwab", 3.0, 150.0, TransactionType::Sell),
        ];
        let slices = compute_broker_distribution(&transactions, &prices(&[("AAPL", 150.0)]));

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].broker, "Schwab");
        assert!((slices[0].value - 7.0 * 150.0).abs() < EPSILON);
        assert_eq!(slices[1].broker, "Fidelity");
        assert!((slices[1].value - 5.0 * 150.0).abs() < EPSILON);

        // distribution total equals holdings total
        let total: f64 = slices.iter().map(|s| s.value).sum();
        assert!((total - 12.0 * 150.0).abs() < EPSILON);

        let weight_sum: f64 = slices.iter().map(|s| s.weight).sum();
        assert!((weight_sum - 100.0).abs() < EPSILON);
    }

    #[test]
    fn test_broker_distribution_drops_flat_brokers_and_closed_tickers() {
        let transactions = vec![
            // Schwab round-trips AAPL, holds nothing
            tx("AAPL", "Schwab", 10.0, 100.0, TransactionType::Buy),
            tx("AAPL", "Schwab", 10.0, 150.0, TransactionType::Sell),
            // MSFT is fully closed portfolio-wide
            tx("MSFT", "Fidelity", 5.0, 300.0, TransactionType::Buy),
            tx("MSFT", "Fidelity", 5.0, 310.0, TransactionType::Sell),
            // only live position
            tx("NVDA", "Fidelity", 2.0, 500.0, TransactionType::Buy),
        ];
        let slices = compute_broker_distribution(&transactions, &prices(&[("NVDA", 600.0)]));

        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].broker, "Fidelity");
        assert!((slices[0].value - 1200.0).abs() < EPSILON);
        assert!((slices[0].weight - 100.0).abs() < EPSILON);
    }
}
