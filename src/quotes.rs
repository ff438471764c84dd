//! Quote and exchange-rate lookup through the Yahoo Finance API, with a
//! small in-process cache so the aggregation paths can hammer it freely.

use crate::error::QuoteError;
use crate::transaction::Currency;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use yahoo_finance_api as yahoo;

/// Quotes go stale after a minute, FX rates after an hour.
pub const QUOTE_TTL: Duration = Duration::from_secs(60);
pub const FX_TTL: Duration = Duration::from_secs(60 * 60);

/// Bound on cached symbols; the oldest entry is evicted beyond this.
pub const CACHE_CAPACITY: usize = 100;

struct CacheEntry {
    price: f64,
    fetched_at: Instant,
    ttl: Duration,
    sequence: u64,
}

/// TTL cache over symbol prices, bounded by oldest-entry eviction.
pub struct QuoteCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    next_sequence: u64,
}

impl QuoteCache {
    pub fn new(capacity: usize) -> QuoteCache {
        QuoteCache {
            entries: HashMap::new(),
            capacity,
            next_sequence: 0,
        }
    }

    pub fn get(&mut self, symbol: &str) -> Option<f64> {
        match self.entries.get(symbol) {
            Some(entry) if entry.fetched_at.elapsed() < entry.ttl => Some(entry.price),
            Some(_) => {
                self.entries.remove(symbol);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, symbol: &str, price: f64, ttl: Duration) {
        if !self.entries.contains_key(symbol) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            symbol.to_string(),
            CacheEntry {
                price,
                fetched_at: Instant::now(),
                ttl,
                sequence,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Client for current prices and exchange rates.
///
/// Fetch failures are classified but never fatal: batch lookups skip the
/// failed symbol and the engine values it at average cost instead.
pub struct QuoteClient {
    cache: Mutex<QuoteCache>,
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteClient {
    pub fn new() -> QuoteClient {
        QuoteClient {
            cache: Mutex::new(QuoteCache::new(CACHE_CAPACITY)),
        }
    }

    /// Latest close for a ticker, from cache when fresh.
    pub async fn latest_price(&self, ticker: &str) -> Result<f64, QuoteError> {
        if let Some(price) = self.cache.lock().expect("quote cache poisoned").get(ticker) {
            return Ok(price);
        }
        let price = fetch_close(ticker).await?;
        self.cache
            .lock()
            .expect("quote cache poisoned")
            .insert(ticker, price, QUOTE_TTL);
        Ok(price)
    }

    /// Exchange rate between two currencies via Yahoo's synthetic
    /// `{FROM}{TO}=X` symbols.
    pub async fn exchange_rate(&self, from: Currency, to: Currency) -> Result<f64, QuoteError> {
        if from == to {
            return Ok(1.0);
        }
        let symbol = format!("{from}{to}=X");
        if let Some(rate) = self.cache.lock().expect("quote cache poisoned").get(&symbol) {
            return Ok(rate);
        }
        let rate = fetch_close(&symbol).await?;
        self.cache
            .lock()
            .expect("quote cache poisoned")
            .insert(&symbol, rate, FX_TTL);
        Ok(rate)
    }

    /// Fetches every ticker concurrently, one task per symbol. A symbol's
    /// failure never aborts the others; failures come back alongside the
    /// prices that did resolve.
    pub async fn price_map(&self, tickers: &[String]) -> (HashMap<String, f64>, Vec<QuoteError>) {
        let mut prices = HashMap::new();
        let mut misses = Vec::new();
        {
            let mut cache = self.cache.lock().expect("quote cache poisoned");
            let unique: HashSet<&String> = tickers.iter().collect();
            for ticker in unique {
                match cache.get(ticker) {
                    Some(price) => {
                        prices.insert(ticker.clone(), price);
                    }
                    None => misses.push(ticker.clone()),
                }
            }
        }

        // move tasks into the async closure passed to tokio::spawn()
        let tasks: Vec<_> = misses
            .into_iter()
            .map(|ticker| {
                tokio::spawn(async move {
                    let result = fetch_close(&ticker).await;
                    (ticker, result)
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok((ticker, Ok(price))) => {
                    self.cache
                        .lock()
                        .expect("quote cache poisoned")
                        .insert(&ticker, price, QUOTE_TTL);
                    prices.insert(ticker, price);
                }
                Ok((_, Err(e))) => errors.push(e),
                Err(e) => eprintln!("Error joining quote task: {e:?}"),
            }
        }

        (prices, errors)
    }
}

/// Latest close for one symbol straight from the API.
async fn fetch_close(symbol: &str) -> Result<f64, QuoteError> {
    let connector =
        yahoo::YahooConnector::new().map_err(|e| classify_failure(symbol, &e.to_string()))?;
    let response = connector
        .get_latest_quotes(symbol, "1d")
        .await
        .map_err(|e| classify_failure(symbol, &e.to_string()))?;
    let quote = response
        .last_quote()
        .map_err(|_| QuoteError::Unavailable(symbol.to_string()))?;
    if !quote.close.is_finite() || quote.close <= 0.0 {
        return Err(QuoteError::MalformedResponse {
            symbol: symbol.to_string(),
            reason: format!("non-positive close {}", quote.close),
        });
    }
    Ok(quote.close)
}

/// Sorts an API failure into our error kinds by its message text; the
/// underlying error type does not carry the HTTP status separately.
fn classify_failure(symbol: &str, text: &str) -> QuoteError {
    let lowered = text.to_lowercase();
    if lowered.contains("429") || lowered.contains("too many requests") {
        QuoteError::RateLimited(symbol.to_string())
    } else if lowered.contains("deserialize") || lowered.contains("json") {
        QuoteError::MalformedResponse {
            symbol: symbol.to_string(),
            reason: text.to_string(),
        }
    } else if lowered.contains("no quote") || lowered.contains("empty") {
        QuoteError::Unavailable(symbol.to_string())
    } else {
        QuoteError::NetworkFailure {
            symbol: symbol.to_string(),
            reason: text.to_string(),
        }
    }
}
