//! Currency conversion with a time-bounded rate cache
//!
//! One `CurrencyConverter` instance per process. Rates are fetched from an
//! exchange-rate endpoint at most once per refresh interval; refresh
//! failures fall back to a static table of approximate rates, and a
//! currency in neither table converts at rate 1 with a warning rather than
//! failing the transaction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// The currency all stored amounts are normalized to
pub const BASE_CURRENCY: &str = "INR";

/// How long a fetched rate table stays fresh
const REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Default rate source: rates relative to the base currency
const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/INR";

/// Approximate rates-to-base used when the live source is unavailable
///
/// Values are "1 foreign unit = X INR".
const FALLBACK_RATES: &[(&str, f64)] = &[
    ("USD", 83.0),
    ("EUR", 90.0),
    ("GBP", 105.0),
    ("AED", 22.6),
    ("SGD", 62.0),
    ("AUD", 55.0),
    ("CAD", 61.0),
    ("CHF", 94.0),
    ("JPY", 0.55),
    ("SAR", 22.1),
];

/// Time source for cache freshness decisions
///
/// Injectable so tests can move time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation used in production
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Result of converting an amount to the base currency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    /// Amount in base currency, rounded to 2 decimals
    pub converted_amount: f64,
    /// The rate-to-base that was applied
    pub rate_used: f64,
    /// True when the rate came from the fallback table or the rate-1 path
    pub estimated: bool,
}

struct RateCache {
    /// currency code -> rate-to-base ("1 foreign = X INR")
    rates: HashMap<String, f64>,
    fetched_at: Option<Instant>,
}

/// Shape of the rate source response
///
/// Rates are expressed as "1 base unit = X foreign" and must be inverted
/// before caching.
#[derive(Debug, Deserialize)]
struct RateResponse {
    rates: HashMap<String, f64>,
}

/// Converts foreign-currency amounts to the base currency
pub struct CurrencyConverter {
    http_client: Client,
    source_url: String,
    cache: Arc<RwLock<RateCache>>,
    refresh_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Clone for CurrencyConverter {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            source_url: self.source_url.clone(),
            cache: self.cache.clone(),
            refresh_interval: self.refresh_interval,
            clock: self.clock.clone(),
        }
    }
}

impl CurrencyConverter {
    /// Create a converter against the given rate source
    pub fn new(source_url: &str) -> Self {
        Self::with_clock(source_url, Arc::new(SystemClock))
    }

    /// Create a converter with an injected clock (for tests)
    pub fn with_clock(source_url: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            http_client: Client::new(),
            source_url: source_url.trim_end_matches('/').to_string(),
            cache: Arc::new(RwLock::new(RateCache {
                rates: HashMap::new(),
                fetched_at: None,
            })),
            refresh_interval: REFRESH_INTERVAL,
            clock,
        }
    }

    /// Create from environment variables
    ///
    /// `RATES_URL` overrides the default rate source.
    pub fn from_env() -> Self {
        let url = std::env::var("RATES_URL").unwrap_or_else(|_| DEFAULT_RATES_URL.to_string());
        Self::new(&url)
    }

    /// Convert a positive amount in `currency` to the base currency
    ///
    /// Base-currency input is the identity conversion (rate exactly 1).
    /// Never fails: rate-source problems degrade to fallback or rate-1
    /// estimates, flagged on the returned `Conversion`.
    pub async fn convert_to_base(&self, amount: f64, currency: &str) -> Conversion {
        let code = currency.trim().to_uppercase();
        if code == BASE_CURRENCY {
            return Conversion {
                converted_amount: round2(amount),
                rate_used: 1.0,
                estimated: false,
            };
        }

        let (rate, estimated) = self.rate_to_base(&code).await;
        Conversion {
            converted_amount: round2(amount * rate),
            rate_used: rate,
            estimated,
        }
    }

    /// Look up the rate-to-base for a currency, refreshing the cache if stale
    ///
    /// The fetch happens with no lock held, so a refresh in progress never
    /// blocks readers; a slightly stale value is preferable to serializing
    /// callers on one refresh.
    async fn rate_to_base(&self, code: &str) -> (f64, bool) {
        let (cached, fresh) = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            let fresh = cache
                .fetched_at
                .map(|at| self.clock.now().duration_since(at) < self.refresh_interval)
                .unwrap_or(false);
            (cache.rates.get(code).copied(), fresh)
        };

        if fresh {
            if let Some(rate) = cached {
                return (rate, false);
            }
        } else {
            match self.fetch_rates().await {
                Ok(rates) => {
                    let rate = rates.get(code).copied();
                    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
                    cache.rates = rates;
                    cache.fetched_at = Some(self.clock.now());
                    if let Some(rate) = rate {
                        return (rate, false);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Rate refresh failed, serving cached/fallback rates");
                    // Serve the stale cached value if there is one
                    if let Some(rate) = cached {
                        return (rate, false);
                    }
                }
            }
        }

        if let Some((_, rate)) = FALLBACK_RATES.iter().find(|(c, _)| *c == code) {
            warn!(currency = code, rate, "Using fallback exchange rate");
            return (*rate, true);
        }

        warn!(currency = code, "No exchange rate available, converting at rate 1");
        (1.0, true)
    }

    /// Fetch the live rate table and invert it to rates-to-base
    async fn fetch_rates(&self) -> crate::error::Result<HashMap<String, f64>> {
        let response = self
            .http_client
            .get(&self.source_url)
            .send()
            .await?
            .error_for_status()?;

        let parsed: RateResponse = response.json().await?;
        let inverted = invert_rates(&parsed.rates);
        debug!(count = inverted.len(), "Refreshed exchange rates");
        Ok(inverted)
    }
}

/// Invert a "1 base = X foreign" table into "1 foreign = 1/X base"
///
/// The source expresses rates relative to the base currency in one
/// direction; the cache stores the other. Getting this backwards would
/// silently produce amounts wrong by a squared factor, so it is a
/// dedicated step with its own tests. Non-positive rates are dropped.
pub fn invert_rates(raw: &HashMap<String, f64>) -> HashMap<String, f64> {
    raw.iter()
        .filter(|(_, x)| **x > 0.0)
        .map(|(code, x)| (code.to_uppercase(), 1.0 / x))
        .collect()
}

/// Round to 2 decimal places, standard rounding
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A rate source that can never be reached
    const DEAD_URL: &str = "http://127.0.0.1:9/rates";

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, d: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn prime(converter: &CurrencyConverter, code: &str, rate: f64) {
        let mut cache = converter.cache.write().unwrap();
        cache.rates.insert(code.to_string(), rate);
        cache.fetched_at = Some(converter.clock.now());
    }

    #[tokio::test]
    async fn test_base_currency_is_identity() {
        let converter = CurrencyConverter::new(DEAD_URL);
        let result = converter.convert_to_base(1234.56, "INR").await;
        assert_eq!(result.converted_amount, 1234.56);
        assert_eq!(result.rate_used, 1.0);
        assert!(!result.estimated);

        // Case/whitespace insensitive
        let result = converter.convert_to_base(10.0, " inr ").await;
        assert_eq!(result.rate_used, 1.0);
    }

    #[test]
    fn test_invert_rates() {
        let mut raw = HashMap::new();
        raw.insert("USD".to_string(), 0.0125); // 1 INR = 0.0125 USD
        raw.insert("JPY".to_string(), 1.8);
        raw.insert("BAD".to_string(), 0.0);

        let inverted = invert_rates(&raw);
        assert!((inverted["USD"] - 80.0).abs() < 1e-9); // 1 USD = 80 INR
        assert!((inverted["JPY"] - 0.5555555).abs() < 1e-5);
        assert!(!inverted.contains_key("BAD"));
    }

    #[tokio::test]
    async fn test_cached_rate_served_without_fetch() {
        // The dead source would error if contacted; a fresh cache hit
        // must not touch it
        let converter = CurrencyConverter::new(DEAD_URL);
        prime(&converter, "USD", 80.0);

        let result = converter.convert_to_base(12.5, "USD").await;
        assert_eq!(result.converted_amount, 1000.0);
        assert_eq!(result.rate_used, 80.0);
        assert!(!result.estimated);
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_refresh_fails() {
        let clock = Arc::new(ManualClock::new());
        let converter = CurrencyConverter::with_clock(DEAD_URL, clock.clone());
        prime(&converter, "USD", 80.0);

        clock.advance(Duration::from_secs(7200));

        // Refresh against the dead source fails; the stale value wins
        // over the fallback table
        let result = converter.convert_to_base(2.0, "USD").await;
        assert_eq!(result.converted_amount, 160.0);
        assert!(!result.estimated);
    }

    #[tokio::test]
    async fn test_fallback_rate_when_source_unavailable() {
        let converter = CurrencyConverter::new(DEAD_URL);
        let result = converter.convert_to_base(10.0, "USD").await;
        assert_eq!(result.rate_used, 83.0);
        assert_eq!(result.converted_amount, 830.0);
        assert!(result.estimated);
    }

    #[tokio::test]
    async fn test_unknown_currency_converts_at_rate_one() {
        let converter = CurrencyConverter::new(DEAD_URL);
        let result = converter.convert_to_base(55.5, "XYZ").await;
        assert_eq!(result.rate_used, 1.0);
        assert_eq!(result.converted_amount, 55.5);
        assert!(result.estimated);
    }

    #[tokio::test]
    async fn test_result_rounds_to_two_decimals() {
        let converter = CurrencyConverter::new(DEAD_URL);
        prime(&converter, "USD", 83.333);

        let result = converter.convert_to_base(1.0, "USD").await;
        assert_eq!(result.converted_amount, 83.33);
    }
}
