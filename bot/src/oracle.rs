//! Price oracle adapter: ordered quote sources with per-source timeout
//! and failover.
//!
//! A timed-out or failed source is a soft failure that advances to the
//! next source. A quote is accepted only if it parses to a finite,
//! strictly positive number. When every source fails the request fails
//! with `PriceUnavailable` unless the deployment opted into a cached or
//! constant fallback; outside the cache policy no quote is ever reused
//! across settlement batches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task;
use tokio::time::timeout;

use crate::errors::BotError;

/// Per-source fetch budget.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(8);

/// Cache lifetime for the cached-fallback policy.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// One USD quote source. Implementations may block; the adapter runs
/// them on the blocking pool under a timeout.
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch_usd_price(&self) -> anyhow::Result<f64>;
}

/// Fixed-price source. Serves tests and the constant-price deployment
/// variant; real HTTP sources plug in behind the same trait.
pub struct StaticQuote {
    name: String,
    price: f64,
}

impl StaticQuote {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        StaticQuote {
            name: name.into(),
            price,
        }
    }
}

impl QuoteSource for StaticQuote {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_usd_price(&self) -> anyhow::Result<f64> {
        Ok(self.price)
    }
}

/// What to do when every source fails. A configurable policy choice,
/// not the rule: the default is to fail the request.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Fallback {
    None,
    CachedLast {
        #[serde(default = "default_cache_ttl_secs")]
        ttl_secs: u64,
    },
    Constant {
        price: f64,
    },
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

struct CachedQuote {
    price: f64,
    fetched_at: DateTime<Utc>,
}

pub struct PriceOracle {
    sources: Vec<Arc<dyn QuoteSource>>,
    per_source_timeout: Duration,
    fallback: Fallback,
    last_quote: Mutex<Option<CachedQuote>>,
}

impl PriceOracle {
    pub fn new(
        sources: Vec<Arc<dyn QuoteSource>>,
        per_source_timeout: Duration,
        fallback: Fallback,
    ) -> Self {
        PriceOracle {
            sources,
            per_source_timeout,
            fallback,
            last_quote: Mutex::new(None),
        }
    }

    /// Try each source in order and return the first usable quote.
    pub async fn fetch_price(&self) -> Result<f64, BotError> {
        for source in &self.sources {
            let name = source.name().to_string();
            let src = Arc::clone(source);
            let fetch = task::spawn_blocking(move || src.fetch_usd_price());

            match timeout(self.per_source_timeout, fetch).await {
                Err(_) => log::warn!("quote source {name} timed out"),
                Ok(Err(join_err)) => log::warn!("quote source {name} aborted: {join_err}"),
                Ok(Ok(Err(err))) => log::warn!("quote source {name} failed: {err:#}"),
                Ok(Ok(Ok(price))) if price.is_finite() && price > 0.0 => {
                    log::debug!("quote source {name} returned {price}");
                    *self.last_quote.lock().await = Some(CachedQuote {
                        price,
                        fetched_at: Utc::now(),
                    });
                    return Ok(price);
                }
                Ok(Ok(Ok(price))) => {
                    log::warn!("quote source {name} returned unusable price {price}")
                }
            }
        }
        self.fall_back().await
    }

    async fn fall_back(&self) -> Result<f64, BotError> {
        match self.fallback {
            Fallback::None => Err(BotError::PriceUnavailable),
            Fallback::Constant { price } => {
                log::warn!("all quote sources failed, using constant price {price}");
                Ok(price)
            }
            Fallback::CachedLast { ttl_secs } => {
                let cache = self.last_quote.lock().await;
                match cache.as_ref() {
                    Some(quote) => {
                        let age = Utc::now().signed_duration_since(quote.fetched_at);
                        if age.num_seconds() >= 0 && (age.num_seconds() as u64) <= ttl_secs {
                            log::warn!(
                                "all quote sources failed, using {}s-old cached price {}",
                                age.num_seconds(),
                                quote.price
                            );
                            Ok(quote.price)
                        } else {
                            Err(BotError::PriceUnavailable)
                        }
                    }
                    None => Err(BotError::PriceUnavailable),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingQuote;

    impl QuoteSource for FailingQuote {
        fn name(&self) -> &str {
            "failing"
        }

        fn fetch_usd_price(&self) -> anyhow::Result<f64> {
            anyhow::bail!("rate limited")
        }
    }

    struct BadNumberQuote(f64);

    impl QuoteSource for BadNumberQuote {
        fn name(&self) -> &str {
            "bad-number"
        }

        fn fetch_usd_price(&self) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    fn oracle(sources: Vec<Arc<dyn QuoteSource>>, fallback: Fallback) -> PriceOracle {
        PriceOracle::new(sources, Duration::from_secs(1), fallback)
    }

    #[tokio::test]
    async fn failover_advances_to_next_source() {
        let oracle = oracle(
            vec![
                Arc::new(FailingQuote),
                Arc::new(StaticQuote::new("backup", 2.5)),
            ],
            Fallback::None,
        );
        assert_eq!(oracle.fetch_price().await.expect("price"), 2.5);
    }

    #[tokio::test]
    async fn rejects_non_finite_and_non_positive_quotes() {
        for bad in [f64::NAN, f64::INFINITY, 0.0, -3.0] {
            let oracle = oracle(vec![Arc::new(BadNumberQuote(bad))], Fallback::None);
            assert!(matches!(
                oracle.fetch_price().await,
                Err(BotError::PriceUnavailable)
            ));
        }
    }

    #[tokio::test]
    async fn all_sources_failing_is_fatal_without_fallback() {
        let oracle = oracle(vec![Arc::new(FailingQuote)], Fallback::None);
        assert!(matches!(
            oracle.fetch_price().await,
            Err(BotError::PriceUnavailable)
        ));
    }

    #[tokio::test]
    async fn constant_fallback_applies_when_configured() {
        let oracle = oracle(
            vec![Arc::new(FailingQuote)],
            Fallback::Constant { price: 1.25 },
        );
        assert_eq!(oracle.fetch_price().await.expect("price"), 1.25);
    }

    #[tokio::test]
    async fn cached_fallback_serves_recent_quotes_only() {
        let oracle = PriceOracle::new(
            vec![Arc::new(StaticQuote::new("primary", 4.0))],
            Duration::from_secs(1),
            Fallback::CachedLast { ttl_secs: 300 },
        );
        // Prime the cache, then fail the live source.
        assert_eq!(oracle.fetch_price().await.expect("price"), 4.0);
        let failing = PriceOracle {
            sources: vec![Arc::new(FailingQuote)],
            per_source_timeout: Duration::from_secs(1),
            fallback: Fallback::CachedLast { ttl_secs: 300 },
            last_quote: Mutex::new(Some(CachedQuote {
                price: 4.0,
                fetched_at: Utc::now(),
            })),
        };
        assert_eq!(failing.fetch_price().await.expect("cached"), 4.0);

        let stale = PriceOracle {
            sources: vec![Arc::new(FailingQuote)],
            per_source_timeout: Duration::from_secs(1),
            fallback: Fallback::CachedLast { ttl_secs: 300 },
            last_quote: Mutex::new(Some(CachedQuote {
                price: 4.0,
                fetched_at: Utc::now() - chrono::Duration::seconds(301),
            })),
        };
        assert!(matches!(
            stale.fetch_price().await,
            Err(BotError::PriceUnavailable)
        ));
    }
}
