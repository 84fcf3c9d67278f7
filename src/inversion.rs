//! Flips the quotation direction of fetched rates.
//!
//! The provider quotes foreign units per one TRY; clients read TRY per one
//! foreign unit. Each cycle inverts exactly once, starting from the freshly
//! fetched quote.

use chrono::{DateTime, Utc};
use log::warn;

use crate::error::{DivisionFault, StoreError};
use crate::exchange_rate::{Currency, Rates};
use crate::store::RateStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Inversion {
    /// Reciprocals, with skipped currencies left at their source value.
    pub rates: Rates,
    pub inverted: Vec<Currency>,
    pub skipped: Vec<DivisionFault>,
}

pub fn invert(source: &Rates) -> Inversion {
    let mut rates = *source;
    let mut inverted = Vec::with_capacity(Currency::ALL.len());
    let mut skipped = Vec::new();

    for (currency, value) in source.iter() {
        if value == 0.0 {
            skipped.push(DivisionFault(currency));
            continue;
        }
        rates.set(currency, 1.0 / value);
        inverted.push(currency);
    }

    Inversion {
        rates,
        inverted,
        skipped,
    }
}

/// Inverts `source` and writes each inverted field on its own.
///
/// Not atomic across fields; a failed write leaves earlier fields updated.
pub async fn invert_and_persist(
    store: &dyn RateStore,
    source: &Rates,
    at: DateTime<Utc>,
) -> Result<Inversion, StoreError> {
    let inversion = invert(source);

    for fault in &inversion.skipped {
        warn!("{}; keeping the provider value", fault);
    }

    for &currency in &inversion.inverted {
        store
            .set_rate(currency, inversion.rates.get(currency), at)
            .await?;
    }

    Ok(inversion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange_rate::UpstreamQuote;
    use crate::store::memory::MemoryStore;

    fn sample() -> Rates {
        Rates {
            eur: 0.0286,
            gbp: 0.0245,
            jpy: 4.6819990076,
            krw: 41.676175464,
            pln: 0.1234590689,
            rub: 2.8670008947,
            usd: 0.0309610521,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        ((a - b) / b).abs() < 1e-12
    }

    #[test]
    fn test_invert_takes_reciprocals() {
        let inversion = invert(&sample());
        assert!(inversion.skipped.is_empty());
        assert_eq!(inversion.inverted.len(), 7);
        assert!(close(inversion.rates.eur, 1.0 / 0.0286));
        assert!(close(inversion.rates.usd, 1.0 / 0.0309610521));
    }

    #[test]
    fn test_double_inversion_round_trips() {
        let source = sample();
        let twice = invert(&invert(&source).rates).rates;
        for (currency, value) in source.iter() {
            assert!(close(twice.get(currency), value), "{} drifted", currency);
        }
    }

    #[test]
    fn test_zero_rate_is_skipped() {
        let mut source = sample();
        source.set(Currency::Rub, 0.0);

        let inversion = invert(&source);

        assert_eq!(inversion.skipped, vec![DivisionFault(Currency::Rub)]);
        assert_eq!(inversion.rates.rub, 0.0);
        assert!(close(inversion.rates.gbp, 1.0 / 0.0245));
        assert!(!inversion.inverted.contains(&Currency::Rub));
    }

    #[tokio::test]
    async fn test_persist_skips_zero_field_only() {
        let store = MemoryStore::new();
        let mut source = sample();
        source.set(Currency::Jpy, 0.0);
        let quote = UpstreamQuote {
            base: "TRY".to_string(),
            rates: source,
        };
        store.upsert_quote(&quote, Utc::now()).await.unwrap();

        invert_and_persist(&store, &source, Utc::now()).await.unwrap();

        let stored = store.current().await.unwrap().unwrap().rates;
        assert_eq!(stored.jpy, 0.0);
        assert!(close(stored.eur, 1.0 / 0.0286));
        assert!(close(stored.krw, 1.0 / 41.676175464));
    }

    #[tokio::test]
    async fn test_persist_stamps_caller_clock() {
        let store = MemoryStore::new();
        let written = Utc::now() - chrono::Duration::minutes(3);
        let quote = UpstreamQuote {
            base: "TRY".to_string(),
            rates: sample(),
        };
        store.upsert_quote(&quote, written).await.unwrap();

        let inverted = written + chrono::Duration::seconds(1);
        invert_and_persist(&store, &quote.rates, inverted)
            .await
            .unwrap();

        let stored = store.current().await.unwrap().unwrap();
        assert_eq!(stored.created_at, written);
        assert_eq!(stored.updated_at, inverted);
    }
}
