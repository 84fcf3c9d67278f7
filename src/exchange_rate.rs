use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key of the one snapshot row every read and write targets.
pub const SNAPSHOT_KEY: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Eur,
    Gbp,
    Jpy,
    Krw,
    Pln,
    Rub,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Krw,
        Currency::Pln,
        Currency::Rub,
        Currency::Usd,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Krw => "KRW",
            Currency::Pln => "PLN",
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
        }
    }

    /// Column holding this currency in `rate_snapshots`.
    pub fn column(self) -> &'static str {
        match self {
            Currency::Eur => "eur",
            Currency::Gbp => "gbp",
            Currency::Jpy => "jpy",
            Currency::Krw => "krw",
            Currency::Pln => "pln",
            Currency::Rub => "rub",
            Currency::Usd => "usd",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One rate per supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rates {
    pub eur: f64,
    pub gbp: f64,
    pub jpy: f64,
    pub krw: f64,
    pub pln: f64,
    pub rub: f64,
    pub usd: f64,
}

impl Rates {
    pub fn get(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Eur => self.eur,
            Currency::Gbp => self.gbp,
            Currency::Jpy => self.jpy,
            Currency::Krw => self.krw,
            Currency::Pln => self.pln,
            Currency::Rub => self.rub,
            Currency::Usd => self.usd,
        }
    }

    pub fn set(&mut self, currency: Currency, value: f64) {
        let slot = match currency {
            Currency::Eur => &mut self.eur,
            Currency::Gbp => &mut self.gbp,
            Currency::Jpy => &mut self.jpy,
            Currency::Krw => &mut self.krw,
            Currency::Pln => &mut self.pln,
            Currency::Rub => &mut self.rub,
            Currency::Usd => &mut self.usd,
        };
        *slot = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, f64)> + '_ {
        Currency::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// The persisted "current rates" record.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RateSnapshot {
    pub id: String,
    #[sqlx(flatten)]
    pub rates: Rates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Rates as parsed from one provider response, quoted against `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamQuote {
    pub base: String,
    pub rates: Rates,
}

impl UpstreamQuote {
    /// Picks the supported codes out of a provider `data` map.
    ///
    /// Returns the first missing code when the map is incomplete.
    pub fn from_map(base: &str, data: &HashMap<String, f64>) -> Result<Self, Currency> {
        let mut rates = Rates::default();
        for currency in Currency::ALL {
            let value = data.get(currency.code()).copied().ok_or(currency)?;
            rates.set(currency, value);
        }

        Ok(Self {
            base: base.to_string(),
            rates,
        })
    }
}

/// Wire shape of a snapshot, shared by `/currency` and the stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatesView {
    pub usd: f64,
    pub eur: f64,
    pub gbp: f64,
    pub pln: f64,
    pub rub: f64,
    pub jpy: f64,
    pub krw: f64,
}

impl From<&Rates> for RatesView {
    fn from(rates: &Rates) -> Self {
        Self {
            usd: rates.usd,
            eur: rates.eur,
            gbp: rates.gbp,
            pln: rates.pln,
            rub: rates.rub,
            jpy: rates.jpy,
            krw: rates.krw,
        }
    }
}

impl From<&RateSnapshot> for RatesView {
    fn from(snapshot: &RateSnapshot) -> Self {
        Self::from(&snapshot.rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_map() -> HashMap<String, f64> {
        [
            ("EUR", 0.0286),
            ("GBP", 0.0245),
            ("JPY", 4.68),
            ("KRW", 41.67),
            ("PLN", 0.1234),
            ("RUB", 2.867),
            ("USD", 0.0309),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_quote_from_complete_map() {
        let quote = UpstreamQuote::from_map("TRY", &full_map()).unwrap();
        assert_eq!(quote.base, "TRY");
        assert_eq!(quote.rates.eur, 0.0286);
        assert_eq!(quote.rates.krw, 41.67);
    }

    #[test]
    fn test_quote_reports_missing_code() {
        let mut data = full_map();
        data.remove("PLN");
        assert_eq!(UpstreamQuote::from_map("TRY", &data), Err(Currency::Pln));
    }

    #[test]
    fn test_extra_codes_are_ignored() {
        let mut data = full_map();
        data.insert("CHF".to_string(), 0.027);
        assert!(UpstreamQuote::from_map("TRY", &data).is_ok());
    }

    #[test]
    fn test_view_uses_lowercase_keys() {
        let mut rates = Rates::default();
        rates.set(Currency::Usd, 32.5);
        let json = serde_json::to_value(RatesView::from(&rates)).unwrap();
        assert_eq!(json["usd"], 32.5);
        assert_eq!(json.as_object().unwrap().len(), 7);
    }
}
