use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::FetchError;
use crate::exchange_rate::{Currency, UpstreamQuote};

/// Source of fresh quotes.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    /// One provider round trip. No retries.
    async fn fetch(&self) -> Result<UpstreamQuote, FetchError>;
}

/// Success shape: `{"data": {"EUR": 0.0286, ...}}`.
#[derive(Debug, Default, Deserialize)]
struct CurrencyResponse {
    #[serde(default)]
    data: Option<HashMap<String, f64>>,
}

/// Error shape: `{"error_code": 1, "error_message": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct CurrencyError {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: String,
}

/// Client for freecurrencyapi.com's `latest` endpoint.
pub struct FreeCurrencyApi {
    client: Client,
    url: Url,
    base: String,
}

impl FreeCurrencyApi {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        base: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let currencies = Currency::ALL
            .iter()
            .map(|c| c.code())
            .collect::<Vec<_>>()
            .join(",");
        let url = Url::parse_with_params(
            endpoint,
            &[
                ("apikey", api_key),
                ("currencies", currencies.as_str()),
                ("base_currency", base),
            ],
        )
        .map_err(|e| FetchError::Decode(format!("invalid provider url: {}", e)))?;

        let client = Client::builder()
            .user_agent(concat!("tryrates/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            base: base.to_string(),
        })
    }
}

#[async_trait]
impl RateSource for FreeCurrencyApi {
    fn name(&self) -> &str {
        "freecurrencyapi"
    }

    async fn fetch(&self) -> Result<UpstreamQuote, FetchError> {
        let resp = self.client.get(self.url.clone()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!("{} answered {} ({} bytes)", self.name(), status, body.len());

        match parse_response(&self.base, &body) {
            Err(FetchError::Decode(_)) if !status.is_success() => Err(FetchError::Provider {
                code: i64::from(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            }),
            result => result,
        }
    }
}

/// Parses a provider body against both shapes.
///
/// Both parses run on every body; a non-zero `error_code` wins over any data.
pub fn parse_response(base: &str, body: &str) -> Result<UpstreamQuote, FetchError> {
    let response: CurrencyResponse = serde_json::from_str(body)?;
    let error: CurrencyError = serde_json::from_str(body)?;

    if error.error_code != 0 {
        return Err(FetchError::Provider {
            code: error.error_code,
            message: error.error_message,
        });
    }

    let data = response
        .data
        .ok_or_else(|| FetchError::Decode("response has no data field".to_string()))?;

    UpstreamQuote::from_map(base, &data)
        .map_err(|missing| FetchError::Decode(format!("response lacks a rate for {}", missing)))
}


#[cfg(test)]
mod tests {
    use super::scripted::SAMPLE;
    use super::*;

    #[test]
    fn test_parse_success_shape() {
        let quote = parse_response("TRY", SAMPLE).unwrap();
        assert_eq!(quote.base, "TRY");
        assert_eq!(quote.rates.eur, 0.0286);
        assert_eq!(quote.rates.usd, 0.0309610521);
    }

    #[test]
    fn test_parse_error_shape() {
        let err = parse_response("TRY", r#"{"error_code":1,"error_message":"quota exceeded"}"#)
            .unwrap_err();
        match err {
            FetchError::Provider { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_code_wins_over_data() {
        let body = r#"{"data":{"EUR":1.0},"error_code":429,"error_message":"slow down"}"#;
        assert!(matches!(
            parse_response("TRY", body),
            Err(FetchError::Provider { code: 429, .. })
        ));
    }

    #[test]
    fn test_zero_error_code_is_success() {
        let body = SAMPLE.replacen('{', r#"{"error_code":0,"#, 1);
        assert!(parse_response("TRY", &body).is_ok());
    }

    #[test]
    fn test_garbage_is_decode_fault() {
        assert!(matches!(
            parse_response("TRY", "<html>bad gateway</html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_currency_is_decode_fault() {
        let err = parse_response("TRY", r#"{"data":{"EUR":0.0286}}"#).unwrap_err();
        assert!(err.to_string().contains("GBP"), "{}", err);
    }

    #[test]
    fn test_request_url_carries_codes_and_base() {
        let api = FreeCurrencyApi::new(
            "https://api.freecurrencyapi.com/v1/latest",
            "secret",
            "TRY",
            Duration::from_secs(5),
        )
        .unwrap();
        let query: HashMap<_, _> = api.url.query_pairs().into_owned().collect();
        assert_eq!(query["apikey"], "secret");
        assert_eq!(query["base_currency"], "TRY");
        assert_eq!(query["currencies"], "EUR,GBP,JPY,KRW,PLN,RUB,USD");
    }
}
