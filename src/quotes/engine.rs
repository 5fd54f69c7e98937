//! Fiat-to-crypto conversion quotes
//!
//! A quote's identifier is the SHA-256 of its canonicalized content, so
//! rebuilding a quote from identical inputs yields the same identifier.

use crate::error::{AppResult, ValidationError};
use crate::payments::money::Money;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const QUOTE_ID_PREFIX: &str = "quote_";
pub const DEFAULT_VALIDITY_SECS: i64 = 60;
/// Decimal places kept on computed crypto amounts
pub const CRYPTO_SCALE: u32 = 8;

const FIELD_DELIMITER: &str = "|";

fn asset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?i)[a-z0-9]{2,12}$").expect("valid asset pattern"))
}

/// Address formats vary per chain (checksummed hex, StrKey, memo or tag
/// suffixes), so only blank, whitespace-bearing and oversized values are refused
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\S{1,256}$").expect("valid address pattern"))
}

/// One attributed price contributing to a blended rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSource {
    pub source: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Crypto units per one major fiat unit
    pub rate: Decimal,
    pub source: String,
    /// Pricing strategy tag, e.g. "spot" or "median"
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<RateSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub fiat: Money,
    pub crypto_asset: String,
    pub destination_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub id: String,
    pub fiat: Money,
    pub crypto_asset: String,
    pub destination_address: String,
    pub rate: ExchangeRate,
    pub fee: Money,
    pub crypto_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl ConversionQuote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuoteEngine {
    validity: Duration,
}

impl Default for QuoteEngine {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDITY_SECS)
    }
}

impl QuoteEngine {
    /// Non-positive validity falls back to the default window
    pub fn new(validity_secs: i64) -> Self {
        let secs = if validity_secs > 0 {
            validity_secs
        } else {
            DEFAULT_VALIDITY_SECS
        };
        Self {
            validity: Duration::seconds(secs),
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Expiry counts from the later of the rate timestamp and now
    pub fn expiry(&self, rate_timestamp: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        rate_timestamp.max(now) + self.validity
    }

    /// Price a request: `(fiat - fee) / rate`, rounded to [`CRYPTO_SCALE`] places
    pub fn quote(&self, request: QuoteRequest, rate: ExchangeRate, fee: Money) -> AppResult<ConversionQuote> {
        if rate.rate <= Decimal::ZERO {
            return Err(ValidationError::InvalidRequest {
                message: format!("exchange rate must be positive, got {}", rate.rate),
            }
            .into());
        }
        let net = request.fiat.sub(&fee)?;
        if !net.is_positive() {
            return Err(ValidationError::InvalidRequest {
                message: format!("fee {} consumes the whole amount {}", fee, request.fiat),
            }
            .into());
        }
        let crypto_amount = net
            .to_major()
            .checked_div(rate.rate)
            .ok_or_else(|| ValidationError::AmountOverflow {
                currency: net.currency.to_string(),
            })?
            .round_dp(CRYPTO_SCALE);
        self.build(request, rate, fee, crypto_amount)
    }

    pub fn build(
        &self,
        request: QuoteRequest,
        rate: ExchangeRate,
        fee: Money,
        crypto_amount: Decimal,
    ) -> AppResult<ConversionQuote> {
        self.build_at(request, rate, fee, crypto_amount, Utc::now())
    }

    /// Assemble an immutable quote with its expiry and content-derived identifier
    pub fn build_at(
        &self,
        request: QuoteRequest,
        rate: ExchangeRate,
        fee: Money,
        crypto_amount: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<ConversionQuote> {
        if fee.currency != request.fiat.currency {
            return Err(ValidationError::CurrencyMismatch {
                left: request.fiat.currency.to_string(),
                right: fee.currency.to_string(),
            }
            .into());
        }

        // Stored as given; only the identifier folds case
        let crypto_asset = request.crypto_asset.trim().to_string();
        if !asset_pattern().is_match(&crypto_asset) {
            return Err(ValidationError::InvalidRequest {
                message: format!("invalid crypto asset: {}", request.crypto_asset),
            }
            .into());
        }
        let destination_address = request.destination_address.trim().to_string();
        if !address_pattern().is_match(&destination_address) {
            return Err(ValidationError::InvalidRequest {
                message: "invalid destination address".to_string(),
            }
            .into());
        }

        let expires_at = self.expiry(rate.timestamp, now);
        let mut quote = ConversionQuote {
            id: String::new(),
            fiat: request.fiat,
            crypto_asset,
            destination_address,
            rate,
            fee,
            crypto_amount,
            expires_at,
        };
        quote.id = quote_id(&quote);
        Ok(quote)
    }
}

/// Identifier derived from every semantically relevant field of `quote`
pub fn quote_id(quote: &ConversionQuote) -> String {
    format!(
        "{}{}",
        QUOTE_ID_PREFIX,
        hex::encode(Sha256::digest(canonicalize(quote).as_bytes()))
    )
}

fn canonicalize(quote: &ConversionQuote) -> String {
    let mut fields = vec![
        quote.fiat.currency.code().to_string(),
        quote.fiat.to_major().normalize().to_string(),
        quote.crypto_asset.to_lowercase(),
        quote.destination_address.to_lowercase(),
        quote.rate.rate.normalize().to_string(),
        format_timestamp(quote.rate.timestamp),
        quote.rate.source.clone(),
        quote.rate.strategy.clone(),
        quote.fee.to_major().normalize().to_string(),
        quote.crypto_amount.normalize().to_string(),
        format_timestamp(quote.expires_at),
    ];

    let mut sources: Vec<&RateSource> = quote.rate.sources.iter().collect();
    sources.sort_by(|a, b| {
        (&a.source, &a.base_asset, &a.quote_asset).cmp(&(&b.source, &b.base_asset, &b.quote_asset))
    });
    for source in sources {
        fields.extend([
            source.source.clone(),
            source.base_asset.clone(),
            source.quote_asset.clone(),
            source.price.normalize().to_string(),
            format_timestamp(source.timestamp),
            format_confidence(source.confidence),
        ]);
    }

    fields.join(FIELD_DELIMITER)
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Six fractional digits with trailing zeros and a dangling point removed
fn format_confidence(confidence: f64) -> String {
    let text = format!("{:.6}", confidence);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
