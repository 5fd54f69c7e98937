//! Conversion quote generation

pub mod engine;

pub use engine::{quote_id, ConversionQuote, ExchangeRate, QuoteEngine, QuoteRequest, RateSource};
