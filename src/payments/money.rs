//! Money amounts in minor currency units

use crate::error::{AppResult, ValidationError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies the core knows how to represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    CHF,
    NGN,
    JPY,
    KRW,
}

impl Currency {
    /// Number of minor units in one major unit (100 cents per dollar, 1 yen per yen)
    pub fn minor_unit_factor(&self) -> i64 {
        match self {
            Currency::JPY | Currency::KRW => 1,
            _ => 100,
        }
    }

    pub fn decimal_places(&self) -> u32 {
        match self.minor_unit_factor() {
            1 => 0,
            _ => 2,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::CHF => "CHF",
            Currency::NGN => "NGN",
            Currency::JPY => "JPY",
            Currency::KRW => "KRW",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "CAD" => Ok(Currency::CAD),
            "AUD" => Ok(Currency::AUD),
            "CHF" => Ok(Currency::CHF),
            "NGN" => Ok(Currency::NGN),
            "JPY" => Ok(Currency::JPY),
            "KRW" => Ok(Currency::KRW),
            other => Err(ValidationError::UnsupportedCurrency {
                currency: other.to_string(),
            }),
        }
    }
}

/// An integer amount of minor units tagged with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Build from a major-unit decimal, rejecting values finer than the minor unit
    pub fn from_major(major: Decimal, currency: Currency) -> AppResult<Self> {
        let overflow = || ValidationError::AmountOverflow {
            currency: currency.to_string(),
        };
        let minor = major
            .checked_mul(Decimal::from(currency.minor_unit_factor()))
            .ok_or_else(overflow)?;
        if minor.fract() != Decimal::ZERO {
            return Err(ValidationError::InvalidRequest {
                message: format!("{} has more precision than {} allows", major, currency),
            }
            .into());
        }
        let amount = minor.to_i64().ok_or_else(overflow)?;
        Ok(Self::new(amount, currency))
    }

    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.amount, self.currency.decimal_places())
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn add(&self, other: &Money) -> AppResult<Money> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| self.overflow())?;
        Ok(Money::new(amount, self.currency))
    }

    pub fn sub(&self, other: &Money) -> AppResult<Money> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| self.overflow())?;
        Ok(Money::new(amount, self.currency))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), ValidationError> {
        if self.currency != other.currency {
            return Err(ValidationError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }

    fn overflow(&self) -> ValidationError {
        ValidationError::AmountOverflow {
            currency: self.currency.to_string(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major(), self.currency)
    }
}
