use crate::payments::money::Currency;
use crate::payments::providers::MockGatewayConfig;
use crate::payments::rate_limit::RateLimitConfig;
use crate::payments::service::PaymentServiceConfig;
use crate::payments::types::GatewayKind;
use crate::quotes::engine::DEFAULT_VALIDITY_SECS;
use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub payments: PaymentServiceConfig,
    pub rate_limit: RateLimitConfig,
    pub webhook: WebhookConfig,
    pub quotes: QuoteConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Raw `PAYMENT_GATEWAY` tag, parsed during validation and selection
    pub tag: String,
    pub mock: MockGatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tag: GatewayKind::Mock.to_string(),
            mock: MockGatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub verify_signatures: bool,
    /// Acknowledge unrecognized event types with 200 instead of 400
    pub ack_unknown_events: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_signatures: true,
            ack_unknown_events: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuoteConfig {
    pub validity_secs: i64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            validity_secs: DEFAULT_VALIDITY_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take the sub-config defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: lookup("HOST").unwrap_or(server_defaults.host),
            port: parse_or(&lookup, "PORT", server_defaults.port)?,
            environment: lookup("ENVIRONMENT").unwrap_or(server_defaults.environment),
        };

        let mock_defaults = MockGatewayConfig::default();
        let gateway = GatewayConfig {
            tag: lookup("PAYMENT_GATEWAY")
                .map(|tag| tag.trim().to_lowercase())
                .unwrap_or_else(|| GatewayKind::Mock.to_string()),
            mock: MockGatewayConfig {
                webhook_secret: lookup("MOCK_WEBHOOK_SECRET").unwrap_or(mock_defaults.webhook_secret),
                redirect_base_url: lookup("MOCK_REDIRECT_BASE_URL")
                    .unwrap_or(mock_defaults.redirect_base_url),
                gateway_type: GatewayKind::Mock,
            },
        };

        let payment_defaults = PaymentServiceConfig::default();
        let supported_currencies = match lookup("SUPPORTED_CURRENCIES") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|code| {
                    Currency::from_str(&code.to_uppercase())
                        .with_context(|| format!("SUPPORTED_CURRENCIES contains unsupported code {}", code))
                })
                .collect::<Result<Vec<_>>>()?,
            None => payment_defaults.supported_currencies,
        };
        let payments = PaymentServiceConfig {
            min_amount: parse_or(&lookup, "PAYMENT_MIN_AMOUNT", payment_defaults.min_amount)?,
            max_amount: parse_or(&lookup, "PAYMENT_MAX_AMOUNT", payment_defaults.max_amount)?,
            supported_currencies,
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: parse_flag(&lookup, "RATE_LIMIT_ENABLED", rate_defaults.enabled)?,
            max_payments_per_hour: parse_or(
                &lookup,
                "RATE_LIMIT_MAX_PAYMENTS_PER_HOUR",
                rate_defaults.max_payments_per_hour,
            )?,
            max_refunds_per_day: parse_or(
                &lookup,
                "RATE_LIMIT_MAX_REFUNDS_PER_DAY",
                rate_defaults.max_refunds_per_day,
            )?,
        };

        let webhook_defaults = WebhookConfig::default();
        let webhook = WebhookConfig {
            verify_signatures: parse_flag(
                &lookup,
                "WEBHOOK_VERIFY_SIGNATURES",
                webhook_defaults.verify_signatures,
            )?,
            ack_unknown_events: parse_flag(
                &lookup,
                "WEBHOOK_ACK_UNKNOWN_EVENTS",
                webhook_defaults.ack_unknown_events,
            )?,
        };

        let quotes = QuoteConfig {
            validity_secs: parse_or(&lookup, "QUOTE_VALIDITY_SECS", DEFAULT_VALIDITY_SECS)?,
        };

        let config = Config {
            server,
            gateway,
            payments,
            rate_limit,
            webhook,
            quotes,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn gateway_kind(&self) -> Result<GatewayKind> {
        self.gateway
            .tag
            .parse::<GatewayKind>()
            .map_err(|e| anyhow!("PAYMENT_GATEWAY: {}", e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        let kind = self.gateway_kind()?;
        if kind == GatewayKind::Mock && self.gateway.mock.webhook_secret.trim().is_empty() {
            return Err(anyhow!("MOCK_WEBHOOK_SECRET cannot be empty"));
        }

        if self.payments.min_amount <= Decimal::ZERO {
            return Err(anyhow!(
                "PAYMENT_MIN_AMOUNT must be positive, got {}",
                self.payments.min_amount
            ));
        }
        if self.payments.min_amount > self.payments.max_amount {
            return Err(anyhow!(
                "PAYMENT_MIN_AMOUNT ({}) must not exceed PAYMENT_MAX_AMOUNT ({})",
                self.payments.min_amount,
                self.payments.max_amount
            ));
        }
        if self.payments.supported_currencies.is_empty() {
            return Err(anyhow!(
                "SUPPORTED_CURRENCIES must contain at least one currency"
            ));
        }

        if self.server.environment == "production" && !self.webhook.verify_signatures {
            return Err(anyhow!(
                "WEBHOOK_VERIFY_SIGNATURES cannot be disabled in production"
            ));
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} must be a valid value, got {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("{} must be a boolean, got {:?}", key, raw)),
        },
    }
}
