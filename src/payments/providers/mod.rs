//! Payment gateway implementations
//!
//! Concrete adapters are injected into a [`GatewayRegistry`] at startup and the
//! one matching the configured gateway tag is handed to the service.

pub mod mock;

pub use mock::{MockGateway, MockGatewayConfig};

use crate::error::{AppResult, ConfigurationError};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::GatewayKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the tag it reports
    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        info!(
            "Registered payment gateway: name={}, type={}",
            gateway.name(),
            gateway.gateway_type()
        );
        self.gateways.insert(gateway.gateway_type(), gateway);
        self
    }

    pub fn kinds(&self) -> Vec<GatewayKind> {
        self.gateways.keys().copied().collect()
    }

    /// Pick the adapter for a configured tag
    pub fn select(&self, tag: &str) -> AppResult<Arc<dyn PaymentGateway>> {
        let kind: GatewayKind = tag.parse()?;
        self.gateways.get(&kind).cloned().ok_or_else(|| {
            ConfigurationError::GatewayNotConfigured {
                gateway: kind.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GatewayRegistry {
        GatewayRegistry::new().register(Arc::new(MockGateway::new(MockGatewayConfig::default())))
    }

    #[test]
    fn test_select_configured_gateway() {
        let gateway = registry().select("mock").unwrap();
        assert_eq!(gateway.gateway_type(), GatewayKind::Mock);
        assert_eq!(gateway.name(), "Mock");
    }

    #[test]
    fn test_select_known_but_unregistered_gateway() {
        let err = registry().select("stripe").err().unwrap();
        assert!(err.is_configuration());
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Configuration(ConfigurationError::GatewayNotConfigured { .. })
        ));
    }

    #[test]
    fn test_select_unknown_gateway() {
        let err = registry().select("square").err().unwrap();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Configuration(ConfigurationError::UnsupportedGateway { .. })
        ));
    }
}
