//! Strong Customer Authentication challenges

use crate::payments::types::PaymentIntent;
use serde::{Deserialize, Serialize};

const CHALLENGE_PREFIX: &str = "sca_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaStatus {
    /// No authentication needed
    #[default]
    NotRequired,
    /// Customer must complete the redirect
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaChallenge {
    pub id: String,
    pub payment_intent_id: String,
    pub redirect_url: Option<String>,
    pub status: ScaStatus,
}

impl ScaChallenge {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// Stateless: the challenge is a pure function of the intent
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaCoordinator;

impl ScaCoordinator {
    pub fn new() -> Self {
        Self
    }

    pub fn challenge_for(&self, intent: &PaymentIntent) -> ScaChallenge {
        if !intent.requires_sca {
            return ScaChallenge::default();
        }
        ScaChallenge {
            id: format!("{}{}", CHALLENGE_PREFIX, intent.id),
            payment_intent_id: intent.id.clone(),
            redirect_url: intent.sca_redirect_url.clone(),
            status: ScaStatus::Pending,
        }
    }
}
