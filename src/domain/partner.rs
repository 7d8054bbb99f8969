//! Partner hierarchy nodes and their provider credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::{PartnerId, ProviderId};

/// Level of the top-level partner in a lineage.
pub const TOP_LEVEL: u8 = 1;

/// A node in the partner tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub parent_id: Option<PartnerId>,
    /// Depth in the tree; the root is level 1.
    pub level: u8,
}

impl Partner {
    /// Create a top-level partner.
    pub fn top(id: impl Into<PartnerId>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            level: TOP_LEVEL,
        }
    }

    /// Create a partner below `parent`.
    pub fn child(id: impl Into<PartnerId>, parent: impl Into<PartnerId>, level: u8) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent.into()),
            level,
        }
    }

    /// Whether the upward walk stops at this node.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.level == TOP_LEVEL || self.parent_id.is_none()
    }
}

/// Per-provider API credential held by a top-level partner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub partner_id: PartnerId,
    pub provider_id: ProviderId,
    /// Opaque operator code assigned by the provider.
    pub operation_code: String,
    pub access_token: String,
    pub signing_secret: String,
    pub enabled: bool,
}

impl ProviderCredential {
    /// Enabled and every secret populated.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.enabled
            && !self.operation_code.trim().is_empty()
            && !self.access_token.trim().is_empty()
            && !self.signing_secret.trim().is_empty()
    }
}

// Secrets stay out of logs.
impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("partner_id", &self.partner_id)
            .field("provider_id", &self.provider_id)
            .field("operation_code", &self.operation_code)
            .field("access_token", &"<redacted>")
            .field("signing_secret", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}
