//! Trust tiers and classification results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust tier assigned to every action request.
///
/// Governs whether an action auto-executes or waits for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustTier {
    /// Read-only operations. Auto-approved.
    Green,
    /// Mutating operations. Require approval.
    Yellow,
    /// Destructive operations. Require approval plus a PIN.
    Red,
    /// Computer-input-device control, banded by [`ComputerBand`].
    Computer,
}

impl TrustTier {
    /// Ordering used when combining tiers: higher is more restrictive.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Green => 0,
            Self::Yellow => 1,
            Self::Computer => 2,
            Self::Red => 3,
        }
    }

    /// Return the more restrictive of two tiers.
    #[must_use]
    pub fn stricter(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
            Self::Computer => "COMPUTER",
        };
        f.write_str(label)
    }
}

/// Internal band of the [`TrustTier::Computer`] tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputerBand {
    /// Screenshots and cursor moves. Auto-approved.
    ReadOnly,
    /// Clicks, typing, scrolling, single keys. Require approval.
    Moderate,
    /// Drags, key holds, triple clicks, dangerous key combos.
    /// Require approval and carry an elevated warning.
    Destructive,
}

/// The classifier's verdict for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned tier.
    pub tier: TrustTier,
    /// Band, present only for [`TrustTier::Computer`].
    pub band: Option<ComputerBand>,
    /// Short human-readable explanation.
    pub reason: String,
}

impl Classification {
    /// Create a classification without a computer band.
    #[must_use]
    pub fn new(tier: TrustTier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            band: None,
            reason: reason.into(),
        }
    }

    /// Create a computer-tier classification.
    #[must_use]
    pub fn computer(band: ComputerBand, reason: impl Into<String>) -> Self {
        Self {
            tier: TrustTier::Computer,
            band: Some(band),
            reason: reason.into(),
        }
    }

    /// Whether a human must approve before execution.
    ///
    /// A computer-tier classification without a band is treated as
    /// requiring approval.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        match self.tier {
            TrustTier::Green => false,
            TrustTier::Yellow | TrustTier::Red => true,
            TrustTier::Computer => self.band != Some(ComputerBand::ReadOnly),
        }
    }

    /// Whether approval must be accompanied by a PIN.
    #[must_use]
    pub fn requires_pin(&self) -> bool {
        self.tier == TrustTier::Red
    }

    /// Whether the approval prompt should carry an elevated warning.
    #[must_use]
    pub fn elevated_warning(&self) -> bool {
        self.tier == TrustTier::Red || self.band == Some(ComputerBand::Destructive)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.band {
            Some(band) => write!(f, "[{}/{band:?}] {}", self.tier, self.reason),
            None => write!(f, "[{}] {}", self.tier, self.reason),
        }
    }
}
