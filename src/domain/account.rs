//! Decoded margin account state as returned by an [`AccountSource`].
//!
//! Numeric fields are kept as raw JSON values: ledger gateways return some
//! amounts as numbers and others as decimal strings, and a single account
//! with a malformed field must fail on its own rather than break the
//! deserialization of a whole response. Turning them into numbers is the
//! mapper's job.
//!
//! [`AccountSource`]: crate::domain::ports::AccountSource

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An amount as it arrived on the wire. `None` when the field was absent or null.
pub type RawAmount = Option<Value>;

/// Point-in-time view of one margin account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub authority: String,
    #[serde(default)]
    pub assets: RawAmount,
    #[serde(default)]
    pub liabilities: RawAmount,
    #[serde(default)]
    pub deposits: RawAmount,
    #[serde(default)]
    pub borrows: RawAmount,
    #[serde(default)]
    pub margin_requirement: MarginRequirements,
    #[serde(default)]
    pub mango: Option<VenueSubPosition>,
    #[serde(default)]
    pub zo: Option<VenueSubPosition>,
}

impl AccountSnapshot {
    pub fn venue(&self, venue: Venue) -> Option<&VenueSubPosition> {
        match venue {
            Venue::Mango => self.mango.as_ref(),
            Venue::Zo => self.zo.as_ref(),
        }
    }
}

/// Margin requirement for each risk tier.
///
/// The protocol keeps `partial_liquidation <= maintenance <= initial`; this
/// crate reports whatever it is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginRequirements {
    #[serde(default)]
    pub initial: RawAmount,
    #[serde(default)]
    pub maintenance: RawAmount,
    #[serde(default)]
    pub partial_liquidation: RawAmount,
}

/// Position mirrored on an external trading venue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueSubPosition {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub equity: RawAmount,
    #[serde(default)]
    pub free_collateral: RawAmount,
    #[serde(default)]
    pub liquidation_value: RawAmount,
}

/// Supported external trading venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Venue {
    Mango,
    Zo,
}

impl Venue {
    pub const ALL: [Venue; 2] = [Venue::Mango, Venue::Zo];

    pub fn name(&self) -> &'static str {
        match self {
            Venue::Mango => "mango",
            Venue::Zo => "zo",
        }
    }
}

/// Label names shared by every per-account gauge, in label-value order.
pub const ACCOUNT_LABEL_NAMES: [&str; 3] = ["marginfi_address", "mango_address", "zo_address"];

/// The three-part label tuple attached to every per-account sample.
///
/// Venue addresses are empty strings when the account has no position on
/// that venue, so every gauge keeps the same label arity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AccountLabels {
    pub marginfi_address: String,
    pub mango_address: String,
    pub zo_address: String,
}

impl AccountLabels {
    pub fn for_snapshot(snapshot: &AccountSnapshot) -> Self {
        let venue_address = |venue| {
            snapshot
                .venue(venue)
                .map(|position| position.address.clone())
                .unwrap_or_default()
        };

        Self {
            marginfi_address: snapshot.address.clone(),
            mango_address: venue_address(Venue::Mango),
            zo_address: venue_address(Venue::Zo),
        }
    }

    /// Label values in the order of [`ACCOUNT_LABEL_NAMES`].
    pub fn values(&self) -> [&str; 3] {
        [
            self.marginfi_address.as_str(),
            self.mango_address.as_str(),
            self.zo_address.as_str(),
        ]
    }

    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        ACCOUNT_LABEL_NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| (*name, value.to_string()))
            .collect()
    }
}
