//! Maps a decoded account snapshot to the flat set of published figures.
//!
//! Pure: no I/O, no shared state. The poller calls it once per loaded account
//! and treats a [`DecodeError`] as a failure of that account only.

use crate::domain::account::{AccountLabels, AccountSnapshot, RawAmount, Venue, VenueSubPosition};
use crate::domain::errors::DecodeError;
use crate::domain::gauges::AccountGauge;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use std::str::FromStr;

/// Derived figures for one venue sub-position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VenueMetrics {
    pub equity: f64,
    pub free_collateral: f64,
    pub liquidation_value: f64,
}

/// Everything published for one account in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMetrics {
    pub labels: AccountLabels,
    pub borrows: f64,
    pub deposits: f64,
    pub equity: f64,
    pub assets: f64,
    pub liabilities: f64,
    pub margin_requirement_initial: f64,
    pub margin_requirement_maintenance: f64,
    pub margin_requirement_partial_liquidation: f64,
    pub mango: Option<VenueMetrics>,
    pub zo: Option<VenueMetrics>,
}

impl FlatMetrics {
    pub fn venue(&self, venue: Venue) -> Option<&VenueMetrics> {
        match venue {
            Venue::Mango => self.mango.as_ref(),
            Venue::Zo => self.zo.as_ref(),
        }
    }

    /// One value per [`AccountGauge`]. A missing venue publishes zeros so
    /// every account has a sample in every family.
    pub fn samples(&self) -> Vec<(AccountGauge, f64)> {
        AccountGauge::ALL
            .iter()
            .map(|gauge| (*gauge, self.value(*gauge)))
            .collect()
    }

    pub fn value(&self, gauge: AccountGauge) -> f64 {
        let venue_value = |venue: Venue, pick: fn(&VenueMetrics) -> f64| {
            self.venue(venue).map(pick).unwrap_or(0.0)
        };

        match gauge {
            AccountGauge::Borrows => self.borrows,
            AccountGauge::Deposits => self.deposits,
            AccountGauge::Equity => self.equity,
            AccountGauge::Assets => self.assets,
            AccountGauge::Liabilities => self.liabilities,
            AccountGauge::MarginRequirementInitial => self.margin_requirement_initial,
            AccountGauge::MarginRequirementMaintenance => self.margin_requirement_maintenance,
            AccountGauge::MarginRequirementPartialLiquidation => {
                self.margin_requirement_partial_liquidation
            }
            AccountGauge::VenueEquity(venue) => venue_value(venue, |m| m.equity),
            AccountGauge::VenueFreeCollateral(venue) => venue_value(venue, |m| m.free_collateral),
            AccountGauge::VenueLiquidationValue(venue) => {
                venue_value(venue, |m| m.liquidation_value)
            }
        }
    }
}

/// Derive the published figures for one account.
///
/// Equity is always recomputed as `assets - liabilities`.
pub fn map_account(snapshot: &AccountSnapshot) -> Result<FlatMetrics, DecodeError> {
    if snapshot.address.is_empty() {
        return Err(DecodeError::MissingField { field: "address" });
    }

    let assets = amount("assets", &snapshot.assets)?;
    let liabilities = amount("liabilities", &snapshot.liabilities)?;
    let requirement = &snapshot.margin_requirement;

    Ok(FlatMetrics {
        labels: AccountLabels::for_snapshot(snapshot),
        borrows: amount("borrows", &snapshot.borrows)?,
        deposits: amount("deposits", &snapshot.deposits)?,
        equity: assets - liabilities,
        assets,
        liabilities,
        margin_requirement_initial: amount("marginRequirement.initial", &requirement.initial)?,
        margin_requirement_maintenance: amount(
            "marginRequirement.maintenance",
            &requirement.maintenance,
        )?,
        margin_requirement_partial_liquidation: amount(
            "marginRequirement.partialLiquidation",
            &requirement.partial_liquidation,
        )?,
        mango: snapshot
            .mango
            .as_ref()
            .map(|p| map_venue(Venue::Mango, p))
            .transpose()?,
        zo: snapshot
            .zo
            .as_ref()
            .map(|p| map_venue(Venue::Zo, p))
            .transpose()?,
    })
}

fn map_venue(venue: Venue, position: &VenueSubPosition) -> Result<VenueMetrics, DecodeError> {
    let (equity, free_collateral, liquidation_value) = match venue {
        Venue::Mango => ("mango.equity", "mango.freeCollateral", "mango.liquidationValue"),
        Venue::Zo => ("zo.equity", "zo.freeCollateral", "zo.liquidationValue"),
    };

    Ok(VenueMetrics {
        equity: amount(equity, &position.equity)?,
        free_collateral: amount(free_collateral, &position.free_collateral)?,
        liquidation_value: amount(liquidation_value, &position.liquidation_value)?,
    })
}

fn amount(field: &'static str, raw: &RawAmount) -> Result<f64, DecodeError> {
    let value = match raw {
        None | Some(Value::Null) => return Err(DecodeError::MissingField { field }),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_decimal_string(s.trim()),
        Some(_) => None,
    };

    let value = value.ok_or_else(|| DecodeError::NotNumeric {
        field,
        value: raw.as_ref().map(Value::to_string).unwrap_or_default(),
    })?;

    if !value.is_finite() {
        return Err(DecodeError::NonFinite { field, value });
    }
    Ok(value)
}

// Decimal strings first (exact, e.g. "1234.000001"), then scientific notation.
// Anything past Decimal's 96-bit range (raw u128 amounts, "1e30") goes through f64.
fn parse_decimal_string(s: &str) -> Option<f64> {
    Decimal::from_str(s)
        .ok()
        .and_then(|d| d.to_f64())
        .or_else(|| Decimal::from_scientific(s).ok().and_then(|d| d.to_f64()))
        .or_else(|| s.parse::<f64>().ok())
}
