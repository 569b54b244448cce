//! Names and help strings of the per-account gauge families.

use crate::domain::account::Venue;

/// One per-account gauge family. Every family carries the
/// [`ACCOUNT_LABEL_NAMES`](crate::domain::account::ACCOUNT_LABEL_NAMES) label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountGauge {
    Borrows,
    Deposits,
    Equity,
    Assets,
    Liabilities,
    MarginRequirementInitial,
    MarginRequirementMaintenance,
    MarginRequirementPartialLiquidation,
    VenueEquity(Venue),
    VenueFreeCollateral(Venue),
    VenueLiquidationValue(Venue),
}

impl AccountGauge {
    pub const ALL: [AccountGauge; 14] = [
        AccountGauge::Borrows,
        AccountGauge::Deposits,
        AccountGauge::Equity,
        AccountGauge::Assets,
        AccountGauge::Liabilities,
        AccountGauge::MarginRequirementInitial,
        AccountGauge::MarginRequirementMaintenance,
        AccountGauge::MarginRequirementPartialLiquidation,
        AccountGauge::VenueEquity(Venue::Mango),
        AccountGauge::VenueFreeCollateral(Venue::Mango),
        AccountGauge::VenueLiquidationValue(Venue::Mango),
        AccountGauge::VenueEquity(Venue::Zo),
        AccountGauge::VenueFreeCollateral(Venue::Zo),
        AccountGauge::VenueLiquidationValue(Venue::Zo),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AccountGauge::Borrows => "marginfi_account_borrows",
            AccountGauge::Deposits => "marginfi_account_deposits",
            AccountGauge::Equity => "marginfi_account_equity",
            AccountGauge::Assets => "marginfi_account_assets",
            AccountGauge::Liabilities => "marginfi_account_liabilities",
            AccountGauge::MarginRequirementInitial => "marginfi_margin_requirement_initial",
            AccountGauge::MarginRequirementMaintenance => "marginfi_margin_requirement_maintenance",
            AccountGauge::MarginRequirementPartialLiquidation => {
                "marginfi_margin_requirement_partial_liquidation"
            }
            AccountGauge::VenueEquity(Venue::Mango) => "mango_account_equity",
            AccountGauge::VenueFreeCollateral(Venue::Mango) => "mango_account_free_collateral",
            AccountGauge::VenueLiquidationValue(Venue::Mango) => "mango_account_liquidation_value",
            AccountGauge::VenueEquity(Venue::Zo) => "zo_account_equity",
            AccountGauge::VenueFreeCollateral(Venue::Zo) => "zo_account_free_collateral",
            AccountGauge::VenueLiquidationValue(Venue::Zo) => "zo_account_liquidation_value",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            AccountGauge::Borrows => "Marginfi Account Borrows",
            AccountGauge::Deposits => "Marginfi Account Deposits",
            AccountGauge::Equity => "Marginfi Account Equity",
            AccountGauge::Assets => "Marginfi Account Assets",
            AccountGauge::Liabilities => "Marginfi Account Liabilities",
            AccountGauge::MarginRequirementInitial => "Marginfi Account Margin Initial Requirement",
            AccountGauge::MarginRequirementMaintenance => {
                "Marginfi Account Margin Maintenance Requirement"
            }
            AccountGauge::MarginRequirementPartialLiquidation => {
                "Marginfi Account Margin Partial Liquidation Requirement"
            }
            AccountGauge::VenueEquity(Venue::Mango) => "Mango Account Equity",
            AccountGauge::VenueFreeCollateral(Venue::Mango) => "Mango Account Free Collateral",
            AccountGauge::VenueLiquidationValue(Venue::Mango) => "Mango Account Liquidation Value",
            AccountGauge::VenueEquity(Venue::Zo) => "Zo Account Equity",
            AccountGauge::VenueFreeCollateral(Venue::Zo) => "Zo Account Free Collateral",
            AccountGauge::VenueLiquidationValue(Venue::Zo) => "Zo Account Liquidation Value",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_gauge_names_are_unique() {
        let names: HashSet<_> = AccountGauge::ALL.iter().map(|g| g.name()).collect();
        assert_eq!(names.len(), AccountGauge::ALL.len());
    }

    #[test]
    fn test_venue_gauges_are_prefixed_by_venue() {
        for venue in Venue::ALL {
            let gauge = AccountGauge::VenueEquity(venue);
            assert!(gauge.name().starts_with(venue.name()));
        }
    }
}
