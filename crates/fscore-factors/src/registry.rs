//! Sub-test registry
//!
//! Static metadata for the nine Piotroski tests, in scoring order.

use fscore_data::CanonicalField;
use serde::Serialize;

/// Piotroski test groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTestCategory {
    /// Return and cash generation (tests 1-4)
    Profitability,
    /// Leverage, liquidity and source of funds (tests 5-7)
    Funding,
    /// Margin and turnover (tests 8-9)
    OperatingEfficiency,
}

/// Sub-test metadata
#[derive(Debug, Clone, Copy)]
pub struct SubTestInfo {
    /// Test number, 1 through 9
    pub id: u8,
    /// Short identifier
    pub name: &'static str,
    /// Test group
    pub category: SubTestCategory,
    /// Human-readable pass condition
    pub formula: &'static str,
    /// Statement fields the test reads
    pub required_fields: &'static [CanonicalField],
}

/// All nine tests.
pub static SUB_TESTS: [SubTestInfo; 9] = [
    SubTestInfo {
        id: 1,
        name: "roa_positive",
        category: SubTestCategory::Profitability,
        formula: "net_income / total_assets > 0",
        required_fields: &[CanonicalField::NetIncome, CanonicalField::TotalAssets],
    },
    SubTestInfo {
        id: 2,
        name: "cfo_positive",
        category: SubTestCategory::Profitability,
        formula: "operating_cash_flow > 0",
        required_fields: &[CanonicalField::OperatingCashFlow],
    },
    SubTestInfo {
        id: 3,
        name: "roa_improving",
        category: SubTestCategory::Profitability,
        formula: "ROA(current) - ROA(prior) > 0",
        required_fields: &[CanonicalField::NetIncome, CanonicalField::TotalAssets],
    },
    SubTestInfo {
        id: 4,
        name: "accruals",
        category: SubTestCategory::Profitability,
        formula: "operating_cash_flow > net_income",
        required_fields: &[CanonicalField::OperatingCashFlow, CanonicalField::NetIncome],
    },
    SubTestInfo {
        id: 5,
        name: "leverage_declining",
        category: SubTestCategory::Funding,
        formula: "total_debt / total_assets (current) - (prior) < 0",
        required_fields: &[CanonicalField::TotalDebt, CanonicalField::TotalAssets],
    },
    SubTestInfo {
        id: 6,
        name: "current_ratio_improving",
        category: SubTestCategory::Funding,
        formula: "current_assets / current_liabilities (current) - (prior) > 0",
        required_fields: &[CanonicalField::CurrentAssets, CanonicalField::CurrentLiabilities],
    },
    SubTestInfo {
        id: 7,
        name: "no_dilution",
        category: SubTestCategory::Funding,
        formula: "shares_outstanding(current) <= shares_outstanding(prior)",
        required_fields: &[CanonicalField::SharesOutstanding],
    },
    SubTestInfo {
        id: 8,
        name: "gross_margin_improving",
        category: SubTestCategory::OperatingEfficiency,
        formula: "gross_profit / revenue (current) - (prior) > 0",
        required_fields: &[CanonicalField::GrossProfit, CanonicalField::Revenue],
    },
    SubTestInfo {
        id: 9,
        name: "asset_turnover_improving",
        category: SubTestCategory::OperatingEfficiency,
        formula: "revenue / total_assets (current) - (prior) > 0",
        required_fields: &[CanonicalField::Revenue, CanonicalField::TotalAssets],
    },
];

/// Metadata for a test number.
pub fn sub_test_info(id: u8) -> Option<&'static SubTestInfo> {
    SUB_TESTS.iter().find(|info| info.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        for (i, info) in SUB_TESTS.iter().enumerate() {
            assert_eq!(usize::from(info.id), i + 1);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(sub_test_info(7).map(|i| i.name), Some("no_dilution"));
        assert!(sub_test_info(0).is_none());
        assert!(sub_test_info(10).is_none());
    }

    #[test]
    fn test_every_canonical_field_is_used() {
        for field in CanonicalField::ALL {
            assert!(
                SUB_TESTS.iter().any(|info| info.required_fields.contains(&field)),
                "{field} unused"
            );
        }
    }
}
