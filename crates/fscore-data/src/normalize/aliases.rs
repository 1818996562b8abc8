//! Alias table mapping source labels onto canonical fields.
//!
//! Labels are matched after folding: any namespace prefix before `:` is
//! dropped, the rest is lowercased and stripped of everything that is not a
//! letter or digit. `"Total Assets"`, `"us-gaap:Assets"` and `"totalAssets"`
//! therefore all reach the same entry.
//!
//! Within a field, aliases are listed best first. When a payload carries
//! several labels for the same field, the one listed earliest wins.

use crate::statement::CanonicalField;
use std::collections::HashMap;
use std::sync::LazyLock;

/// What a recognized label feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasTarget {
    /// A canonical field directly
    Field(CanonicalField),
    /// Cost of revenue, used to derive gross profit when it is not reported
    CostOfRevenue,
}

/// Source labels per target, best first.
static ALIASES: &[(AliasTarget, &[&str])] = &[
    (
        AliasTarget::Field(CanonicalField::NetIncome),
        &[
            "net_income",
            "NetIncomeLoss",
            "NetIncome",
            "Net Income",
            "Net Income Common Stockholders",
            "Net income attributable to owners of the parent",
            "ProfitLoss",
            "Profit for the year",
            "Profit for the period",
            "Net profit",
            "Periodens resultat",
            "Årets resultat",
            "Nettoresultat",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::OperatingCashFlow),
        &[
            "operating_cash_flow",
            "cfo",
            "NetCashProvidedByUsedInOperatingActivities",
            "OperatingCashFlow",
            "OperatingCashFlows",
            "Operating Cash Flow",
            "Cash from Operations",
            "Cash Flow from Operating Activities",
            "Net cash from operating activities",
            "Cash flow from operating activities",
            "Kassaflöde från den löpande verksamheten",
            "Kassaflöde från löpande verksamhet",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::TotalAssets),
        &[
            "total_assets",
            "Assets",
            "TotalAssets",
            "Total Assets",
            "Summa tillgångar",
            "Tillgångar totalt",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::TotalDebt),
        &[
            "total_debt",
            "TotalDebt",
            "Total Debt",
            "Debt",
            "Interest-bearing liabilities",
            "Räntebärande skulder",
            "long_term_debt",
            "LongTermDebt",
            "LongTermDebtNoncurrent",
            "Long-Term Debt",
            "Long Term Debt",
            "Non-current interest-bearing liabilities",
            "Långfristiga räntebärande skulder",
            "Långfristiga skulder",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::CurrentAssets),
        &[
            "current_assets",
            "AssetsCurrent",
            "CurrentAssets",
            "Total Current Assets",
            "Current Assets",
            "Summa omsättningstillgångar",
            "Omsättningstillgångar",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::CurrentLiabilities),
        &[
            "current_liabilities",
            "LiabilitiesCurrent",
            "CurrentLiabilities",
            "Total Current Liabilities",
            "Current Liabilities",
            "Summa kortfristiga skulder",
            "Kortfristiga skulder",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::SharesOutstanding),
        &[
            "shares_outstanding",
            "shares",
            "CommonStockSharesOutstanding",
            "OrdinarySharesNumber",
            "ShareIssued",
            "Shares Outstanding",
            "Total Common Shares Outstanding",
            "Shares Outstanding (Basic)",
            "WeightedAverageNumberOfSharesOutstandingBasic",
            "BasicAverageShares",
            "Weighted average number of shares",
            "Antal aktier",
            "Genomsnittligt antal aktier",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::Revenue),
        &[
            "revenue",
            "Revenues",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
            "TotalRevenue",
            "Total Revenue",
            "Revenue",
            "Net Sales",
            "Sales",
            "Operating Revenue",
            "Nettoomsättning",
            "Intäkter",
            "Omsättning",
        ],
    ),
    (
        AliasTarget::Field(CanonicalField::GrossProfit),
        &[
            "gross_profit",
            "GrossProfit",
            "Gross Profit",
            "Gross income",
            "Bruttoresultat",
        ],
    ),
    (
        AliasTarget::CostOfRevenue,
        &[
            "cogs",
            "cost_of_revenue",
            "CostOfRevenue",
            "CostOfGoodsAndServicesSold",
            "Cost of Revenue",
            "Cost of Goods Sold",
            "Cost of sales",
            "Kostnad för sålda varor",
            "Kostnader för sålda varor",
        ],
    ),
];

static INDEX: LazyLock<HashMap<String, (AliasTarget, usize)>> = LazyLock::new(|| {
    let mut index = HashMap::new();
    for (target, labels) in ALIASES {
        for (rank, label) in labels.iter().enumerate() {
            index.entry(fold(label)).or_insert((*target, rank));
        }
    }
    index
});

/// Fold a label into its matching key.
pub fn fold(label: &str) -> String {
    let label = label.rsplit_once(':').map_or(label, |(_, local)| local);
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Target and rank of a source label. Lower rank is the better alias.
pub fn lookup(label: &str) -> Option<(AliasTarget, usize)> {
    INDEX.get(&fold(label)).copied()
}
