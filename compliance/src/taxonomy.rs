//! Fixed regulation category taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Regulation category. `Other` is the escape hatch, so classification
/// always terminates with exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DataProtection,
    Securities,
    Antitrust,
    Governance,
    Financial,
    Ethics,
    Environmental,
    Other,
}

impl Category {
    /// All categories in tie-break order.
    pub const ALL: [Category; 8] = [
        Category::DataProtection,
        Category::Securities,
        Category::Antitrust,
        Category::Governance,
        Category::Financial,
        Category::Ethics,
        Category::Environmental,
        Category::Other,
    ];

    /// Stable identifier used in index metadata and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DataProtection => "data_protection",
            Category::Securities => "securities",
            Category::Antitrust => "antitrust",
            Category::Governance => "governance",
            Category::Financial => "financial",
            Category::Ethics => "ethics",
            Category::Environmental => "environmental",
            Category::Other => "other",
        }
    }

    pub fn profile(&self) -> &'static CategoryProfile {
        // PROFILES is ordered like ALL.
        let idx = Category::ALL.iter().position(|c| c == self).unwrap_or(7);
        &PROFILES[idx]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::DataProtection => "Data-Protection",
            Category::Securities => "Securities",
            Category::Antitrust => "Anti-trust",
            Category::Governance => "Governance",
            Category::Financial => "Financial",
            Category::Ethics => "Ethics",
            Category::Environmental => "Environmental",
            Category::Other => "Other",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts both the identifier (`data_protection`) and display
    /// (`Data-Protection`) forms, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().replace('_', "") == key)
            .ok_or_else(|| format!("unknown category {s:?}"))
    }
}

/// Keyword profile of a category.
pub struct CategoryProfile {
    pub category: Category,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
    pub subcategories: &'static [(&'static str, &'static [&'static str])],
}

static PROFILES: [CategoryProfile; 8] = [
    CategoryProfile {
        category: Category::DataProtection,
        description: "Personal data, privacy and information security obligations",
        keywords: &[
            "personal data", "privacy", "gdpr", "data subject", "consent", "data breach",
            "data protection", "processing", "controller", "processor", "retention",
            "encryption", "pii", "ccpa",
        ],
        subcategories: &[
            ("consent", &["consent", "opt-in", "opt out"]),
            ("breach notification", &["data breach", "notify", "notification"]),
            ("cross-border transfer", &["transfer", "third country", "adequacy"]),
            ("retention", &["retention", "erasure", "delete"]),
        ],
    },
    CategoryProfile {
        category: Category::Securities,
        description: "Securities trading, disclosure and market abuse rules",
        keywords: &[
            "securities", "insider", "insider trading", "material non-public", "nonpublic",
            "sec", "exchange act", "rule 10b-5", "market manipulation", "disclosure",
            "tipping", "blackout", "shares", "stock",
        ],
        subcategories: &[
            ("insider trading", &["insider", "material non-public", "nonpublic", "tipping"]),
            ("market manipulation", &["manipulation", "pump", "spoofing"]),
            ("disclosure", &["disclosure", "filing", "8-k", "10-k"]),
        ],
    },
    CategoryProfile {
        category: Category::Antitrust,
        description: "Competition law: cartels, collusion and abuse of dominance",
        keywords: &[
            "antitrust", "competition", "competitor", "price fixing", "cartel", "collusion",
            "bid rigging", "market allocation", "dominant position", "monopoly",
            "sherman act", "merger control",
        ],
        subcategories: &[
            ("price fixing", &["price fixing", "fix prices", "pricing agreement"]),
            ("bid rigging", &["bid rigging", "tender"]),
            ("market allocation", &["market allocation", "divide", "territory"]),
            ("abuse of dominance", &["dominant position", "monopoly", "exclusive dealing"]),
        ],
    },
    CategoryProfile {
        category: Category::Governance,
        description: "Board, fiduciary and corporate governance duties",
        keywords: &[
            "board", "director", "fiduciary", "governance", "shareholder", "quorum",
            "committee", "minutes", "bylaws", "related party", "independence",
        ],
        subcategories: &[
            ("fiduciary duty", &["fiduciary", "duty of care", "duty of loyalty"]),
            ("board process", &["quorum", "minutes", "committee", "bylaws"]),
            ("related party", &["related party", "independence"]),
        ],
    },
    CategoryProfile {
        category: Category::Financial,
        description: "Accounting, audit, tax and financial reporting standards",
        keywords: &[
            "financial", "accounting", "audit", "revenue", "expenses", "tax", "gaap", "ifrs",
            "balance sheet", "income statement", "cash flow", "internal control",
            "sarbanes-oxley", "reporting",
        ],
        subcategories: &[
            ("accounting", &["accounting", "gaap", "ifrs", "revenue recognition"]),
            ("audit", &["audit", "auditor", "internal control"]),
            ("tax", &["tax", "withholding"]),
            ("reporting", &["reporting", "financial statement", "disclosure"]),
        ],
    },
    CategoryProfile {
        category: Category::Ethics,
        description: "Conduct, bribery, corruption and conflicts of interest",
        keywords: &[
            "ethics", "ethical", "bribery", "bribe", "corruption", "kickback",
            "conflict of interest", "whistleblower", "code of conduct", "integrity",
            "gift", "fcpa",
        ],
        subcategories: &[
            ("bribery", &["bribery", "bribe", "kickback", "fcpa"]),
            ("conflict of interest", &["conflict of interest", "personal interest"]),
            ("whistleblower", &["whistleblower", "retaliation"]),
            ("code of conduct", &["code of conduct", "integrity"]),
        ],
    },
    CategoryProfile {
        category: Category::Environmental,
        description: "Environmental protection, emissions and sustainability reporting",
        keywords: &[
            "environmental", "emissions", "carbon", "pollution", "waste", "climate",
            "sustainability", "hazardous", "discharge", "esg", "greenhouse",
        ],
        subcategories: &[
            ("emissions", &["emissions", "carbon", "greenhouse"]),
            ("waste", &["waste", "hazardous", "discharge"]),
            ("sustainability reporting", &["sustainability", "esg", "climate disclosure"]),
        ],
    },
    CategoryProfile {
        category: Category::Other,
        description: "Regulations outside the fixed taxonomy",
        keywords: &[],
        subcategories: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("Data-Protection".parse::<Category>(), Ok(Category::DataProtection));
        assert_eq!("data_protection".parse::<Category>(), Ok(Category::DataProtection));
        assert_eq!("Anti-trust".parse::<Category>(), Ok(Category::Antitrust));
        assert_eq!("FINANCIAL".parse::<Category>(), Ok(Category::Financial));
        assert!("astrology".parse::<Category>().is_err());
    }

    #[test]
    fn test_profiles_aligned() {
        for c in Category::ALL {
            assert_eq!(c.profile().category, c);
        }
    }

    #[test]
    fn test_serde_identifier() {
        let json = serde_json::to_string(&Category::DataProtection).unwrap();
        assert_eq!(json, "\"data_protection\"");
        assert_eq!(Category::Securities.as_str(), "securities");
    }
}
