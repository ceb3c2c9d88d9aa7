//! Section kinds and resource identifiers
//!
//! A section is one logical category of portal data. Most sections are
//! addressed by a resource ID; the bare reports listing is not.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scrapeable portal section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Saved reports listing (no resource ID)
    Reports,
    /// Property detail page, by property ID
    Property,
    /// Automated valuation, by property ID
    Valuation,
    /// Comparable sales, by property ID
    Comparables,
    /// Market statistics, by location ID or ZIP code
    MarketActivity,
    /// Neighborhood demographics, by neighborhood ID
    Neighborhood,
}

impl SectionKind {
    pub const ALL: [SectionKind; 6] = [
        SectionKind::Reports,
        SectionKind::Property,
        SectionKind::Valuation,
        SectionKind::Comparables,
        SectionKind::MarketActivity,
        SectionKind::Neighborhood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Reports => "reports",
            SectionKind::Property => "property",
            SectionKind::Valuation => "valuation",
            SectionKind::Comparables => "comparables",
            SectionKind::MarketActivity => "market_activity",
            SectionKind::Neighborhood => "neighborhood",
        }
    }

    /// Whether work items for this section carry a resource ID
    pub fn requires_id(&self) -> bool {
        !matches!(self, SectionKind::Reports)
    }

    /// ID lists a section draws its work items from, in processing order
    pub fn id_kinds(&self) -> &'static [IdKind] {
        match self {
            SectionKind::Reports => &[],
            SectionKind::Property | SectionKind::Valuation | SectionKind::Comparables => {
                &[IdKind::Property]
            }
            SectionKind::MarketActivity => &[IdKind::Location, IdKind::Zip],
            SectionKind::Neighborhood => &[IdKind::Neighborhood],
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unknown section: {}", s))
    }
}

/// Which request list a resource ID came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Property,
    Location,
    Zip,
    Neighborhood,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Property => "property",
            IdKind::Location => "location",
            IdKind::Zip => "zip",
            IdKind::Neighborhood => "neighborhood",
        }
    }
}

/// An opaque portal identifier tagged with its origin list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: IdKind,
    pub value: String,
}

impl ResourceId {
    pub fn new(kind: IdKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_round_trips_through_str() {
        for kind in SectionKind::ALL {
            assert_eq!(kind.as_str().parse::<SectionKind>().unwrap(), kind);
        }
        assert!("listings".parse::<SectionKind>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&SectionKind::MarketActivity).unwrap();
        assert_eq!(json, "\"market_activity\"");
    }

    #[test]
    fn test_market_activity_reads_locations_then_zips() {
        assert_eq!(
            SectionKind::MarketActivity.id_kinds(),
            &[IdKind::Location, IdKind::Zip]
        );
        assert!(!SectionKind::Reports.requires_id());
    }
}
