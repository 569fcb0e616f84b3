//! Spatial hierarchy tiers and the suffix-rank table used to resolve
//! parent/child direction when two locations' tiers don't already imply one.
//!
//! Neither table exists verbatim in any upstream source: the tier order and
//! suffix ranks are hand-authored rather than ported from a reference
//! dictionary — see DESIGN.md.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    World,
    Continent,
    Kingdom,
    Region,
    City,
    Site,
    Building,
}

pub const TIER_ORDER: &[Tier] = &[
    Tier::World,
    Tier::Continent,
    Tier::Kingdom,
    Tier::Region,
    Tier::City,
    Tier::Site,
    Tier::Building,
];

impl Tier {
    pub fn rank(self) -> usize {
        TIER_ORDER.iter().position(|t| *t == self).unwrap_or(TIER_ORDER.len())
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "world" => Some(Tier::World),
            "continent" => Some(Tier::Continent),
            "kingdom" => Some(Tier::Kingdom),
            "region" => Some(Tier::Region),
            "city" => Some(Tier::City),
            "site" => Some(Tier::Site),
            "building" => Some(Tier::Building),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::World => "world",
            Tier::Continent => "continent",
            Tier::Kingdom => "kingdom",
            Tier::Region => "region",
            Tier::City => "city",
            Tier::Site => "site",
            Tier::Building => "building",
        }
    }
}

/// Rank of a location-name suffix: lower rank means "bigger" administrative
/// unit. Used to decide parent/child direction when two names both carry a
/// recognized suffix but neither side's tier has been fixed yet.
const SUFFIX_RANKS: &[(&str, u8)] = &[
    ("国", 1),
    ("洲", 1),
    ("域", 1),
    ("省", 2),
    ("府", 3),
    ("州", 3),
    ("郡", 3),
    ("路", 3),
    ("京", 3),
    ("县", 4),
    ("镇", 5),
    ("村", 6),
    ("寨", 6),
];

/// Returns the rank of the longest matching suffix in `name`, if any.
pub fn suffix_rank(name: &str) -> Option<u8> {
    SUFFIX_RANKS
        .iter()
        .filter(|(suffix, _)| name.ends_with(suffix))
        .max_by_key(|(suffix, _)| suffix.chars().count())
        .map(|(_, rank)| *rank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_rank_orders_world_before_building() {
        assert!(Tier::World.rank() < Tier::Building.rank());
        assert!(Tier::Kingdom.rank() < Tier::City.rank());
    }

    #[test]
    fn suffix_rank_prefers_kingdom_over_county() {
        assert_eq!(suffix_rank("大宋国"), Some(1));
        assert_eq!(suffix_rank("清河县"), Some(4));
        assert_eq!(suffix_rank("无名村"), Some(6));
        assert_eq!(suffix_rank("无名"), None);
    }
}
