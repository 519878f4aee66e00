//! Terrain tags and the directions each terrain offers for expansion.
//!
//! The terrain → default-directions table and the realm-name inference
//! table are data-driven (§9 "Re-architecture hints": keep it data-driven)
//! rather than hard-coded match arms scattered across the handler.

use crate::direction::Direction;

/// Default travel duration for an exit when the caller doesn't specify one.
pub const DEFAULT_TRAVEL_DURATION_MS: u64 = 60_000;

/// Upper bound on `batchLocations` / `batchSize` for a single BatchGenerate run.
pub const MAX_BUDGET_LOCATIONS: u32 = 50;

/// A terrain tag. Not a closed enum in the data model (§3: "terrain
/// (optional, enumerated tag)") — new terrain names can be introduced by
/// seed data without a code change, but the handful this crate knows about
/// carry a `defaultDirections` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terrain {
    pub name: String,
    pub default_directions: Vec<Direction>,
}

impl Terrain {
    pub fn new(name: impl Into<String>, default_directions: Vec<Direction>) -> Self {
        Self {
            name: name.into(),
            default_directions,
        }
    }

    /// Look up a terrain by name, falling back to the four cardinals for
    /// any terrain not in the table (§4.4.1: "fallback: four cardinals").
    pub fn lookup(name: &str) -> Terrain {
        known_terrains()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .unwrap_or_else(|| Terrain::new(name, Direction::CARDINALS.to_vec()))
    }
}

/// The built-in terrain table, computed once per process.
fn known_terrains() -> &'static [Terrain] {
    static TABLE: std::sync::OnceLock<Vec<Terrain>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        use Direction::*;
        vec![
            Terrain::new("open-plain", vec![North, East, South, West]),
            Terrain::new("dense-forest", vec![North, East, South, West]),
            Terrain::new(
                "hilltop",
                vec![North, Northeast, East, Southeast, South, Southwest, West, Northwest],
            ),
            Terrain::new("narrow-corridor", vec![North, South]),
            Terrain::new("fallback", vec![North, East, South, West]),
        ]
    })
}

/// Maps a substring found in a realm name to a terrain name, used by the
/// area-generation orchestrator's `auto` terrain inference (§4.3). Order
/// matters: first match wins.
pub const REALM_NAME_INFERENCE: &[(&str, &str)] = &[("forest", "dense-forest"), ("hill", "hilltop")];

/// Infer a terrain name from a set of realm names the anchor sits `within`.
/// Falls back to `"fallback"` when nothing matches (§4.3: "other → fallback").
pub fn infer_terrain_from_realms<'a>(realm_names: impl IntoIterator<Item = &'a str>) -> String {
    for realm_name in realm_names {
        let lower = realm_name.to_lowercase();
        for (needle, terrain) in REALM_NAME_INFERENCE {
            if lower.contains(needle) {
                return (*terrain).to_string();
            }
        }
    }
    "fallback".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_terrain_falls_back_to_cardinals() {
        let t = Terrain::lookup("swamp-of-sadness");
        assert_eq!(t.default_directions, Direction::CARDINALS.to_vec());
    }

    #[test]
    fn known_terrain_has_its_table() {
        let t = Terrain::lookup("narrow-corridor");
        assert_eq!(t.default_directions, vec![Direction::North, Direction::South]);
    }

    #[test]
    fn realm_inference_matches_forest() {
        assert_eq!(infer_terrain_from_realms(["Whispering Forest"]), "dense-forest");
    }

    #[test]
    fn realm_inference_matches_hill() {
        assert_eq!(infer_terrain_from_realms(["Hillcrest Reach"]), "hilltop");
    }

    #[test]
    fn realm_inference_falls_back() {
        assert_eq!(infer_terrain_from_realms(["Sunken Harbor"]), "fallback");
    }
}
