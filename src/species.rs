/*
 * Species Module
 *
 * Every boid belongs to one of a small closed set of species. A species decides
 * which parameter bundle the boid reads each tick and how fast it flies.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

// Serialized as its short tag; any tag is accepted on the way in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Species {
    // First species, also the fallback for unknown tags
    #[default]
    DarkBlue,
    Yellow,
    White,
}

impl Species {
    pub const ALL: [Species; 3] = [Species::DarkBlue, Species::Yellow, Species::White];

    // Resolve a short or long species tag. Unknown tags fall back to DarkBlue.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "y" | "yellow" => Species::Yellow,
            "w" | "white" => Species::White,
            "db" | "darkblue" | "dark_blue" | "dark blue" => Species::DarkBlue,
            _ => Species::default(),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Species::DarkBlue => "DB",
            Species::Yellow => "Y",
            Species::White => "W",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Species::DarkBlue => "Dark Blue",
            Species::Yellow => "Yellow",
            Species::White => "White",
        }
    }

    // Multiplier applied to the integration step
    pub fn speed_multiplier(self) -> f32 {
        match self {
            Species::Yellow => 1.25,
            Species::White => 0.5,
            Species::DarkBlue => 0.75,
        }
    }

    // Species assignment by index bucket: first quarter yellow, second quarter white, rest dark blue
    pub fn for_slot(index: usize, count: usize) -> Self {
        if index < count / 4 {
            Species::Yellow
        } else if index < count / 2 {
            Species::White
        } else {
            Species::DarkBlue
        }
    }

    // Position in `ALL`, used to index per-species parameter tables
    pub fn ordinal(self) -> usize {
        match self {
            Species::DarkBlue => 0,
            Species::Yellow => 1,
            Species::White => 2,
        }
    }

    // RGB used by the viewer
    pub fn color(self) -> [u8; 3] {
        match self {
            Species::DarkBlue => [20, 60, 180],
            Species::Yellow => [245, 181, 5],
            Species::White => [255, 255, 255],
        }
    }
}

impl From<String> for Species {
    fn from(tag: String) -> Self {
        Species::from_tag(&tag)
    }
}

impl From<Species> for &'static str {
    fn from(species: Species) -> Self {
        species.tag()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
