//! Tissue taxonomy
//!
//! The closed set of classes the classifier may emit, plus the composite
//! sub-regions reported clinically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tissue class, keyed by the integer id stored in label volumes.
///
/// Declaration order is the reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TissueClass {
    Background,
    NecroticCore,
    PeritumoralEdema,
    EnhancingTissue,
}

impl TissueClass {
    /// All classes in taxonomy order
    pub const ALL: [TissueClass; 4] = [
        TissueClass::Background,
        TissueClass::NecroticCore,
        TissueClass::PeritumoralEdema,
        TissueClass::EnhancingTissue,
    ];

    /// Number of classes, i.e. expected classifier output channels
    pub const COUNT: usize = Self::ALL.len();

    /// Non-background classes in taxonomy order
    pub fn foreground() -> impl Iterator<Item = TissueClass> {
        Self::ALL.into_iter().filter(|c| !c.is_background())
    }

    /// Look up a class by label id
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Label id written into the mask
    pub fn id(self) -> u8 {
        match self {
            Self::Background => 0,
            Self::NecroticCore => 1,
            Self::PeritumoralEdema => 2,
            Self::EnhancingTissue => 3,
        }
    }

    pub fn is_background(self) -> bool {
        matches!(self, Self::Background)
    }

    /// Machine-readable name, as used in configuration keys and serde
    pub fn key(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::NecroticCore => "necrotic_core",
            Self::PeritumoralEdema => "peritumoral_edema",
            Self::EnhancingTissue => "enhancing_tissue",
        }
    }

    /// Human-readable name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::NecroticCore => "necrotic core",
            Self::PeritumoralEdema => "peritumoral edema",
            Self::EnhancingTissue => "enhancing tissue",
        }
    }
}

impl fmt::Display for TissueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Clinically reported composite region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubRegion {
    /// Every tumour class including edema
    WholeTumor,
    /// Necrotic core + enhancing tissue
    TumorCore,
    /// Enhancing tissue only
    EnhancingTumor,
}

impl SubRegion {
    pub const ALL: [SubRegion; 3] = [
        SubRegion::WholeTumor,
        SubRegion::TumorCore,
        SubRegion::EnhancingTumor,
    ];

    /// Classes that make up the region
    pub fn members(self) -> &'static [TissueClass] {
        match self {
            Self::WholeTumor => &[
                TissueClass::NecroticCore,
                TissueClass::PeritumoralEdema,
                TissueClass::EnhancingTissue,
            ],
            Self::TumorCore => &[TissueClass::NecroticCore, TissueClass::EnhancingTissue],
            Self::EnhancingTumor => &[TissueClass::EnhancingTissue],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::WholeTumor => "whole tumor",
            Self::TumorCore => "tumor core",
            Self::EnhancingTumor => "enhancing tumor",
        }
    }
}

impl fmt::Display for SubRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip_through_lookup() {
        for class in TissueClass::ALL {
            assert_eq!(TissueClass::from_id(class.id() as usize), Some(class));
        }
        assert_eq!(TissueClass::from_id(TissueClass::COUNT), None);
    }

    #[test]
    fn test_foreground_order() {
        let fg: Vec<_> = TissueClass::foreground().collect();
        assert_eq!(
            fg,
            vec![
                TissueClass::NecroticCore,
                TissueClass::PeritumoralEdema,
                TissueClass::EnhancingTissue
            ]
        );
    }

    #[test]
    fn test_regions_exclude_background() {
        for region in SubRegion::ALL {
            assert!(region.members().iter().all(|c| !c.is_background()));
        }
    }
}
