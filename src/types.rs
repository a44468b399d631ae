//! Core domain types shared by the velocity and trace workflows

use serde::{Deserialize, Serialize};

/// Stable identifier of a feature row (the store's OBJECTID)
pub type FeatureId = i64;

/// Linear conveyance feature classes that carry a calculated travel time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureCategory {
    GravityMain,
    LateralLine,
    OpenChannel,
    Culvert,
}

impl FeatureCategory {
    /// Table name of the category in the feature store
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureCategory::GravityMain => "GravityMain",
            FeatureCategory::LateralLine => "LateralLine",
            FeatureCategory::OpenChannel => "OpenChannel",
            FeatureCategory::Culvert => "Culvert",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GravityMain" => Some(FeatureCategory::GravityMain),
            "LateralLine" => Some(FeatureCategory::LateralLine),
            "OpenChannel" => Some(FeatureCategory::OpenChannel),
            "Culvert" => Some(FeatureCategory::Culvert),
            _ => None,
        }
    }

    /// Processing order used by both workflows
    pub fn all() -> [FeatureCategory; 4] {
        [
            FeatureCategory::GravityMain,
            FeatureCategory::LateralLine,
            FeatureCategory::OpenChannel,
            FeatureCategory::Culvert,
        ]
    }

    /// Only open channels record whether the bottom is earthen
    pub fn has_soft_bottom(&self) -> bool {
        matches!(self, FeatureCategory::OpenChannel)
    }
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flag feature used as the origin of a downstream trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePoint {
    pub identifier: FeatureId,
    /// Total downstream flow time, filled in after aggregation
    pub total_flow_time_secs: Option<f64>,
}

impl SourcePoint {
    pub fn new(identifier: FeatureId) -> Self {
        Self {
            identifier,
            total_flow_time_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_round_trip() {
        for category in FeatureCategory::all() {
            assert_eq!(FeatureCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(FeatureCategory::from_str("PseudoLine"), None);
    }

    #[test]
    fn test_only_open_channel_has_soft_bottom() {
        let with_bottom: Vec<_> = FeatureCategory::all()
            .into_iter()
            .filter(|c| c.has_soft_bottom())
            .collect();
        assert_eq!(with_bottom, vec![FeatureCategory::OpenChannel]);
    }
}
