//! Edge records: raw attribute rows normalized into calculation inputs
//!
//! Height and slope fall back to the most common values in the network when the
//! stored value is missing or out of range. These fallbacks are statistical, not
//! physical, and the thresholds must stay exactly as written.

use serde::Serialize;

use super::manning::{compute_flow, FlowEstimate};
use super::material::{CoefficientClassifier, Roughness};
use crate::types::{FeatureCategory, FeatureId};

pub const DEFAULT_SLOPE_FRACTION: f64 = 0.03;
pub const DEFAULT_HEIGHT_INCHES: f64 = 24.0;
/// Heights at or above this are placeholder values ("999")
pub const MAX_HEIGHT_INCHES: f64 = 999.0;

/// Slope normalization: missing, non-finite or `<= 0` becomes 0.03
pub fn normalize_slope(slope: Option<f64>) -> f64 {
    match slope {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => DEFAULT_SLOPE_FRACTION,
    }
}

/// Height normalization: missing, non-finite, `<= 0` or `>= 999` becomes 24.0
pub fn normalize_height(height: Option<f64>) -> f64 {
    match height {
        Some(h) if h.is_finite() && h > 0.0 && h < MAX_HEIGHT_INCHES => h,
        _ => DEFAULT_HEIGHT_INCHES,
    }
}

/// Row as read from a conveyance table, before any correction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEdgeRow {
    pub identifier: FeatureId,
    pub material: Option<i64>,
    pub height: Option<f64>,
    pub slope: Option<f64>,
    pub length: Option<f64>,
    /// Only read for open channels; `"Y"` marks an earthen bottom
    pub soft_bottom: Option<String>,
}

/// A conduit edge with normalized inputs
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub category: FeatureCategory,
    pub identifier: FeatureId,
    pub material_code: Option<i64>,
    pub height_inches: f64,
    pub slope_fraction: f64,
    /// Stored length, checked when the edge is calculated
    pub length_feet: Option<f64>,
}

/// An open channel edge, which additionally knows whether its bottom is earthen
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEdge {
    pub edge: Edge,
    pub soft_bottom: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConveyanceEdge {
    Conduit(Edge),
    Channel(ChannelEdge),
}

impl ConveyanceEdge {
    /// Build the edge variant for `category`, applying default substitution
    pub fn from_row(category: FeatureCategory, row: RawEdgeRow) -> Self {
        let edge = Edge {
            category,
            identifier: row.identifier,
            material_code: row.material,
            height_inches: normalize_height(row.height),
            slope_fraction: normalize_slope(row.slope),
            length_feet: row.length,
        };

        if category.has_soft_bottom() {
            let soft_bottom = row
                .soft_bottom
                .as_deref()
                .map(|v| v.trim().eq_ignore_ascii_case("Y"))
                .unwrap_or(false);
            ConveyanceEdge::Channel(ChannelEdge { edge, soft_bottom })
        } else {
            ConveyanceEdge::Conduit(edge)
        }
    }

    pub fn edge(&self) -> &Edge {
        match self {
            ConveyanceEdge::Conduit(edge) => edge,
            ConveyanceEdge::Channel(channel) => &channel.edge,
        }
    }

    pub fn soft_bottom(&self) -> bool {
        match self {
            ConveyanceEdge::Conduit(_) => false,
            ConveyanceEdge::Channel(channel) => channel.soft_bottom,
        }
    }

    /// Classify the material and, if usable, compute velocity and travel time
    ///
    /// Returns the diagnostic to report when the edge has to be zeroed instead.
    pub fn calculate(
        &self,
        classifier: &CoefficientClassifier,
    ) -> Result<(FlowEstimate, Roughness), Diagnostic> {
        let edge = self.edge();

        let roughness = classifier
            .classify(edge.material_code, self.soft_bottom())
            .map_err(|_| {
                Diagnostic::new(
                    edge,
                    "material",
                    edge.material_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "None".to_string()),
                )
            })?;

        let length_feet = match edge.length_feet {
            Some(length) if length.is_finite() && length >= 0.0 => length,
            other => {
                return Err(Diagnostic::new(
                    edge,
                    "length",
                    other.map(|l| l.to_string()).unwrap_or_else(|| "None".to_string()),
                ))
            }
        };

        let flow = compute_flow(
            edge.height_inches,
            edge.slope_fraction,
            length_feet,
            roughness.coefficient,
        )
        .map_err(|_| Diagnostic::new(edge, "coefficient", roughness.coefficient.to_string()))?;

        Ok((flow, roughness))
    }
}

/// Human-readable report about an edge whose outputs were zeroed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub category: FeatureCategory,
    pub identifier: FeatureId,
    pub field: &'static str,
    pub value: String,
}

impl Diagnostic {
    pub fn new(edge: &Edge, field: &'static str, value: String) -> Self {
        Self {
            category: edge.category,
            identifier: edge.identifier,
            field,
            value,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Path: {} Objectid-{} has an invalid {} value of {}.",
            self.category, self.identifier, self.field, self.value
        )
    }
}
