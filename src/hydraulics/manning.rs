//! Manning's equation for full-pipe velocity and travel time
//!
//! ```text
//! V = (1.486 / n) * R^0.667 * S^0.5
//! ```
//!
//! The hydraulic radius `R` is approximated as `height / 4`, with height converted
//! from inches to feet. US customary units throughout.

use serde::Serialize;

/// Unit conversion constant of Manning's equation in US customary units
pub const MANNING_UNITS_CONSTANT: f64 = 1.486;
pub const HYDRAULIC_RADIUS_EXPONENT: f64 = 0.667;
const INCHES_PER_FOOT: f64 = 12.0;
/// Full circular pipe: R = D / 4
const RADIUS_DIVISOR: f64 = 4.0;

/// Velocity and travel time of one edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowEstimate {
    pub velocity_fps: f64,
    pub travel_time_secs: f64,
}

impl FlowEstimate {
    /// Written in place of a result for edges that cannot be calculated
    pub fn zeroed() -> Self {
        Self {
            velocity_fps: 0.0,
            travel_time_secs: 0.0,
        }
    }

    pub fn is_zeroed(&self) -> bool {
        self.velocity_fps == 0.0 && self.travel_time_secs == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HydraulicError {
    NonPositiveCoefficient(f64),
}

impl std::fmt::Display for HydraulicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HydraulicError::NonPositiveCoefficient(n) => {
                write!(f, "roughness coefficient must be positive, got {}", n)
            }
        }
    }
}

impl std::error::Error for HydraulicError {}

/// Compute velocity (ft/s) and travel time (s)
///
/// Inputs must already be normalized (see `edge::normalize_height` and
/// `edge::normalize_slope`). Invalid materials are expected to be routed away by the
/// caller; a non-positive coefficient is still refused here.
pub fn compute_flow(
    height_inches: f64,
    slope_fraction: f64,
    length_feet: f64,
    coefficient: f64,
) -> Result<FlowEstimate, HydraulicError> {
    if coefficient.is_nan() || coefficient <= 0.0 {
        return Err(HydraulicError::NonPositiveCoefficient(coefficient));
    }

    let hydraulic_radius_ft = height_inches / INCHES_PER_FOOT / RADIUS_DIVISOR;
    let velocity_fps = (MANNING_UNITS_CONSTANT / coefficient)
        * hydraulic_radius_ft.powf(HYDRAULIC_RADIUS_EXPONENT)
        * slope_fraction.sqrt();

    Ok(FlowEstimate {
        velocity_fps,
        travel_time_secs: length_feet / velocity_fps,
    })
}
