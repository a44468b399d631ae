//! Material code classification into Manning roughness coefficients
//!
//! Material codes come from the storm drain attribute domain. The table groups them
//! into coefficient bands; a handful of codes mark "no value entered" and are never
//! classified.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigError;

/// Concrete (RCP, RCB, RCA), steel, unreinforced concrete, asbestos cement, brick, CIPP, RCC
pub const SMOOTH_RIGID_COEFFICIENT: f64 = 0.012;
/// CMP and cast iron
pub const CORRUGATED_COEFFICIENT: f64 = 0.022;
/// PVC, ABS, polyethylene liner, truss pipe. Low end of the 0.009-0.011 range,
/// giving the highest velocity.
pub const PLASTIC_COEFFICIENT: f64 = 0.009;
pub const EARTHEN_COEFFICIENT: f64 = 0.025;
pub const CLAY_COEFFICIENT: f64 = 0.01;
/// Corrugated HDPE. Low end of the 0.018-0.025 range.
pub const HDPE_COEFFICIENT: f64 = 0.018;
/// Earthen channel bottoms dominate the roughness of the whole section
pub const SOFT_BOTTOM_COEFFICIENT: f64 = 0.025;

/// Coefficient band a material code resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialBand {
    SmoothRigid,
    Corrugated,
    Plastic,
    Earthen,
    Clay,
    Hdpe,
    SoftBottom,
}

impl MaterialBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialBand::SmoothRigid => "smooth-rigid",
            MaterialBand::Corrugated => "corrugated",
            MaterialBand::Plastic => "plastic",
            MaterialBand::Earthen => "earthen",
            MaterialBand::Clay => "clay",
            MaterialBand::Hdpe => "hdpe",
            MaterialBand::SoftBottom => "soft-bottom",
        }
    }
}

/// Static material code table
///
/// Loaded once at startup and shared read-only (`Arc<MaterialTable>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable {
    pub smooth_rigid: BTreeSet<i64>,
    pub corrugated: BTreeSet<i64>,
    pub plastic: BTreeSet<i64>,
    pub earthen: BTreeSet<i64>,
    pub clay: i64,
    pub hdpe: i64,
    /// Codes that mean "unknown" or "not entered". A missing code is always invalid.
    pub invalid: BTreeSet<i64>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self {
            smooth_rigid: [1, 3, 5, 9, 12, 14, 15, 20, 21, 23].into_iter().collect(),
            corrugated: [4, 6, 8].into_iter().collect(),
            plastic: [2, 10, 11, 16, 24].into_iter().collect(),
            earthen: [7, 19].into_iter().collect(),
            clay: 13,
            hdpe: 22,
            invalid: [0, 98, 99].into_iter().collect(),
        }
    }
}

impl MaterialTable {
    /// Load a table from a JSON file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "Failed to read material table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table: MaterialTable = serde_json::from_str(&json).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "Malformed material table {}: {}",
                path.display(),
                e
            ))
        })?;
        table.validate()?;

        log::info!("📋 Loaded material table from {}", path.display());
        Ok(table)
    }

    /// Reject tables where a code belongs to more than one group
    pub fn validate(&self) -> Result<(), ConfigError> {
        let groups: [(&str, Vec<i64>); 7] = [
            ("smooth_rigid", self.smooth_rigid.iter().copied().collect()),
            ("corrugated", self.corrugated.iter().copied().collect()),
            ("plastic", self.plastic.iter().copied().collect()),
            ("earthen", self.earthen.iter().copied().collect()),
            ("clay", vec![self.clay]),
            ("hdpe", vec![self.hdpe]),
            ("invalid", self.invalid.iter().copied().collect()),
        ];

        let mut seen: Vec<(i64, &str)> = Vec::new();
        for (name, codes) in &groups {
            for code in codes {
                if let Some((_, other)) = seen.iter().find(|(c, _)| c == code) {
                    return Err(ConfigError::InvalidValue(format!(
                        "material code {} appears in both {} and {}",
                        code, other, name
                    )));
                }
                seen.push((*code, name));
            }
        }

        Ok(())
    }

    /// Band lookup by exact membership, without the soft-bottom override
    fn band_of(&self, code: i64) -> Option<MaterialBand> {
        if self.smooth_rigid.contains(&code) {
            Some(MaterialBand::SmoothRigid)
        } else if self.corrugated.contains(&code) {
            Some(MaterialBand::Corrugated)
        } else if self.plastic.contains(&code) {
            Some(MaterialBand::Plastic)
        } else if self.earthen.contains(&code) {
            Some(MaterialBand::Earthen)
        } else if code == self.clay {
            Some(MaterialBand::Clay)
        } else if code == self.hdpe {
            Some(MaterialBand::Hdpe)
        } else {
            None
        }
    }
}

/// A usable roughness coefficient and where it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roughness {
    pub coefficient: f64,
    pub band: MaterialBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No material entered
    Missing,
    /// Code is listed as unknown/invalid
    Flagged,
    /// Code is in no band and not listed as invalid
    Unrecognized,
}

/// Material code that cannot produce a coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMaterial {
    pub code: Option<i64>,
    pub reason: InvalidReason,
}

impl std::fmt::Display for InvalidMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.reason) {
            (None, _) => write!(f, "no material value"),
            (Some(code), InvalidReason::Flagged) => write!(f, "material {} is flagged invalid", code),
            (Some(code), _) => write!(f, "material {} matches no roughness band", code),
        }
    }
}

impl std::error::Error for InvalidMaterial {}

/// Maps material codes to roughness coefficients
#[derive(Debug, Clone)]
pub struct CoefficientClassifier {
    table: Arc<MaterialTable>,
}

impl CoefficientClassifier {
    pub fn new(table: Arc<MaterialTable>) -> Self {
        Self { table }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(MaterialTable::default()))
    }

    pub fn table(&self) -> &MaterialTable {
        &self.table
    }

    /// Classify a material code
    ///
    /// # Priority
    /// 1. Missing or flagged codes are invalid, soft bottom or not.
    /// 2. Band membership gives the coefficient.
    /// 3. A soft bottom overrides the band with 0.025.
    /// 4. Codes in no band are invalid unless the soft-bottom override applies.
    pub fn classify(
        &self,
        material_code: Option<i64>,
        soft_bottom: bool,
    ) -> Result<Roughness, InvalidMaterial> {
        let code = match material_code {
            None => {
                return Err(InvalidMaterial {
                    code: None,
                    reason: InvalidReason::Missing,
                })
            }
            Some(code) => code,
        };

        if self.table.invalid.contains(&code) {
            return Err(InvalidMaterial {
                code: Some(code),
                reason: InvalidReason::Flagged,
            });
        }

        if soft_bottom {
            return Ok(Roughness {
                coefficient: SOFT_BOTTOM_COEFFICIENT,
                band: MaterialBand::SoftBottom,
            });
        }

        let band = self.table.band_of(code).ok_or(InvalidMaterial {
            code: Some(code),
            reason: InvalidReason::Unrecognized,
        })?;

        Ok(Roughness {
            coefficient: coefficient_for(band),
            band,
        })
    }
}

pub fn coefficient_for(band: MaterialBand) -> f64 {
    match band {
        MaterialBand::SmoothRigid => SMOOTH_RIGID_COEFFICIENT,
        MaterialBand::Corrugated => CORRUGATED_COEFFICIENT,
        MaterialBand::Plastic => PLASTIC_COEFFICIENT,
        MaterialBand::Earthen => EARTHEN_COEFFICIENT,
        MaterialBand::Clay => CLAY_COEFFICIENT,
        MaterialBand::Hdpe => HDPE_COEFFICIENT,
        MaterialBand::SoftBottom => SOFT_BOTTOM_COEFFICIENT,
    }
}
