//! Coordinate Reference System handling
//!
//! streamnet does not reproject. It only needs to know the linear unit of a
//! CRS so that lengths given in meters can be converted to the CRS's base
//! units (and back). That conversion is exposed through [`UnitService`];
//! [`LinearUnits`] is the default implementation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Meters per degree of arc on the WGS84 equator.
const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (primary)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }

    /// The linear unit of the CRS axes, when it can be determined.
    ///
    /// PROJ strings are checked first, then WKT (the last `UNIT[...]` wins,
    /// which is the projected unit for WKT1 `PROJCS` definitions), then a
    /// small table of EPSG codes.
    pub fn linear_unit(&self) -> Option<LinearUnit> {
        if let Some(proj) = &self.proj {
            if let Some(unit) = unit_from_proj(proj) {
                return Some(unit);
            }
        }
        if let Some(wkt) = &self.wkt {
            if let Some(unit) = unit_from_wkt(wkt) {
                return Some(unit);
            }
        }
        self.epsg.and_then(unit_from_epsg)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Linear unit of a CRS axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LinearUnit {
    Metre,
    Foot,
    UsSurveyFoot,
    Degree,
}

impl LinearUnit {
    /// Meters per unit. For degrees this is the length of one degree of
    /// longitude at `latitude`.
    pub fn meters_per_unit(&self, latitude: f64) -> f64 {
        match self {
            LinearUnit::Metre => 1.0,
            LinearUnit::Foot => 0.3048,
            LinearUnit::UsSurveyFoot => 1200.0 / 3937.0,
            LinearUnit::Degree => METERS_PER_DEGREE * latitude.to_radians().cos(),
        }
    }
}

fn unit_from_proj(proj: &str) -> Option<LinearUnit> {
    for token in proj.split_whitespace() {
        match token {
            "+units=m" => return Some(LinearUnit::Metre),
            "+units=ft" => return Some(LinearUnit::Foot),
            "+units=us-ft" => return Some(LinearUnit::UsSurveyFoot),
            "+proj=longlat" | "+proj=latlong" => return Some(LinearUnit::Degree),
            _ => {}
        }
    }
    None
}

fn unit_from_wkt(wkt: &str) -> Option<LinearUnit> {
    let upper = wkt.to_ascii_uppercase();
    let start = upper.rfind("UNIT[")?;
    let name = upper[start + 5..].trim_start_matches('"');
    let name = name.split('"').next()?.to_ascii_lowercase();

    if name.contains("survey") {
        Some(LinearUnit::UsSurveyFoot)
    } else if name.contains("foot") || name.contains("feet") {
        Some(LinearUnit::Foot)
    } else if name.contains("metre") || name.contains("meter") {
        Some(LinearUnit::Metre)
    } else if name.contains("degree") {
        Some(LinearUnit::Degree)
    } else {
        None
    }
}

fn unit_from_epsg(code: u32) -> Option<LinearUnit> {
    match code {
        4326 | 4269 | 4258 | 4283 => Some(LinearUnit::Degree),
        3857 | 3310 | 5070 => Some(LinearUnit::Metre),
        26901..=26923 | 32601..=32660 | 32701..=32760 => Some(LinearUnit::Metre),
        2225..=2247 => Some(LinearUnit::UsSurveyFoot),
        _ => None,
    }
}

/// Converts real-world lengths into a CRS's base units.
///
/// This is the seam through which the stream-segment engine consumes
/// projection knowledge. Implementations may wrap a full projection library;
/// the engine only ever asks for a scalar factor.
pub trait UnitService {
    /// CRS base units per meter near the y-coordinate `y` (in CRS units).
    fn base_per_meter(&self, crs: &CRS, y: f64) -> Result<f64>;

    /// Convert a length in meters to CRS base units
    fn meters_to_base(&self, crs: &CRS, y: f64, meters: f64) -> Result<f64> {
        Ok(meters * self.base_per_meter(crs, y)?)
    }
}

/// Default [`UnitService`] driven by [`CRS::linear_unit`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearUnits;

impl UnitService for LinearUnits {
    fn base_per_meter(&self, crs: &CRS, y: f64) -> Result<f64> {
        let unit = crs
            .linear_unit()
            .ok_or_else(|| Error::UnsupportedUnit(crs.identifier()))?;
        let meters = unit.meters_per_unit(y);
        if !(meters.is_finite() && meters > 0.0) {
            return Err(Error::UnsupportedUnit(format!(
                "{} at y = {}",
                crs.identifier(),
                y
            )));
        }
        Ok(1.0 / meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert_eq!(crs.linear_unit(), Some(LinearUnit::Degree));
    }

    #[test]
    fn test_unit_from_wkt_uses_projected_unit() {
        let wkt = r#"PROJCS["NAD83 / California zone 5 (ftUS)",GEOGCS["NAD83",UNIT["degree",0.0174532925199433]],UNIT["US survey foot",0.304800609601219]]"#;
        assert_eq!(CRS::from_wkt(wkt).linear_unit(), Some(LinearUnit::UsSurveyFoot));
    }

    #[test]
    fn test_unit_from_proj() {
        let crs = CRS::from_proj("+proj=utm +zone=11 +datum=WGS84 +units=m +no_defs");
        assert_eq!(crs.linear_unit(), Some(LinearUnit::Metre));
    }

    #[test]
    fn test_meters_to_base() {
        let utm = CRS::from_epsg(32611);
        assert_relative_eq!(LinearUnits.meters_to_base(&utm, 0.0, 10.0).unwrap(), 10.0);

        let feet = CRS::from_proj("+proj=tmerc +units=ft");
        assert_relative_eq!(
            LinearUnits.meters_to_base(&feet, 0.0, 0.3048).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_unknown_unit_is_error() {
        let crs = CRS::from_epsg(99999);
        assert!(matches!(
            LinearUnits.base_per_meter(&crs, 0.0),
            Err(Error::UnsupportedUnit(_))
        ));
    }
}
