//! Coordinate reference systems
//!
//! GeoTIFFs identify their CRS by EPSG code in the GeoKey directory; WKT
//! only appears for systems without a code. Reprojection needs a PROJ
//! definition, which is looked up from the bundled EPSG database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_EPSG: u32 = 4326;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CRS {
    Epsg(u32),
    /// A system known only by its WKT text
    Wkt(String),
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    pub fn wgs84() -> Self {
        CRS::Epsg(WGS84_EPSG)
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Wkt(_) => None,
        }
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg() == Some(WGS84_EPSG)
    }

    /// PROJ definition from the EPSG database, if the code is known.
    pub fn proj_definition(&self) -> Option<String> {
        let code = u16::try_from(self.epsg()?).ok()?;
        crs_definitions::from_code(code).map(|def| def.proj4.to_string())
    }

    /// Whether coordinates are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        match self.proj_definition() {
            Some(def) => def.contains("+proj=longlat") || def.contains("+proj=latlong"),
            // 4xxx codes are geographic 2D systems
            None => matches!(self.epsg(), Some(code) if (4000..5000).contains(&code)),
        }
    }

    /// Short identifier: `EPSG:<code>`, or the start of the WKT.
    pub fn identifier(&self) -> String {
        match self {
            CRS::Epsg(code) => format!("EPSG:{}", code),
            CRS::Wkt(wkt) => format!("WKT:{}", wkt.chars().take(50).collect::<String>()),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}
