//! Fixed-point coordinates

use crate::core::error::Result;
use crate::core::item::{read_i32, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinates are stored as integers in units of 1e-7 degrees
pub const COORDINATE_PRECISION: i32 = 10_000_000;

/// A longitude/latitude pair in fixed-point representation
///
/// The undefined location (`i32::MAX`, `i32::MAX`) marks "no coordinate" in
/// records and is the "unset" sentinel of location indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    x: i32,
    y: i32,
}

impl Location {
    /// Convert degrees to fixed point, rounding to the nearest unit
    pub fn new(lon: f64, lat: f64) -> Self {
        Location {
            x: to_fixed(lon),
            y: to_fixed(lat),
        }
    }

    pub const fn from_raw(x: i32, y: i32) -> Self {
        Location { x, y }
    }

    pub const fn undefined() -> Self {
        Location {
            x: i32::MAX,
            y: i32::MAX,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.x != i32::MAX || self.y != i32::MAX
    }

    /// Defined and within -180..=180 / -90..=90 degrees
    pub fn is_valid(&self) -> bool {
        self.is_defined()
            && (-180 * COORDINATE_PRECISION..=180 * COORDINATE_PRECISION).contains(&self.x)
            && (-90 * COORDINATE_PRECISION..=90 * COORDINATE_PRECISION).contains(&self.y)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn lon(&self) -> Option<f64> {
        self.is_defined()
            .then(|| self.x as f64 / COORDINATE_PRECISION as f64)
    }

    pub fn lat(&self) -> Option<f64> {
        self.is_defined()
            .then(|| self.y as f64 / COORDINATE_PRECISION as f64)
    }
}

fn to_fixed(degrees: f64) -> i32 {
    (degrees * COORDINATE_PRECISION as f64).round() as i32
}

impl Default for Location {
    fn default() -> Self {
        Location::undefined()
    }
}

impl Record for Location {
    const SIZE: usize = 8;

    fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        Ok(Location {
            x: read_i32(bytes, 0)?,
            y: read_i32(bytes, 4)?,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lon(), self.lat()) {
            (Some(lon), Some(lat)) => write!(f, "({:.7},{:.7})", lon, lat),
            _ => write!(f, "(undefined,undefined)"),
        }
    }
}
