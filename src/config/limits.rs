//! Floors and ceilings applied to user-requested capture values.

use serde::{Deserialize, Serialize};

/// Hard lower bounds from the `limits` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Smallest width a client may request.
    pub min_width: u32,
    /// Smallest height a client may request.
    pub min_height: u32,
    /// Lowest JPEG quality a client may request.
    pub min_quality: u8,
}

/// Raises `requested` to `floor`, then caps it at `ceiling`.
///
/// A missing request counts as zero. A zero ceiling means "unknown" and
/// does not cap. The ceiling wins over the floor.
pub fn constrain(floor: u32, requested: Option<u32>, ceiling: Option<u32>) -> u32 {
    let value = requested.unwrap_or(0).max(floor);
    match ceiling {
        Some(limit) if limit > 0 => value.min(limit),
        _ => value,
    }
}

/// Parses a query/form value; anything unparseable counts as absent.
pub fn parse_requested(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse().ok())
}

impl Limits {
    /// Constrains a width against the floor and the sensor width.
    pub fn constrain_width(&self, requested: Option<u32>, sensor_width: Option<u32>) -> u32 {
        constrain(self.min_width, requested, sensor_width)
    }

    /// Constrains a height against the floor and the sensor height.
    pub fn constrain_height(&self, requested: Option<u32>, sensor_height: Option<u32>) -> u32 {
        constrain(self.min_height, requested, sensor_height)
    }

    /// Constrains a JPEG quality into `min_quality..=100`.
    pub fn constrain_quality(&self, requested: Option<u32>) -> u8 {
        constrain(u32::from(self.min_quality), requested, Some(100)) as u8
    }
}
