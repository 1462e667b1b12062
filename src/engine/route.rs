//! Route - Course profile as a sequence of constant-gradient segments

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Gradients with magnitude below this count as flat road
const FLAT_TOLERANCE: f64 = 0.005;

/// One stretch of road with a constant gradient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    /// Length in meters
    pub length: f64,
    /// Gradient as a decimal (0.05 == 5%)
    pub gradient: f64,
}

impl RouteSegment {
    pub const fn new(length: f64, gradient: f64) -> Self {
        Self { length, gradient }
    }
}

/// Terrain classification of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Flat,
    Climb,
    Descent,
}

impl Terrain {
    pub fn classify(gradient: f64) -> Self {
        if gradient.abs() < FLAT_TOLERANCE {
            Terrain::Flat
        } else if gradient > 0.0 {
            Terrain::Climb
        } else {
            Terrain::Descent
        }
    }
}

impl fmt::Display for Terrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terrain::Flat => write!(f, "flat"),
            Terrain::Climb => write!(f, "climb"),
            Terrain::Descent => write!(f, "descent"),
        }
    }
}

/// Informational row of a route's terrain profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerrainSection {
    pub segment_index: usize,
    pub length_km: f64,
    pub gradient_pct: f64,
    pub terrain: Terrain,
}

/// Immutable course made of contiguous segments covering `[0, total_length]`.
///
/// Deserializes from a plain array of segments and is validated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RouteSegment>", into = "Vec<RouteSegment>")]
pub struct Route {
    segments: Vec<RouteSegment>,
    /// Cumulative end position of each segment
    ends: Vec<f64>,
    total_length: f64,
}

impl Route {
    /// Build a route, rejecting empty courses and non-positive segment lengths.
    pub fn new(segments: Vec<RouteSegment>) -> Result<Self, ConfigError> {
        if segments.is_empty() {
            return Err(ConfigError::EmptyRoute);
        }

        let mut ends = Vec::with_capacity(segments.len());
        let mut total = 0.0;
        for (index, seg) in segments.iter().enumerate() {
            if !seg.length.is_finite() || seg.length <= 0.0 {
                return Err(ConfigError::InvalidSegmentLength {
                    index,
                    length: seg.length,
                });
            }
            if !seg.gradient.is_finite() {
                return Err(ConfigError::InvalidGradient {
                    index,
                    gradient: seg.gradient,
                });
            }
            total += seg.length;
            ends.push(total);
        }

        Ok(Self {
            segments,
            ends,
            total_length: total,
        })
    }

    /// Single flat segment of the given length.
    pub fn flat(length: f64) -> Result<Self, ConfigError> {
        Self::new(vec![RouteSegment::new(length, 0.0)])
    }

    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    /// Gradient of the first segment whose cumulative end is at or past
    /// `position`. Positions past the finish use the last segment.
    pub fn gradient_at(&self, position: f64) -> f64 {
        let index = self.ends.partition_point(|&end| end < position);
        self.segments
            .get(index)
            .or_else(|| self.segments.last())
            .map_or(0.0, |seg| seg.gradient)
    }

    pub fn terrain_profile(&self) -> Vec<TerrainSection> {
        self.segments
            .iter()
            .enumerate()
            .map(|(segment_index, seg)| TerrainSection {
                segment_index,
                length_km: seg.length / 1000.0,
                gradient_pct: seg.gradient * 100.0,
                terrain: Terrain::classify(seg.gradient),
            })
            .collect()
    }

    /// Net elevation change over the whole course (m).
    pub fn elevation_gain(&self) -> f64 {
        self.segments.iter().map(|s| s.length * s.gradient).sum()
    }
}

impl TryFrom<Vec<RouteSegment>> for Route {
    type Error = ConfigError;

    fn try_from(segments: Vec<RouteSegment>) -> Result<Self, Self::Error> {
        Self::new(segments)
    }
}

impl From<Route> for Vec<RouteSegment> {
    fn from(route: Route) -> Self {
        route.segments
    }
}

/// Mixed-terrain 12 km course: flat, climb, false flat down, steep climb, flat finish.
pub fn default_route() -> Route {
    Route {
        segments: vec![
            RouteSegment::new(3000.0, 0.0),
            RouteSegment::new(2000.0, 0.03),
            RouteSegment::new(3000.0, -0.01),
            RouteSegment::new(2000.0, 0.05),
            RouteSegment::new(2000.0, 0.0),
        ],
        ends: vec![3000.0, 5000.0, 8000.0, 10000.0, 12000.0],
        total_length: 12000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hilly() -> Route {
        Route::new(vec![
            RouteSegment::new(100.0, 0.0),
            RouteSegment::new(50.0, 0.04),
            RouteSegment::new(25.0, -0.02),
        ])
        .unwrap()
    }

    #[test]
    fn test_total_length_sums_segments() {
        assert_eq!(hilly().total_length(), 175.0);
        assert_eq!(default_route().total_length(), 12000.0);
    }

    #[test]
    fn test_default_route_matches_validated_build() {
        let rebuilt = Route::new(default_route().segments().to_vec()).unwrap();
        assert_eq!(rebuilt, default_route());
    }

    #[test]
    fn test_gradient_before_start_uses_first_segment() {
        let r = hilly();
        assert_eq!(r.gradient_at(0.0), 0.0);
        assert_eq!(r.gradient_at(-10.0), 0.0);
    }

    #[test]
    fn test_gradient_boundaries_belong_to_earlier_segment() {
        let r = hilly();
        assert_eq!(r.gradient_at(100.0), 0.0);
        assert_eq!(r.gradient_at(100.0001), 0.04);
        assert_eq!(r.gradient_at(150.0), 0.04);
        assert_eq!(r.gradient_at(150.5), -0.02);
    }

    #[test]
    fn test_gradient_past_finish_clamps_to_last() {
        let r = hilly();
        assert_eq!(r.gradient_at(175.0), -0.02);
        assert_eq!(r.gradient_at(1.0e6), -0.02);
    }

    #[test]
    fn test_invalid_routes_rejected() {
        assert_eq!(Route::new(vec![]), Err(ConfigError::EmptyRoute));
        assert!(matches!(
            Route::new(vec![RouteSegment::new(10.0, 0.0), RouteSegment::new(0.0, 0.0)]),
            Err(ConfigError::InvalidSegmentLength { index: 1, .. })
        ));
        assert!(matches!(
            Route::new(vec![RouteSegment::new(10.0, f64::NAN)]),
            Err(ConfigError::InvalidGradient { index: 0, .. })
        ));
    }

    #[test]
    fn test_terrain_profile_labels() {
        let profile = default_route().terrain_profile();
        let labels: Vec<String> = profile.iter().map(|s| s.terrain.to_string()).collect();
        assert_eq!(labels, ["flat", "climb", "descent", "climb", "flat"]);
        assert_eq!(profile[1].length_km, 2.0);
        assert_relative_eq!(profile[3].gradient_pct, 5.0);
        assert_eq!(Terrain::classify(0.004), Terrain::Flat);
        assert_eq!(Terrain::classify(-0.004), Terrain::Flat);
    }

    #[test]
    fn test_route_deserializes_with_validation() {
        let route: Route =
            serde_json::from_str(r#"[{"length": 500, "gradient": 0.02}]"#).unwrap();
        assert_eq!(route.total_length(), 500.0);

        let bad: Result<Route, _> = serde_json::from_str(r#"[{"length": -5, "gradient": 0}]"#);
        assert!(bad.is_err());
    }
}
