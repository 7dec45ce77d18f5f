//! Projected (UTM) ↔ geographic coordinate conversion on the WGS84 ellipsoid.
//!
//! Both directions use the classic Transverse Mercator series expansions.
//! Inside a zone the pair is consistent to well under a meter.

use tracing::{debug, warn};

use crate::osm::Coordinate;

/// WGS84 semi-major axis, meters.
pub const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const FLATTENING: f64 = 1.0 / 298.257_223_563;
/// UTM central meridian scale factor.
pub const SCALE_FACTOR: f64 = 0.9996;
pub const FALSE_EASTING: f64 = 500_000.0;
/// Added to northings in the southern hemisphere only.
pub const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hemisphere {
    North,
    #[default]
    South,
}

impl Hemisphere {
    /// Parse the usual one-letter (or full word) hemisphere designators.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "N" | "NORTH" => Some(Self::North),
            "S" | "SOUTH" => Some(Self::South),
            _ => None,
        }
    }

    const fn false_northing(self) -> f64 {
        match self {
            Self::North => 0.0,
            Self::South => FALSE_NORTHING_SOUTH,
        }
    }
}

/// A position on a UTM grid.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UtmPosition {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub hemisphere: Hemisphere,
}

struct Ellipsoid {
    e2: f64,
    ep2: f64,
}

const fn ellipsoid() -> Ellipsoid {
    let e2 = FLATTENING * (2.0 - FLATTENING);
    Ellipsoid {
        e2,
        ep2: e2 / (1.0 - e2),
    }
}

fn central_meridian(zone: u8) -> f64 {
    ((f64::from(zone) - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Meridional arc length from the equator to latitude `phi` (radians).
fn meridional_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR_AXIS
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Inverse Transverse Mercator: UTM grid position to WGS84 degrees.
///
/// Total and pure: nothing is range-checked here. Reject implausible input
/// (see [`ProjectedEnvelope`]) before calling.
///
/// ```rust
/// use callejero::transform::{Hemisphere, to_geographic};
///
/// // Plaza Independencia, Montevideo (zone 21 south).
/// let c = to_geographic(574_000.0, 6_137_000.0, 21, Hemisphere::South);
/// assert!((c.lat + 34.906).abs() < 0.01);
/// assert!((c.lon + 56.19).abs() < 0.01);
/// ```
#[must_use]
pub fn to_geographic(easting: f64, northing: f64, zone: u8, hemisphere: Hemisphere) -> Coordinate {
    let Ellipsoid { e2, ep2 } = ellipsoid();
    let k0 = SCALE_FACTOR;
    let a = SEMI_MAJOR_AXIS;

    let m = (northing - hemisphere.false_northing()) / k0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    // Third flattening, equal to the usual e1 term.
    let n = FLATTENING / (2.0 - FLATTENING);
    let phi1 = mu
        + (3.0 * n / 2.0 - 27.0 * n.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * n.powi(2) / 16.0 - 55.0 * n.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * n.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * n.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1) = phi1.sin_cos();
    let tan1 = phi1.tan();
    let n1 = a / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = (easting - FALSE_EASTING) / (n1 * k0);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

    Coordinate::new(lat.to_degrees(), lon.to_degrees())
}

/// Forward Transverse Mercator: WGS84 degrees to a grid position in the
/// given zone and hemisphere.
#[must_use]
pub fn to_projected(coordinate: Coordinate, zone: u8, hemisphere: Hemisphere) -> UtmPosition {
    let Ellipsoid { e2, ep2 } = ellipsoid();
    let k0 = SCALE_FACTOR;

    let phi = coordinate.lat.to_radians();
    let (sin, cos) = phi.sin_cos();
    let tan = phi.tan();
    let n = SEMI_MAJOR_AXIS / (1.0 - e2 * sin * sin).sqrt();
    let t = tan * tan;
    let c = ep2 * cos * cos;
    let a = cos * (coordinate.lon.to_radians() - central_meridian(zone));
    let m = meridional_arc(phi, e2);

    let easting = k0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;
    let northing = k0
        * (m + n
            * tan
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0))
        + hemisphere.false_northing();

    UtmPosition {
        easting,
        northing,
        zone,
        hemisphere,
    }
}

/// Plausible projected-coordinate window for the operating region.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectedEnvelope {
    pub min_easting: f64,
    pub max_easting: f64,
    pub min_northing: f64,
    pub max_northing: f64,
}

impl Default for ProjectedEnvelope {
    fn default() -> Self {
        Self {
            min_easting: 200_000.0,
            max_easting: 800_000.0,
            min_northing: 6_000_000.0,
            max_northing: 7_000_000.0,
        }
    }
}

impl ProjectedEnvelope {
    #[must_use]
    pub fn contains(&self, easting: f64, northing: f64) -> bool {
        (self.min_easting..=self.max_easting).contains(&easting)
            && (self.min_northing..=self.max_northing).contains(&northing)
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.min_easting < self.max_easting && self.min_northing < self.max_northing
    }
}

/// A mobile unit's last reported grid position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MobileUnitPosition {
    pub id: String,
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub hemisphere: Hemisphere,
}

/// A mobile unit's position after conversion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitLocation {
    pub id: String,
    pub coordinate: Coordinate,
}

/// Convert one poll's worth of positions. Positions outside `envelope` or
/// with an invalid zone are dropped with a warning.
pub fn convert_positions<'a, I>(positions: I, envelope: &ProjectedEnvelope) -> Vec<UnitLocation>
where
    I: IntoIterator<Item = &'a MobileUnitPosition>,
{
    let converted: Vec<_> = positions
        .into_iter()
        .filter_map(|p| {
            if !(1..=60).contains(&p.zone) || !envelope.contains(p.easting, p.northing) {
                warn!(
                    id = %p.id,
                    easting = p.easting,
                    northing = p.northing,
                    zone = p.zone,
                    "Position outside the projected envelope, skipped"
                );
                return None;
            }
            Some(UnitLocation {
                id: p.id.clone(),
                coordinate: to_geographic(p.easting, p.northing, p.zone, p.hemisphere),
            })
        })
        .collect();
    debug!(converted = converted.len(), "Converted mobile unit positions");
    converted
}
