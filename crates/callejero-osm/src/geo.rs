//! Geographic primitives shared by both backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, as used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both components are finite and inside the valid degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other`, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(self, other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lon)
    }
}

/// Haversine distance between two coordinates, in meters.
#[must_use]
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Bounding box of a single coordinate.
    #[must_use]
    pub const fn point(coordinate: Coordinate) -> Self {
        Self {
            min_lat: coordinate.lat,
            min_lon: coordinate.lon,
            max_lat: coordinate.lat,
            max_lon: coordinate.lon,
        }
    }

    /// Bounding box of a set of coordinates, `None` when the set is empty.
    pub fn from_coordinates<'a, I>(coordinates: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut iter = coordinates.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::point(*first), |mut bounds, c| {
            bounds.extend(c);
            bounds
        }))
    }

    pub fn extend(&mut self, coordinate: &Coordinate) {
        self.min_lat = self.min_lat.min(coordinate.lat);
        self.min_lon = self.min_lon.min(coordinate.lon);
        self.max_lat = self.max_lat.max(coordinate.lat);
        self.max_lon = self.max_lon.max(coordinate.lon);
    }

    #[must_use]
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&coordinate.lat)
            && (self.min_lon..=self.max_lon).contains(&coordinate.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        let c = Coordinate::new(-34.9011, -56.1645);
        assert!(haversine_distance(&c, &c).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111.19 km on the mean sphere.
        let a = Coordinate::new(-34.0, -56.0);
        let b = Coordinate::new(-35.0, -56.0);
        let d = haversine_distance(&a, &b);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn test_bounds_from_coordinates() {
        let coords = [
            Coordinate::new(-34.90, -56.19),
            Coordinate::new(-34.91, -56.16),
            Coordinate::new(-34.89, -56.17),
        ];
        let bounds = Bounds::from_coordinates(&coords).unwrap();
        assert_eq!(bounds.min_lat, -34.91);
        assert_eq!(bounds.max_lat, -34.89);
        assert_eq!(bounds.min_lon, -56.19);
        assert_eq!(bounds.max_lon, -56.16);
        assert!(bounds.contains(&Coordinate::new(-34.90, -56.18)));

        let center = bounds.center();
        assert!((center.lat + 34.90).abs() < 1e-9);
        assert!((center.lon + 56.175).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds::from_coordinates(&Vec::<Coordinate>::new()).is_none());
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(-34.9, -56.1).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
    }
}
