use super::velocity::Velocity;
use super::{Vect2, Vect3};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Mean earth radius (m) used by the local projection.
const EARTH_RADIUS: f64 = 6_371_000.0;

/// A geodetic position: latitude/longitude in degrees, altitude in meters
/// above the reference datum.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    lat: f64,
    lon: f64,
    alt: f64,
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6}, {:.2}m)", self.lat, self.lon, self.alt)
    }
}

impl Position {
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self { Self { lat, lon, alt } }

    pub const fn lat(&self) -> f64 { self.lat }

    pub const fn lon(&self) -> f64 { self.lon }

    pub const fn alt(&self) -> f64 { self.alt }

    /// Returns a copy of this position with a different altitude.
    pub const fn mk_alt(&self, alt: f64) -> Self {
        Self {
            lat: self.lat,
            lon: self.lon,
            alt,
        }
    }

    /// Horizontal distance to another position (m).
    pub fn distance_h(&self, other: &Self) -> f64 {
        Projection::new(*self).project(other).norm2d()
    }

    /// Absolute vertical distance to another position (m).
    pub fn distance_v(&self, other: &Self) -> f64 { (other.alt - self.alt).abs() }

    /// Compass bearing from this position to another, in radians `[0, 2π)`.
    pub fn track(&self, other: &Self) -> f64 {
        Projection::new(*self).project(other).vect2().trk()
    }

    /// Position reached by moving `dist` meters along compass bearing
    /// `trk` (radians), keeping the current altitude.
    pub fn linear_dist_2d(&self, trk: f64, dist: f64) -> Self {
        let offset = Vect2::new(trk.sin() * dist, trk.cos() * dist);
        Projection::new(*self).inverse(Vect3::new(offset.x, offset.y, self.alt))
    }

    /// Linear extrapolation of this position along `vel` for `dt` seconds.
    pub fn linear_est(&self, vel: &Velocity, dt: f64) -> Self {
        let moved = self.linear_dist_2d(vel.trk(), vel.gs() * dt);
        moved.mk_alt(self.alt + vel.vs() * dt)
    }
}

/// Equirectangular East/North/Up projection anchored at a reference
/// position. Valid for the small areas a fence or flight plan covers.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    anchor: Position,
    cos_lat: f64,
}

impl Projection {
    pub fn new(anchor: Position) -> Self {
        Self {
            anchor,
            cos_lat: anchor.lat.to_radians().cos(),
        }
    }

    pub const fn anchor(&self) -> Position { self.anchor }

    /// Projects a geodetic position into the local frame. The vertical
    /// component keeps the absolute altitude.
    pub fn project(&self, pos: &Position) -> Vect3 {
        let east = (pos.lon - self.anchor.lon).to_radians() * self.cos_lat * EARTH_RADIUS;
        let north = (pos.lat - self.anchor.lat).to_radians() * EARTH_RADIUS;
        Vect3::new(east, north, pos.alt)
    }

    /// Recovers a geodetic position from local coordinates.
    pub fn inverse(&self, v: Vect3) -> Position {
        let lat = self.anchor.lat + (v.y / EARTH_RADIUS).to_degrees();
        let lon = self.anchor.lon + (v.x / (EARTH_RADIUS * self.cos_lat)).to_degrees();
        Position::new(lat, lon, v.z)
    }
}
