use super::{Vect2, wrap_deg};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A 3D velocity stored as north/east/up components (m/s).
///
/// The track/ground-speed/vertical-speed representation converts
/// losslessly: `vn = gs·cos(trk)`, `ve = gs·sin(trk)`, `vu = vs`.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    vn: f64,
    ve: f64,
    vu: f64,
}

impl Display for Velocity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "trk {:.1}°, gs {:.2} m/s, vs {:.2} m/s",
            self.compass_deg(),
            self.gs(),
            self.vs()
        )
    }
}

impl Velocity {
    pub const fn new(vn: f64, ve: f64, vu: f64) -> Self { Self { vn, ve, vu } }

    pub const fn zero() -> Self { Self::new(0.0, 0.0, 0.0) }

    /// Builds a velocity from a compass track (degrees), ground speed and
    /// vertical speed (m/s).
    pub fn make_trk_gs_vs(trk_deg: f64, gs: f64, vs: f64) -> Self {
        let trk = trk_deg.to_radians();
        Self::new(gs * trk.cos(), gs * trk.sin(), vs)
    }

    pub const fn vn(&self) -> f64 { self.vn }

    pub const fn ve(&self) -> f64 { self.ve }

    pub const fn vu(&self) -> f64 { self.vu }

    /// Ground speed (m/s).
    pub fn gs(&self) -> f64 { self.vn.hypot(self.ve) }

    /// Vertical speed (m/s).
    pub const fn vs(&self) -> f64 { self.vu }

    /// Compass track in radians `[0, 2π)`.
    pub fn trk(&self) -> f64 { super::wrap_rad(self.ve.atan2(self.vn)) }

    /// Compass track in degrees `[0, 360)`.
    pub fn compass_deg(&self) -> f64 { wrap_deg(self.trk().to_degrees()) }

    /// Returns a copy with the ground speed scaled to `gs`, preserving
    /// track and vertical speed. A zero horizontal velocity is returned
    /// unmodified.
    pub fn mk_gs(&self, gs: f64) -> Self {
        let current = self.gs();
        if current < f64::EPSILON {
            return *self;
        }
        let scale = gs / current;
        Self::new(self.vn * scale, self.ve * scale, self.vu)
    }

    /// Horizontal components as a local East/North vector.
    pub const fn vect2(&self) -> Vect2 { Vect2::new(self.ve, self.vn) }
}
