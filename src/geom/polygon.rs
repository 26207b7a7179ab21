use super::position::{Position, Projection};
use super::vect::{Vect2, Vect3};
use super::velocity::Velocity;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A fence volume: a simple polygon of geodetic vertices extruded between
/// a floor and a ceiling altitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<Position>,
    floor: f64,
    ceiling: f64,
}

impl Polygon {
    pub fn new(vertices: Vec<Position>, floor: f64, ceiling: f64) -> Self {
        Self {
            vertices,
            floor,
            ceiling,
        }
    }

    pub fn vertices(&self) -> &[Position] { &self.vertices }

    pub const fn floor(&self) -> f64 { self.floor }

    pub const fn ceiling(&self) -> f64 { self.ceiling }

    /// Projects the polygon into a local frame.
    pub fn poly3d(&self, proj: &Projection) -> Poly3D {
        Poly3D {
            vertices: self.vertices.iter().map(|v| proj.project(v).vect2()).collect(),
            floor: self.floor,
            ceiling: self.ceiling,
        }
    }
}

/// A polygon projected into a local East/North frame, with its floor and
/// ceiling altitudes.
#[derive(Debug, Clone)]
pub struct Poly3D {
    vertices: Vec<Vect2>,
    floor: f64,
    ceiling: f64,
}

impl Poly3D {
    pub fn vertices(&self) -> &[Vect2] { &self.vertices }

    pub const fn floor(&self) -> f64 { self.floor }

    pub const fn ceiling(&self) -> f64 { self.ceiling }

    /// Iterate over the polygon edges, wrapping from the last vertex back
    /// to the first.
    pub fn edges(&self) -> impl Iterator<Item = (Vect2, Vect2)> + '_ {
        self.vertices.iter().copied().circular_tuple_windows()
    }

    /// Horizontal point-in-polygon test (ray casting).
    pub fn contains2d(&self, p: Vect2) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let t = (p.y - a.y) / (b.y - a.y);
                if p.x < a.x + t * (b.x - a.x) {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Full containment test including the altitude band.
    pub fn contains(&self, p: Vect3) -> bool {
        p.z >= self.floor && p.z <= self.ceiling && self.contains2d(p.vect2())
    }

    /// Horizontal distance from `p` to the nearest polygon edge.
    pub fn distance_to_edge(&self, p: Vect2) -> f64 {
        let mut best = f64::INFINITY;
        for (a, b) in self.edges() {
            let ab = b - a;
            let len_sq = ab.norm_sq();
            let t = if len_sq < f64::EPSILON {
                0.0
            } else {
                ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            };
            best = best.min(p.distance(a + ab * t));
        }
        best
    }

    /// Earliest non-negative time at which a vehicle at `so` moving with
    /// `vel` crosses one of the polygon edges. Edges whose infinite line
    /// the ownship is not abeam of are ignored. Returns `f64::INFINITY`
    /// if no edge is ever crossed.
    pub fn time_to_edge_crossing(&self, so: Vect3, vel: &Velocity) -> f64 {
        let mut times: Vec<f64> = Vec::new();
        let l0 = so.vect2();
        let l = vel.vect2();
        for (a, b) in self.edges() {
            let ab = b - a;
            let len = ab.norm();
            if len < f64::EPSILON {
                continue;
            }
            let proj = (l0 - a).dot(ab.hat()) / len;
            if !(0.0..=1.0).contains(&proj) {
                continue;
            }
            let n = ab.perp_l().hat();
            let num = (a - l0).dot(n);
            let den = l.dot(n);
            if den.abs() > 1e-3 {
                let t = num / den;
                if t >= 0.0 {
                    times.push(t);
                }
            } else {
                times.push(f64::INFINITY);
            }
        }
        times.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// True if the 3D segment from `p` to `q` pierces the vertical face
    /// spanned by one of the polygon edges.
    pub fn intersects_segment(&self, p: Vect3, q: Vect3) -> bool {
        self.edges().any(|(a, b)| segment_hits_face(a, b, self.floor, self.ceiling, p, q))
    }
}

/// Intersection test between a 3D segment `p`→`q` and the vertical face
/// obtained by extruding the 2D edge `a`→`b` between `floor` and
/// `ceiling`.
fn segment_hits_face(a: Vect2, b: Vect2, floor: f64, ceiling: f64, p: Vect3, q: Vect3) -> bool {
    let r = q.vect2() - p.vect2();
    let s = b - a;
    let denom = r.cross(s);
    if denom.abs() < f64::EPSILON {
        // Parallel in the horizontal plane.
        return false;
    }
    let qp = a - p.vect2();
    let t = qp.cross(s) / denom;
    let u = qp.cross(r) / denom;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return false;
    }
    let z = p.z + t * (q.z - p.z);
    z >= floor && z <= ceiling
}
