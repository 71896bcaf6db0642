use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;

/// A 2-d point. Array input files parse into these; the force kernel also
/// uses this as its (ax, ay) acceleration vector.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub fn new(x: f64, y: f64) -> Point2d {
        Point2d { x, y }
    }

    pub fn zero() -> Point2d {
        Point2d { x: 0.0, y: 0.0 }
    }

    pub fn plus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x + other.x, self.y + other.y)
    }

    pub fn minus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x - other.x, self.y - other.y)
    }

    pub fn scaled(&self, s: f64) -> Point2d {
        Point2d::new(self.x * s, self.y * s)
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Debug for Point2d {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A body in the simulation: position, mass, velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub mass: f64,
    pub vx: f64,
    pub vy: f64,
}

impl Particle {
    /// Input points become unit-mass bodies at rest.
    pub fn from_point(p: &Point2d) -> Particle {
        Particle {
            x: p.x,
            y: p.y,
            mass: 1.0,
            vx: 0.0,
            vy: 0.0,
        }
    }
}

/// A body reduced to position and mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassPoint {
    pub x: f64,
    pub y: f64,
    pub mass: f64,
}

impl MassPoint {
    pub fn new(x: f64, y: f64, mass: f64) -> MassPoint {
        MassPoint { x, y, mass }
    }

    pub fn from_particle(p: &Particle) -> MassPoint {
        MassPoint {
            x: p.x,
            y: p.y,
            mass: p.mass,
        }
    }

    /// The centroid of a set of mass-points: mass-weighted coordinate sums
    /// and the total mass. The coordinate fields are sums, not averages;
    /// the packed encoding stores them exactly like this and the force
    /// kernel consumes them in the same convention.
    pub fn centroid(mpts: &[MassPoint]) -> MassPoint {
        let mut acc_x = 0.0;
        let mut acc_y = 0.0;
        let mut acc_mass = 0.0;
        for mp in mpts {
            acc_x += mp.x * mp.mass;
            acc_y += mp.y * mp.mass;
            acc_mass += mp.mass;
        }
        MassPoint::new(acc_x, acc_y, acc_mass)
    }
}

/// Axis-aligned bounding box, lower-left to upper-right corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub llx: f64,
    pub lly: f64,
    pub rux: f64,
    pub ruy: f64,
}

impl BoundingBox {
    pub fn new(llx: f64, lly: f64, rux: f64, ruy: f64) -> BoundingBox {
        BoundingBox { llx, lly, rux, ruy }
    }

    /// The exact min/max box of a set of bodies. Computed once per
    /// simulation, before the first iteration.
    pub fn around(ps: &[Particle]) -> BoundingBox {
        let mut bb = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for p in ps {
            if p.x < bb.llx {
                bb.llx = p.x;
            }
            if p.y < bb.lly {
                bb.lly = p.y;
            }
            if p.x > bb.rux {
                bb.rux = p.x;
            }
            if p.y > bb.ruy {
                bb.ruy = p.y;
            }
        }
        bb
    }

    /// Box membership: left and bottom edges open, right and top edges
    /// closed. Points sitting exactly on a midpoint line therefore land in
    /// the lower/left quadrant and in no other.
    pub fn contains(&self, mp: &MassPoint) -> bool {
        mp.x > self.llx && mp.y > self.lly && mp.x <= self.rux && mp.y <= self.ruy
    }

    /// Split at the midpoint into (lower-left, upper-left, upper-right,
    /// lower-right). Children of a packed node are stored in this order.
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let mx = (self.llx + self.rux) / 2.0;
        let my = (self.lly + self.ruy) / 2.0;
        [
            BoundingBox::new(self.llx, self.lly, mx, my),
            BoundingBox::new(self.llx, my, mx, self.ruy),
            BoundingBox::new(mx, my, self.rux, self.ruy),
            BoundingBox::new(mx, self.lly, self.rux, my),
        ]
    }

    pub fn masspoints_in(&self, mpts: &[MassPoint]) -> Vec<MassPoint> {
        mpts.iter().filter(|mp| self.contains(mp)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    #[test]
    fn centroid_is_weighted_sums() {
        let mpts = vec![
            MassPoint::new(1.0, 2.0, 2.0),
            MassPoint::new(-3.0, 0.5, 1.0),
        ];
        let c = MassPoint::centroid(&mpts);
        assert_eq!(2.0 * 1.0 + -3.0, c.x);
        assert_eq!(2.0 * 2.0 + 0.5, c.y);
        assert_eq!(3.0, c.mass);
    }

    #[test]
    fn quadrant_order_is_ll_ul_ur_lr() {
        let bb = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let [q1, q2, q3, q4] = bb.quadrants();
        assert_eq!(BoundingBox::new(0.0, 0.0, 1.0, 1.0), q1);
        assert_eq!(BoundingBox::new(0.0, 1.0, 1.0, 2.0), q2);
        assert_eq!(BoundingBox::new(1.0, 1.0, 2.0, 2.0), q3);
        assert_eq!(BoundingBox::new(1.0, 0.0, 2.0, 1.0), q4);
    }

    #[test]
    fn midpoint_ties_go_to_the_lower_left() {
        let bb = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let on_both_lines = MassPoint::new(1.0, 1.0, 1.0);
        let homes: Vec<usize> = bb
            .quadrants()
            .iter()
            .enumerate()
            .filter(|(_, q)| q.contains(&on_both_lines))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(vec![0], homes);
    }

    #[test]
    fn every_interior_point_falls_in_exactly_one_quadrant() {
        let bb = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
        let quads = bb.quadrants();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let mp = MassPoint::new(
                rng.gen_range(-0.999..1.0),
                rng.gen_range(-0.999..1.0),
                1.0,
            );
            let hits = quads.iter().filter(|q| q.contains(&mp)).count();
            assert_eq!(1, hits, "point {:?} hit {} quadrants", mp, hits);
        }
    }

    #[test]
    fn around_is_the_exact_hull() {
        let ps = vec![
            Particle::from_point(&Point2d::new(-2.0, 1.0)),
            Particle::from_point(&Point2d::new(3.0, -4.0)),
            Particle::from_point(&Point2d::new(0.0, 0.0)),
        ];
        let bb = BoundingBox::around(&ps);
        assert_eq!(BoundingBox::new(-2.0, -4.0, 3.0, 1.0), bb);
    }
}
