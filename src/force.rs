use rayon::prelude::*;

use crate::geom::{MassPoint, Particle, Point2d};
use crate::reader::{NodeView, PackedTree};
use crate::region::Cursor;

/// The kernel's tuning constants. The defaults are the values the
/// simulation was measured with; nothing in the math requires them.
#[derive(Debug, Clone, Copy)]
pub struct ForceParams {
    /// Opening criterion: recurse into a node when the squared distance
    /// to its centroid is below this.
    pub opening: f64,
    /// Softening radius: inside it, attraction is zero instead of
    /// singular.
    pub softening: f64,
}

impl Default for ForceParams {
    fn default() -> ForceParams {
        ForceParams {
            opening: 0.01,
            softening: 0.05,
        }
    }
}

/// Acceleration on the query point from a single aggregate body at
/// `(x, y)` with mass `m`.
pub fn accel(q: &MassPoint, x: f64, y: f64, m: f64, params: &ForceParams) -> Point2d {
    let dx = x - q.x;
    let dy = y - q.y;
    let rsqr = dx * dx + dy * dy;
    let r = rsqr.sqrt();
    if r < params.softening {
        Point2d::zero()
    } else {
        let aabs = m / rsqr;
        Point2d::new(aabs * dx, aabs * dy)
    }
}

fn is_close(q: &MassPoint, x: f64, y: f64, params: &ForceParams) -> bool {
    let d1 = q.x - x;
    let d2 = q.y - y;
    d1 * d1 + d2 * d2 < params.opening
}

/// Barnes-Hut acceleration on `q` from the subtree at `cur`. Nodes whose
/// centroid passes the opening test are descended into; the rest act as a
/// single aggregate body.
pub fn calc_accel(
    tree: &PackedTree,
    cur: Cursor,
    q: &MassPoint,
    params: &ForceParams,
) -> crate::Result<Point2d> {
    match tree.node(cur)? {
        NodeView::Empty => Ok(Point2d::zero()),
        NodeView::Leaf { x, y, mass } => Ok(accel(q, x, y, mass, params)),
        NodeView::Node {
            x,
            y,
            mass,
            children,
            ..
        } => {
            if is_close(q, x, y, params) {
                let a1 = calc_accel(tree, children[0], q, params)?;
                let a2 = calc_accel(tree, children[1], q, params)?;
                let a3 = calc_accel(tree, children[2], q, params)?;
                let a4 = calc_accel(tree, children[3], q, params)?;
                Ok(Point2d::new(
                    a1.x + a2.x + a3.x + a4.x,
                    a1.y + a2.y + a3.y + a4.y,
                ))
            } else {
                Ok(accel(q, x, y, mass, params))
            }
        }
    }
}

/// Fork-join variant of `calc_accel`: subtrees holding fewer than
/// `cutoff` bodies drop to the sequential walk, larger ones descend all
/// four children in parallel. Sums in the same order as the sequential
/// walk, so the two agree bitwise.
pub fn calc_accel_par(
    tree: &PackedTree,
    cur: Cursor,
    q: &MassPoint,
    cutoff: i64,
    params: &ForceParams,
) -> crate::Result<Point2d> {
    match tree.node(cur)? {
        NodeView::Empty => Ok(Point2d::zero()),
        NodeView::Leaf { x, y, mass } => Ok(accel(q, x, y, mass, params)),
        NodeView::Node {
            x,
            y,
            mass,
            elems,
            children,
        } => {
            if elems < cutoff {
                return calc_accel(tree, cur, q, params);
            }
            if is_close(q, x, y, params) {
                let ((a1, a2), (a3, a4)) = rayon::join(
                    || {
                        rayon::join(
                            || calc_accel_par(tree, children[0], q, cutoff, params),
                            || calc_accel_par(tree, children[1], q, cutoff, params),
                        )
                    },
                    || {
                        rayon::join(
                            || calc_accel_par(tree, children[2], q, cutoff, params),
                            || calc_accel_par(tree, children[3], q, cutoff, params),
                        )
                    },
                );
                let (a1, a2, a3, a4) = (a1?, a2?, a3?, a4?);
                Ok(Point2d::new(
                    a1.x + a2.x + a3.x + a4.x,
                    a1.y + a2.y + a3.y + a4.y,
                ))
            } else {
                Ok(accel(q, x, y, mass, params))
            }
        }
    }
}

/// Accelerations for every body, sequentially.
pub fn map_calc_accel(
    tree: &PackedTree,
    mpts: &[MassPoint],
    params: &ForceParams,
) -> crate::Result<Vec<Point2d>> {
    mpts.iter()
        .map(|mp| calc_accel(tree, tree.root(), mp, params))
        .collect()
}

/// Accelerations for every body, each written to its own slot of `dst`
/// from the parallel map. `dst` must already be sized to the body count.
pub fn map_calc_accel_par(
    tree: &PackedTree,
    mpts: &[MassPoint],
    dst: &mut [Point2d],
    params: &ForceParams,
) -> crate::Result<()> {
    if mpts.len() != dst.len() {
        return Err(format!(
            "map_calc_accel: size mismatch, {} != {}",
            mpts.len(),
            dst.len()
        )
        .into());
    }
    dst.par_iter_mut()
        .zip(mpts.par_iter())
        .try_for_each(|(a, mp)| -> crate::Result<()> {
            *a = calc_accel(tree, tree.root(), mp, params)?;
            Ok(())
        })
}

/// One integration step: position and mass are carried over, velocities
/// pick up the acceleration and the fixed step factor.
pub fn apply_accel(p: &Particle, a: &Point2d, step: f64) -> Particle {
    Particle {
        x: p.x,
        y: p.y,
        mass: p.mass,
        vx: (p.vx + a.x) * step,
        vy: (p.vy + a.y) * step,
    }
}

/// Apply accelerations to every body in place.
pub fn map_apply_accel(ps: &mut [Particle], accels: &[Point2d], step: f64) -> crate::Result<()> {
    if ps.len() != accels.len() {
        return Err(format!(
            "map_apply_accel: size mismatch, {} != {}",
            ps.len(),
            accels.len()
        )
        .into());
    }
    ps.par_iter_mut()
        .zip(accels.par_iter())
        .for_each(|(p, a)| *p = apply_accel(p, a, step));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::BoundingBox;
    use crate::packer::pack_sequential;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    const CAP: usize = 64 * 1024;

    #[test]
    fn softening_zeroes_the_self_interaction() {
        let bb = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
        let mpts = vec![MassPoint::new(0.0, 0.0, 1.0)];
        let tree = pack_sequential(&bb, &mpts, CAP).unwrap();
        let a = calc_accel(&tree, tree.root(), &mpts[0], &ForceParams::default()).unwrap();
        assert_eq!(Point2d::zero(), a);
    }

    #[test]
    fn accel_points_from_the_query_toward_the_mass() {
        let q = MassPoint::new(0.0, 0.0, 1.0);
        let a = accel(&q, 1.0, 0.0, 2.0, &ForceParams::default());
        assert_eq!(Point2d::new(2.0, 0.0), a);
        assert_eq!(Point2d::zero(), accel(&q, 0.01, 0.0, 2.0, &ForceParams::default()));
    }

    #[test]
    fn distant_nodes_act_as_their_aggregate() {
        // Two bodies tucked into one corner, queried from far away: the
        // opening test fails and the node's stored centroid (the weighted
        // coordinate sums) is what the kernel must consume.
        let bb = BoundingBox::new(0.0, 0.0, 16.0, 16.0);
        let mpts = vec![
            MassPoint::new(0.5, 0.5, 1.0),
            MassPoint::new(0.6, 0.6, 1.0),
        ];
        let tree = pack_sequential(&bb, &mpts, CAP).unwrap();
        let q = MassPoint::new(14.0, 14.0, 1.0);
        let got = calc_accel(&tree, tree.root(), &q, &ForceParams::default()).unwrap();
        let want = accel(&q, 0.5 + 0.6, 0.5 + 0.6, 2.0, &ForceParams::default());
        assert_eq!(want, got);
    }

    fn random_points(n: usize, seed: u64) -> Vec<MassPoint> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| MassPoint::new(rng.gen_range(0.001..1.0), rng.gen_range(0.001..1.0), 1.0))
            .collect()
    }

    #[test]
    fn parallel_and_sequential_kernels_agree_bitwise() {
        let bb = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let mpts = random_points(600, 17);
        let tree = pack_sequential(&bb, &mpts, CAP).unwrap();
        let params = ForceParams::default();
        for q in mpts.iter().step_by(97) {
            let seq = calc_accel(&tree, tree.root(), q, &params).unwrap();
            let par = calc_accel_par(&tree, tree.root(), q, 8, &params).unwrap();
            assert_eq!(seq.x.to_bits(), par.x.to_bits());
            assert_eq!(seq.y.to_bits(), par.y.to_bits());
        }
    }

    #[test]
    fn parallel_map_matches_the_sequential_map() {
        let bb = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let mpts = random_points(200, 29);
        let tree = pack_sequential(&bb, &mpts, CAP).unwrap();
        let params = ForceParams::default();
        let seq = map_calc_accel(&tree, &mpts, &params).unwrap();
        let mut par = vec![Point2d::zero(); mpts.len()];
        map_calc_accel_par(&tree, &mpts, &mut par, &params).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn apply_accel_updates_velocities_only() {
        let p = Particle {
            x: 1.0,
            y: 2.0,
            mass: 1.0,
            vx: 0.5,
            vy: -0.5,
        };
        let next = apply_accel(&p, &Point2d::new(0.25, 0.5), 2.0);
        assert_eq!((1.0, 2.0, 1.0), (next.x, next.y, next.mass));
        assert_eq!(1.5, next.vx);
        assert_eq!(0.0, next.vy);
    }

    #[test]
    fn mismatched_buffers_are_an_invariant_violation() {
        let mut ps = vec![Particle::from_point(&Point2d::new(0.0, 0.0))];
        assert!(map_apply_accel(&mut ps, &[], 2.0).is_err());
    }
}
