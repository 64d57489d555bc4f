use crate::core::structure::Crystal;
use nalgebra::{Matrix3, Vector3};
use std::collections::HashSet;

const FRAC_TOL: f64 = 1e-3;
const METRIC_TOL: f64 = 1e-4;

/// Candidate rotation parts of the space group, found by brute force over
/// integer matrices with entries in {-1, 0, 1} that preserve the metric
/// tensor. The metric check prunes 3^9 candidates down to at most 48.
pub fn lattice_rotations(crystal: &Crystal) -> Vec<Matrix3<i32>> {
    let g = crystal.lattice.metric_tensor();
    let scale = g.norm().max(1.0);
    let mut rotations = Vec::new();

    let entries = [-1i32, 0, 1];
    // Nine nested loops flattened into a counter over 3^9 states.
    for idx in 0..19683u32 {
        let mut rem = idx;
        let mut m = [0i32; 9];
        for slot in &mut m {
            *slot = entries[(rem % 3) as usize];
            rem /= 3;
        }
        let w = Matrix3::from_row_slice(&m);
        let det = determinant_i32(&w);
        if det != 1 && det != -1 {
            continue;
        }
        let wf = w.map(|x| x as f64);
        if ((wf.transpose() * g * wf) - g).norm() / scale < METRIC_TOL {
            rotations.push(w);
        }
    }
    rotations
}

/// Rotations of the lattice that also map the atom set onto itself for
/// some translation. Returns (rotation, translation) pairs.
pub fn crystal_rotations(crystal: &Crystal) -> Vec<(Matrix3<i32>, Vector3<f64>)> {
    let mut ops = Vec::new();

    // Use the scarcest element as the translation anchor.
    let composition = crystal.composition();
    let anchor_el = composition
        .iter()
        .min_by_key(|(_, &n)| n)
        .map(|(el, _)| el.clone())
        .expect("crystal has sites");
    let anchor = crystal
        .sites
        .iter()
        .find(|s| s.element == anchor_el)
        .expect("anchor element present");

    for w in lattice_rotations(crystal) {
        let wf = w.map(|x| x as f64);
        let rotated_anchor = wf * anchor.coords();

        for target in crystal.sites.iter().filter(|s| s.element == anchor_el) {
            let t = wrap(&(target.coords() - rotated_anchor));
            if maps_onto_itself(crystal, &wf, &t) {
                ops.push((w, t));
                break;
            }
        }
    }
    ops
}

fn maps_onto_itself(crystal: &Crystal, wf: &Matrix3<f64>, t: &Vector3<f64>) -> bool {
    crystal.sites.iter().all(|site| {
        let image = wrap(&(wf * site.coords() + t));
        crystal.sites.iter().any(|other| {
            other.element == site.element && frac_close(&image, &wrap(&other.coords()))
        })
    })
}

/// True iff the crystal belongs to a Laue class, i.e. carries an
/// inversion centre. Non-centrosymmetric bulks cannot yield
/// inversion-symmetric slabs.
pub fn is_laue(crystal: &Crystal) -> bool {
    has_inversion_symmetry(crystal)
}

/// Inversion test: is there a centre c such that -x + 2c maps every site
/// onto an equivalent site? Candidate centres are midpoints between the
/// anchor site and every site of the same element.
pub fn has_inversion_symmetry(crystal: &Crystal) -> bool {
    let anchor = &crystal.sites[0];
    for target in crystal
        .sites
        .iter()
        .filter(|s| s.element == anchor.element)
    {
        // inversion through c maps anchor -> target: t = 2c = anchor + target
        let t = wrap(&(anchor.coords() + target.coords()));
        let minus_i = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, -1.0));
        if maps_onto_itself(crystal, &minus_i, &t) {
            return true;
        }
    }
    false
}

/// All symmetrically distinct Miller indices with components in
/// [-max_index, max_index], gcd-reduced and deduplicated under the
/// crystal's rotation group. Miller indices transform contravariantly to
/// fractional coordinates: h' = h . W (row vector times matrix).
pub fn symmetrically_distinct_miller_indices(
    crystal: &Crystal,
    max_index: i32,
) -> Vec<[i32; 3]> {
    let rotations: Vec<Matrix3<i32>> = crystal_rotations(crystal)
        .into_iter()
        .map(|(w, _)| w)
        .collect();

    let mut seen: HashSet<[i32; 3]> = HashSet::new();
    let mut distinct = Vec::new();

    for h in -max_index..=max_index {
        for k in -max_index..=max_index {
            for l in -max_index..=max_index {
                if h == 0 && k == 0 && l == 0 {
                    continue;
                }
                let div = gcd3(h, k, l);
                if div != 1 {
                    continue;
                }
                let hkl = [h, k, l];
                if seen.contains(&hkl) {
                    continue;
                }
                // Mark the whole orbit, keep the lexicographically
                // largest member as the representative.
                let mut orbit: Vec<[i32; 3]> = rotations
                    .iter()
                    .map(|w| apply_to_miller(&hkl, w))
                    .collect();
                orbit.push(hkl);
                let rep = *orbit.iter().max().expect("orbit is non-empty");
                for member in orbit {
                    seen.insert(member);
                }
                if rep == hkl {
                    distinct.push(hkl);
                } else if !distinct.contains(&rep) {
                    distinct.push(rep);
                }
            }
        }
    }
    distinct.sort();
    distinct.reverse();
    distinct
}

fn apply_to_miller(hkl: &[i32; 3], w: &Matrix3<i32>) -> [i32; 3] {
    let mut out = [0i32; 3];
    for (j, slot) in out.iter_mut().enumerate() {
        *slot = hkl[0] * w[(0, j)] + hkl[1] * w[(1, j)] + hkl[2] * w[(2, j)];
    }
    out
}

fn determinant_i32(m: &Matrix3<i32>) -> i32 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

pub fn gcd3(a: i32, b: i32, c: i32) -> i32 {
    gcd(gcd(a.abs(), b.abs()), c.abs())
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn wrap(v: &Vector3<f64>) -> Vector3<f64> {
    v.map(|x| {
        let mut w = x - x.floor();
        if w > 1.0 - FRAC_TOL {
            w = 0.0;
        }
        w
    })
}

fn frac_close(a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
    (0..3).all(|i| {
        let mut d = (a[i] - b[i]).abs();
        d = d.min(1.0 - d);
        d < FRAC_TOL
    })
}
