use crate::core::structure::Crystal;

/// Enumerates candidate cleavage shifts for a Miller plane.
///
/// Every bulk site projects onto the plane coordinate
/// P = h*u + k*v + l*w (mod 1), which advances by exactly one per
/// interplanar spacing. Sites cluster into atomic planes; cutting
/// between two adjacent clusters gives a distinct termination, so the
/// candidate shifts are the midpoints between consecutive cluster
/// positions, wrapping around the unit interval.
pub fn enumerate_shifts(crystal: &Crystal, hkl: [i32; 3], ftol: f64) -> Vec<f64> {
    let mut projections: Vec<f64> = crystal
        .sites
        .iter()
        .map(|site| {
            let c = site.coords();
            let p = hkl[0] as f64 * c.x + hkl[1] as f64 * c.y + hkl[2] as f64 * c.z;
            p.rem_euclid(1.0)
        })
        .collect();
    projections.sort_by(|a, b| a.partial_cmp(b).expect("projections are finite"));

    // Cluster sorted projections, merging the wrap-around pair.
    let mut cluster_centres: Vec<f64> = Vec::new();
    let mut current: Vec<f64> = vec![projections[0]];
    for &p in &projections[1..] {
        if p - current.last().copied().unwrap_or(p) < ftol {
            current.push(p);
        } else {
            cluster_centres.push(mean(&current));
            current = vec![p];
        }
    }
    cluster_centres.push(mean(&current));

    if cluster_centres.len() > 1 {
        let first = cluster_centres[0];
        let last = *cluster_centres.last().expect("at least two clusters");
        if first + 1.0 - last < ftol {
            // First and last clusters are the same plane across the seam.
            let merged = ((first + last - 1.0) / 2.0).rem_euclid(1.0);
            cluster_centres.pop();
            cluster_centres[0] = merged;
            cluster_centres.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        }
    }

    // Midpoints between consecutive clusters; the final shift wraps.
    let n = cluster_centres.len();
    let mut shifts: Vec<f64> = Vec::with_capacity(n);
    for i in 0..n {
        let a = cluster_centres[i];
        let b = if i + 1 < n {
            cluster_centres[i + 1]
        } else {
            cluster_centres[0] + 1.0
        };
        shifts.push(((a + b) / 2.0).rem_euclid(1.0));
    }
    shifts.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
    shifts.dedup_by(|a, b| (*a - *b).abs() < ftol);
    shifts
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
