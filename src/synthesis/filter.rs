use crate::core::structure::Slab;
use crate::core::symmetry;

/// Dipole tolerance along the surface normal, e*Angstrom per site.
const DIPOLE_TOL_PER_SITE: f64 = 0.01;

/// Net dipole moment along the stacking axis from the formal charges,
/// measured about the site centroid. Guessed or per-site states can
/// leave the cell with a net charge, and an origin-referenced sum
/// would then depend on where the slab sits in the box.
pub fn dipole_along_normal(slab: &Slab) -> f64 {
    let c = slab.structure.lattice.matrix.column(2);
    let normal = c.normalize();
    let zs: Vec<f64> = slab
        .structure
        .sites
        .iter()
        .map(|site| slab.structure.lattice.to_cartesian(&site.coords()).dot(&normal))
        .collect();
    let centroid = zs.iter().sum::<f64>() / zs.len() as f64;
    slab.structure
        .sites
        .iter()
        .zip(&zs)
        .map(|(site, &z)| site.oxidation_state.unwrap_or(0.0) * (z - centroid))
        .sum()
}

/// Tasker III check: a slab with a net dipole perpendicular to the
/// surface is polar and gets filtered out.
pub fn is_polar(slab: &Slab) -> bool {
    let tol = DIPOLE_TOL_PER_SITE * slab.structure.sites.len() as f64;
    dipole_along_normal(slab).abs() > tol
}

pub fn is_symmetric(slab: &Slab) -> bool {
    symmetry::has_inversion_symmetry(&slab.structure)
}

/// Result of the uniqueness pass: surviving slabs plus the labels of
/// dropped repeats and of slabs that exceeded the size threshold.
#[derive(Debug, Default)]
pub struct FilterReport {
    pub unique: Vec<Slab>,
    pub repeats: Vec<String>,
    pub oversized: Vec<String>,
}

/// Deduplicates identical slabs across the whole run and flags any that
/// are larger than `max_size` atoms. Oversized slabs are kept; the
/// threshold only drives a warning.
pub fn filter_unique(provisional: Vec<Slab>, max_size: usize) -> FilterReport {
    let mut report = FilterReport::default();
    let mut fingerprints: Vec<Vec<(String, [i64; 3])>> = Vec::new();

    for slab in provisional {
        let fp = fingerprint(&slab);
        if fingerprints.contains(&fp) {
            report.repeats.push(slab.label());
            continue;
        }
        fingerprints.push(fp);

        if slab.structure.sites.len() > max_size {
            report.oversized.push(slab.label());
        }
        report.unique.push(slab);
    }
    report
}

fn fingerprint(slab: &Slab) -> Vec<(String, [i64; 3])> {
    let mut fp: Vec<(String, [i64; 3])> = slab
        .structure
        .sites
        .iter()
        .map(|site| {
            let c = site.fractional_coords;
            (
                site.element.clone(),
                [round_key(c[0]), round_key(c[1]), round_key(c[2])],
            )
        })
        .collect();
    fp.sort();
    fp
}

fn round_key(x: f64) -> i64 {
    (x * 1e3).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Crystal, Lattice, Site, Slab};
    use nalgebra::{Matrix3, Vector3};

    fn slab_with_charges(charges: &[(f64, f64)], index: usize) -> Slab {
        // (z, q) pairs in a 20 A tall box.
        let lattice = Lattice::new(Matrix3::from_diagonal(&Vector3::new(
            4.0, 4.0, 20.0,
        )))
        .unwrap();
        let sites = charges
            .iter()
            .enumerate()
            .map(|(i, &(z, q))| {
                let mut s = Site::new(
                    if q >= 0.0 { "Mg" } else { "O" },
                    Vector3::new(0.1 * i as f64, 0.0, z / 20.0),
                );
                s.oxidation_state = Some(q);
                s
            })
            .collect();
        Slab {
            structure: Crystal::new(lattice, sites).unwrap(),
            hkl: [0, 0, 1],
            slab_thickness: 10.0,
            vacuum_thickness: 10.0,
            slab_layers: charges.len(),
            slab_index: index,
            shift: 0.0,
        }
    }

    #[test]
    fn alternating_charge_stack_is_polar() {
        let slab = slab_with_charges(&[(5.0, 2.0), (7.0, -2.0), (9.0, 2.0), (11.0, -2.0)], 0);
        assert!(is_polar(&slab));
    }

    #[test]
    fn mirror_symmetric_stack_is_nonpolar() {
        let slab = slab_with_charges(
            &[(5.0, -2.0), (7.0, 2.0), (9.0, 2.0), (11.0, -2.0)],
            0,
        );
        assert!(!is_polar(&slab));
    }

    #[test]
    fn net_charged_symmetric_stack_is_nonpolar() {
        // Two +1 sites mirrored about the slab centre: the cell carries
        // a net charge, but the dipole about the centroid is zero.
        let slab = slab_with_charges(&[(8.0, 1.0), (12.0, 1.0)], 0);
        assert!(dipole_along_normal(&slab).abs() < 1e-9);
        assert!(!is_polar(&slab));
    }

    #[test]
    fn duplicate_slabs_are_reported_once() {
        let a = slab_with_charges(&[(5.0, 2.0), (7.0, -2.0)], 0);
        let b = slab_with_charges(&[(5.0, 2.0), (7.0, -2.0)], 1);
        let report = filter_unique(vec![a, b], 500);
        assert_eq!(report.unique.len(), 1);
        assert_eq!(report.repeats, vec!["001_10_10_1".to_string()]);
    }

    #[test]
    fn oversized_slabs_are_kept_but_flagged() {
        let slab = slab_with_charges(&[(5.0, 2.0), (7.0, -2.0)], 0);
        let report = filter_unique(vec![slab], 1);
        assert_eq!(report.unique.len(), 1);
        assert_eq!(report.oversized.len(), 1);
    }
}
