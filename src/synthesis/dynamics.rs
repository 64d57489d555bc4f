use crate::core::structure::Slab;

/// Plane clustering tolerance in Angstroms. Tight enough for high-index
/// surfaces where atomic planes sit close together.
const PLANE_TOL: f64 = 0.25;

/// Applies selective-dynamics flags: the top and bottom `layers_to_relax`
/// atomic planes are free, the interior is frozen. Slabs too thin to
/// keep at least one frozen plane are left untouched and their labels
/// returned for the caller to warn about.
pub fn apply_selective_dynamics(slabs: &mut [Slab], layers_to_relax: usize) -> Vec<String> {
    let mut too_thin = Vec::new();

    for slab in slabs.iter_mut() {
        let planes = cluster_planes(slab);

        if planes.len() <= 2 * layers_to_relax {
            too_thin.push(slab.label());
            continue;
        }

        let n_planes = planes.len();
        for (plane_idx, plane) in planes.into_iter().enumerate() {
            let relax =
                plane_idx < layers_to_relax || plane_idx >= n_planes - layers_to_relax;
            for site_idx in plane {
                slab.structure.sites[site_idx].selective_dynamics =
                    Some([relax, relax, relax]);
            }
        }
    }
    too_thin
}

/// Groups site indices into z-planes, bottom to top.
fn cluster_planes(slab: &Slab) -> Vec<Vec<usize>> {
    let lattice = &slab.structure.lattice;
    let normal = lattice.matrix.column(2).normalize();

    let mut indices: Vec<usize> = (0..slab.structure.sites.len()).collect();
    let z_of = |i: usize| {
        lattice
            .to_cartesian(&slab.structure.sites[i].coords())
            .dot(&normal)
    };
    indices.sort_by(|&a, &b| z_of(a).partial_cmp(&z_of(b)).expect("finite z"));

    let mut planes: Vec<Vec<usize>> = Vec::new();
    let mut current = vec![indices[0]];
    let mut current_z = z_of(indices[0]);
    for &idx in indices.iter().skip(1) {
        let z = z_of(idx);
        if (z - current_z).abs() < PLANE_TOL {
            current.push(idx);
        } else {
            planes.push(current);
            current = vec![idx];
            current_z = z;
        }
    }
    planes.push(current);
    planes
}
