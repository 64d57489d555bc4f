use crate::core::structure::{Crystal, Site};
use crate::synthesis::builder::SlabGeometry;
use anyhow::{anyhow, Result};
use nalgebra::Vector3;

pub struct SlabPopulator;

impl SlabPopulator {
    /// Fills the slab box with atoms from the bulk.
    ///
    /// `shift` is the cleavage offset in layer units: an atom with plane
    /// coordinate P is kept when shift <= P < shift + n_layers. Working
    /// in layer-index space rather than Angstroms avoids precision loss
    /// for high-index planes.
    pub fn populate(
        crystal: &Crystal,
        geometry: &SlabGeometry,
        shift: f64,
        center_slab: bool,
    ) -> Result<Vec<Site>> {
        let slab_c = geometry.basis.column(2);
        let slab_normal = slab_c.normalize();

        let n_layers_float = geometry.n_layers as f64;
        let epsilon = 1e-3;
        let min_idx = shift - epsilon;
        let max_idx = shift + n_layers_float - epsilon;

        // Sweep range: enough bulk cell images to cover the slab height.
        let proj_a = crystal.lattice.matrix.column(0).dot(&slab_normal).abs();
        let proj_b = crystal.lattice.matrix.column(1).dot(&slab_normal).abs();
        let proj_c = crystal.lattice.matrix.column(2).dot(&slab_normal).abs();
        let cell_height = proj_a.max(proj_b).max(proj_c);
        if cell_height < 1e-9 {
            return Err(anyhow!("degenerate unit cell (zero height)"));
        }

        let total_slab_height = n_layers_float * geometry.d_hkl;
        let repeats = (total_slab_height / cell_height).ceil() as i32 + 3;

        let mut kept: Vec<(Site, Vector3<f64>)> = Vec::new();
        for i in -repeats..=repeats {
            for j in -repeats..=repeats {
                for k in -repeats..=repeats {
                    let cell_shift = crystal
                        .lattice
                        .to_cartesian(&Vector3::new(i as f64, j as f64, k as f64));

                    for site in &crystal.sites {
                        let pos = crystal.lattice.to_cartesian(&site.coords()) + cell_shift;
                        let layer_val = pos.dot(&slab_normal) / geometry.d_hkl;

                        if layer_val >= min_idx && layer_val < max_idx {
                            kept.push((site.clone(), pos));
                        }
                    }
                }
            }
        }

        if kept.is_empty() {
            return Err(anyhow!(
                "generated slab is empty; thickness may be too small for this plane"
            ));
        }

        // Place the material in the box: centred, or at the bottom with
        // all vacuum above.
        let mut min_z = f64::INFINITY;
        let mut max_z = f64::NEG_INFINITY;
        for (_, pos) in &kept {
            let z = pos.dot(&slab_normal);
            min_z = min_z.min(z);
            max_z = max_z.max(z);
        }
        let material_thickness = max_z - min_z;
        let box_height = slab_c.norm();
        let target_z_start = if center_slab {
            (box_height - material_thickness) / 2.0
        } else {
            0.0
        };
        let shift_vec = slab_normal * (target_z_start - min_z);

        let basis_inv = geometry
            .basis
            .try_inverse()
            .ok_or_else(|| anyhow!("slab basis is singular"))?;

        let mut sites: Vec<Site> = Vec::new();
        for (site, pos) in kept {
            let frac = basis_inv * (pos + shift_vec);
            // Wrap in-plane coordinates; z stays as placed so the vacuum
            // region is preserved.
            let wrapped = [
                frac.x.rem_euclid(1.0),
                frac.y.rem_euclid(1.0),
                frac.z,
            ];
            // The cell-image sweep visits every periodic copy; drop
            // images that land on an already-kept site.
            let duplicate = sites.iter().any(|s: &Site| {
                s.element == site.element
                    && (0..3).all(|i| {
                        let mut d = (s.fractional_coords[i] - wrapped[i]).abs();
                        if i < 2 {
                            d = d.min(1.0 - d);
                        }
                        d < 1e-4
                    })
            });
            if !duplicate {
                sites.push(Site {
                    fractional_coords: wrapped,
                    ..site
                });
            }
        }

        Ok(sites)
    }
}
