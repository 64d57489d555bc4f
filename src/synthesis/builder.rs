use crate::core::structure::Crystal;
use crate::math::{integer_basis, lll};
use anyhow::{anyhow, Result};
use log::warn;
use nalgebra::{Matrix3, Vector3};

type Cartesian3 = Vector3<f64>;

/// Geometry of one slab box: in-plane basis plus stacking axis.
#[derive(Debug, Clone)]
pub struct SlabGeometry {
    pub basis: Matrix3<f64>,
    pub d_hkl: f64,
    pub n_layers: usize,
    pub vacuum_thickness: f64,
}

pub struct SlabBuilder {
    hkl: [i32; 3],
    min_slab: f64,
    min_vacuum: f64,
}

impl SlabBuilder {
    pub fn new(hkl: [i32; 3], min_slab: f64, min_vacuum: f64) -> Self {
        Self {
            hkl,
            min_slab,
            min_vacuum,
        }
    }

    pub fn compute_geometry(&self, crystal: &Crystal) -> Result<SlabGeometry> {
        let [h, k, l] = self.hkl;

        // Primitive integer basis in the cleavage plane, Gauss-reduced.
        let (u_raw, v_raw) = integer_basis::in_plane_basis(self.hkl)?;
        let (u_int, v_int) = lll::reduce_2d_integer(u_raw, v_raw);

        let u_cart: Cartesian3 = crystal
            .lattice
            .to_cartesian(&u_int.map(|x| x as f64));
        let v_cart: Cartesian3 = crystal
            .lattice
            .to_cartesian(&v_int.map(|x| x as f64));

        let len_u = u_cart.norm();
        let len_v = v_cart.norm();
        let ratio = if len_u > len_v {
            len_u / len_v
        } else {
            len_v / len_u
        };
        if ratio > 5.0 {
            warn!(
                "high aspect ratio ({:.1}) for surface ({} {} {})",
                ratio, h, k, l
            );
        }

        let reciprocal_n = crystal.lattice.reciprocal_matrix
            * Vector3::new(h as f64, k as f64, l as f64);
        let g_norm = reciprocal_n.norm();
        if g_norm < 1e-9 {
            return Err(anyhow!("invalid Miller index ({} {} {})", h, k, l));
        }
        let d_hkl = 1.0 / g_norm;

        // Minimum-thickness contract: never produce fewer layers than the
        // requested slab size covers.
        let n_layers = (self.min_slab / d_hkl).ceil().max(1.0) as usize;
        let slab_height = n_layers as f64 * d_hkl;

        let normal = reciprocal_n.normalize();
        let c_slab: Cartesian3 = normal * (slab_height + self.min_vacuum);

        let mut basis = Matrix3::from_columns(&[u_cart, v_cart, c_slab]);

        // Reduce only the in-plane pair. A huge placeholder Z keeps LLL
        // from mixing the stacking axis into a and b.
        let temp_basis =
            Matrix3::from_columns(&[u_cart, v_cart, normal * 10000.0]);
        let reduced = lll::lll_reduce(temp_basis);
        basis.set_column(0, &reduced.column(0));
        basis.set_column(1, &reduced.column(1));

        Ok(SlabGeometry {
            basis,
            d_hkl,
            n_layers,
            vacuum_thickness: self.min_vacuum,
        })
    }
}
