use nalgebra::{Matrix3, Vector3};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("lattice has zero or near-zero volume")]
    DegenerateLattice,
    #[error("lattice is not invertible")]
    SingularLattice,
    #[error("invalid lattice angles: alpha={alpha}, beta={beta}, gamma={gamma}")]
    InvalidAngles { alpha: f64, beta: f64, gamma: f64 },
    #[error("structure contains no sites")]
    Empty,
}

/// Crystal lattice: column-vector basis matrix plus the cached reciprocal.
#[derive(Debug, Clone, Serialize)]
pub struct Lattice {
    #[serde(serialize_with = "serialize_matrix")]
    pub matrix: Matrix3<f64>,
    #[serde(skip)]
    pub reciprocal_matrix: Matrix3<f64>,
}

fn serialize_matrix<S>(m: &Matrix3<f64>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let rows: Vec<Vec<f64>> = (0..3)
        .map(|i| (0..3).map(|j| m[(i, j)]).collect())
        .collect();
    rows.serialize(s)
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, StructureError> {
        if matrix.determinant().abs() < 1e-6 {
            return Err(StructureError::DegenerateLattice);
        }
        let reciprocal_matrix = matrix
            .try_inverse()
            .ok_or(StructureError::SingularLattice)?
            .transpose();
        Ok(Self {
            matrix,
            reciprocal_matrix,
        })
    }

    pub fn from_parameters(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, StructureError> {
        let alpha_r = alpha.to_radians();
        let beta_r = beta.to_radians();
        let gamma_r = gamma.to_radians();

        let term = 1.0 - alpha_r.cos().powi(2) - beta_r.cos().powi(2) - gamma_r.cos().powi(2)
            + 2.0 * alpha_r.cos() * beta_r.cos() * gamma_r.cos();

        if term <= 0.0 {
            return Err(StructureError::InvalidAngles { alpha, beta, gamma });
        }

        let volume = a * b * c * term.sqrt();
        let matrix = Matrix3::new(
            a,
            b * gamma_r.cos(),
            c * beta_r.cos(),
            0.0,
            b * gamma_r.sin(),
            c * (alpha_r.cos() - beta_r.cos() * gamma_r.cos()) / gamma_r.sin(),
            0.0,
            0.0,
            volume / (a * b * gamma_r.sin()),
        );
        Self::new(matrix)
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * frac
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.reciprocal_matrix.transpose() * cart
    }

    pub fn to_parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let a = self.matrix.column(0).norm();
        let b = self.matrix.column(1).norm();
        let c = self.matrix.column(2).norm();
        let alpha = (self.matrix.column(1).dot(&self.matrix.column(2)) / (b * c))
            .acos()
            .to_degrees();
        let beta = (self.matrix.column(0).dot(&self.matrix.column(2)) / (a * c))
            .acos()
            .to_degrees();
        let gamma = (self.matrix.column(0).dot(&self.matrix.column(1)) / (a * b))
            .acos()
            .to_degrees();
        (a, b, c, alpha, beta, gamma)
    }

    /// Metric tensor G = M^T M, used by the symmetry search.
    pub fn metric_tensor(&self) -> Matrix3<f64> {
        self.matrix.transpose() * self.matrix
    }

    /// Interplanar spacing for the (h k l) family of planes.
    pub fn d_hkl(&self, hkl: [i32; 3]) -> f64 {
        let g = self.reciprocal_matrix
            * Vector3::new(hkl[0] as f64, hkl[1] as f64, hkl[2] as f64);
        1.0 / g.norm()
    }

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub element: String,
    pub fractional_coords: [f64; 3],
    /// Formal oxidation state, set by the decoration pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxidation_state: Option<f64>,
    /// Selective-dynamics flags (T T T = free to relax). POSCAR only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selective_dynamics: Option<[bool; 3]>,
}

impl Site {
    pub fn new(element: impl Into<String>, coords: Vector3<f64>) -> Self {
        Self {
            element: element.into(),
            fractional_coords: [coords.x, coords.y, coords.z],
            oxidation_state: None,
            selective_dynamics: None,
        }
    }

    pub fn coords(&self) -> Vector3<f64> {
        Vector3::new(
            self.fractional_coords[0],
            self.fractional_coords[1],
            self.fractional_coords[2],
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Crystal {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
}

impl Crystal {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Result<Self, StructureError> {
        if sites.is_empty() {
            return Err(StructureError::Empty);
        }
        Ok(Self { lattice, sites })
    }

    /// Element -> count tally, alphabetical.
    pub fn composition(&self) -> BTreeMap<String, usize> {
        let mut tally = BTreeMap::new();
        for site in &self.sites {
            *tally.entry(site.element.clone()).or_insert(0) += 1;
        }
        tally
    }

    /// Reduced formula, e.g. 8 Mg + 8 O -> "MgO".
    pub fn reduced_formula(&self) -> String {
        let tally = self.composition();
        let div = tally.values().fold(0, |acc, &n| gcd(acc, n));
        let mut out = String::new();
        for (el, n) in &tally {
            out.push_str(el);
            let n = n / div.max(1);
            if n > 1 {
                out.push_str(&n.to_string());
            }
        }
        out
    }

    /// True iff every site carries an oxidation state.
    pub fn has_oxidation_states(&self) -> bool {
        self.sites.iter().all(|s| s.oxidation_state.is_some())
    }

    pub fn total_charge(&self) -> f64 {
        self.sites.iter().filter_map(|s| s.oxidation_state).sum()
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// A generated surface slab with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Slab {
    pub structure: Crystal,
    /// Miller index of the cleavage plane.
    pub hkl: [i32; 3],
    /// Requested minimum slab thickness in Angstroms.
    pub slab_thickness: f64,
    /// Requested minimum vacuum thickness in Angstroms.
    pub vacuum_thickness: f64,
    /// Number of atomic layers in the slab.
    pub slab_layers: usize,
    /// Termination index within the (hkl, slab, vacuum) combination.
    pub slab_index: usize,
    /// Fractional cleavage shift that produced this termination.
    pub shift: f64,
}

impl Slab {
    /// Miller index as a compact digit string, e.g. (0,0,1) -> "001",
    /// (-1,0,2) -> "-102". Used in directory and file names.
    pub fn hkl_string(&self) -> String {
        self.hkl.iter().map(|i| i.to_string()).collect()
    }

    /// The `hkl_slab_vac_index` label used in filenames and log messages.
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.hkl_string(),
            self.slab_thickness,
            self.vacuum_thickness,
            self.slab_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> Lattice {
        Lattice::new(Matrix3::identity() * a).unwrap()
    }

    #[test]
    fn cubic_d_spacing() {
        let lattice = cubic(4.0);
        assert!((lattice.d_hkl([0, 0, 1]) - 4.0).abs() < 1e-10);
        assert!((lattice.d_hkl([1, 1, 0]) - 4.0 / 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn parameters_roundtrip() {
        let lattice = Lattice::from_parameters(3.0, 4.0, 5.0, 90.0, 90.0, 120.0).unwrap();
        let (a, b, c, alpha, beta, gamma) = lattice.to_parameters();
        assert!((a - 3.0).abs() < 1e-8);
        assert!((b - 4.0).abs() < 1e-8);
        assert!((c - 5.0).abs() < 1e-8);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 120.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_lattice_rejected() {
        let matrix = Matrix3::new(1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(Lattice::new(matrix).is_err());
    }

    #[test]
    fn reduced_formula_divides_counts() {
        let lattice = cubic(4.2);
        let mut sites = Vec::new();
        for i in 0..4 {
            sites.push(Site::new("Mg", Vector3::new(0.25 * i as f64, 0.0, 0.0)));
            sites.push(Site::new("O", Vector3::new(0.25 * i as f64, 0.5, 0.5)));
        }
        let crystal = Crystal::new(lattice, sites).unwrap();
        assert_eq!(crystal.reduced_formula(), "MgO");
    }

    #[test]
    fn slab_label_format() {
        let lattice = cubic(4.0);
        let crystal =
            Crystal::new(lattice, vec![Site::new("Mg", Vector3::zeros())]).unwrap();
        let slab = Slab {
            structure: crystal,
            hkl: [0, 0, 1],
            slab_thickness: 20.0,
            vacuum_thickness: 30.0,
            slab_layers: 10,
            slab_index: 1,
            shift: 0.0,
        };
        assert_eq!(slab.hkl_string(), "001");
        assert_eq!(slab.label(), "001_20_30_1");
    }
}
