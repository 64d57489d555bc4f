use crate::core::structure::Slab;
use crate::io::config::CalcConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Writes INCAR, KPOINTS and POTCAR.spec for one slab into `dir`.
/// Only VASP-style input files are supported; no pseudopotential data
/// is shipped, so POTCAR.spec lists the labels for the user to
/// assemble a POTCAR from their own pseudopotential library.
pub fn write_input_files(slab: &Slab, dir: &Path, config: &CalcConfig) -> Result<()> {
    fs::write(dir.join("INCAR"), render_incar(config))
        .with_context(|| format!("could not write INCAR in {:?}", dir))?;
    fs::write(dir.join("KPOINTS"), render_kpoints(slab, config))
        .with_context(|| format!("could not write KPOINTS in {:?}", dir))?;
    fs::write(dir.join("POTCAR.spec"), render_potcar_spec(slab, config))
        .with_context(|| format!("could not write POTCAR.spec in {:?}", dir))?;
    Ok(())
}

/// `TAG = value` lines, sorted by tag. Booleans render as Fortran
/// logicals.
pub fn render_incar(config: &CalcConfig) -> String {
    let mut out = String::new();
    for (tag, value) in &config.incar {
        let _ = writeln!(out, "{} = {}", tag, render_value(value));
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => ".TRUE.".to_string(),
        Value::Bool(false) => ".FALSE.".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Gamma-centred mesh sized from `reciprocal_density` (k-points per
/// cubic reciprocal Angstrom): n_i = round(|b_i| * density^(1/3)).
pub fn render_kpoints(slab: &Slab, config: &CalcConfig) -> String {
    let density = config
        .kpoints
        .get("reciprocal_density")
        .and_then(Value::as_f64)
        .unwrap_or(40.0);

    let lattice = &slab.structure.lattice;
    let scale = density.cbrt();
    let mesh: Vec<usize> = (0..3)
        .map(|i| {
            let b = lattice.reciprocal_matrix.column(i).norm() * 2.0 * std::f64::consts::PI;
            ((b * scale).round() as usize).max(1)
        })
        .collect();

    format!(
        "Gamma-centred mesh from reciprocal density {}\n0\nGamma\n{} {} {}\n0 0 0\n",
        density, mesh[0], mesh[1], mesh[2]
    )
}

/// One pseudopotential label per element line, in POSCAR group order.
pub fn render_potcar_spec(slab: &Slab, config: &CalcConfig) -> String {
    let mut out = String::new();
    for element in slab.structure.composition().keys() {
        let _ = writeln!(out, "{}", config.potcar_label(element));
    }
    out
}
