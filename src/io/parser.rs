use crate::core::structure::{Crystal, Lattice, Site};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads a bulk structure, dispatching on file extension. `.cif` gets
/// the CIF parser; everything else (POSCAR, CONTCAR, `.vasp`,
/// `.poscar`) is treated as VASP POSCAR, the default structure format.
pub fn from_file(path: &Path) -> Result<Crystal> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "cif" => from_cif(path),
        _ => from_poscar(path),
    }
}

/// Parses a float from a CIF field, stripping uncertainty parentheses.
/// Example: "1.234(5)" -> 1.234
fn parse_cif_float(s: &str) -> Result<f64> {
    let clean = s.split('(').next().unwrap_or(s);
    clean
        .parse::<f64>()
        .with_context(|| format!("failed to parse '{}' as float", s))
}

/// Manual CIF parser. Handles the key-value cell block plus the
/// atom_site loop, which covers P1 cells written by most codes.
pub fn from_cif(path: &Path) -> Result<Crystal> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read CIF file {:?}", path))?;
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut cell: HashMap<&str, f64> = HashMap::new();
    let mut sites = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("_cell_") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(value) = parse_cif_float(parts[1]) {
                    cell.insert(parts[0], value);
                }
            }
        } else if line.starts_with("loop_") {
            i += 1;
            let mut headers = Vec::new();
            while i < lines.len() && lines[i].starts_with('_') {
                headers.push(lines[i]);
                i += 1;
            }

            if headers.contains(&"_atom_site_fract_x") {
                let col = |name: &str| {
                    headers
                        .iter()
                        .position(|&h| h == name)
                        .with_context(|| format!("CIF missing '{}'", name))
                };
                // Some writers only emit the label column; fall back to it.
                let symbol_idx = col("_atom_site_type_symbol")
                    .or_else(|_| col("_atom_site_label"))?;
                let x_idx = col("_atom_site_fract_x")?;
                let y_idx = col("_atom_site_fract_y")?;
                let z_idx = col("_atom_site_fract_z")?;
                let max_idx = symbol_idx.max(x_idx).max(y_idx).max(z_idx);

                while i < lines.len()
                    && !lines[i].starts_with('_')
                    && !lines[i].starts_with("loop_")
                {
                    let row: Vec<&str> = lines[i].split_whitespace().collect();
                    if row.len() > max_idx {
                        let element = strip_label_digits(row[symbol_idx]);
                        let x = parse_cif_float(row[x_idx])?;
                        let y = parse_cif_float(row[y_idx])?;
                        let z = parse_cif_float(row[z_idx])?;
                        sites.push(Site::new(element, Vector3::new(x, y, z)));
                    }
                    i += 1;
                }
                // Outer loop increments again.
                i -= 1;
            }
        }
        i += 1;
    }

    let get = |key: &str| -> Result<f64> {
        cell.get(key)
            .copied()
            .ok_or_else(|| anyhow!("CIF missing tag: {}", key))
    };

    let lattice = Lattice::from_parameters(
        get("_cell_length_a")?,
        get("_cell_length_b")?,
        get("_cell_length_c")?,
        get("_cell_angle_alpha")?,
        get("_cell_angle_beta")?,
        get("_cell_angle_gamma")?,
    )?;

    if sites.is_empty() {
        bail!("no atoms found in CIF file {:?}", path);
    }
    Ok(Crystal::new(lattice, sites)?)
}

/// Strips trailing site-label digits: "Mg1" -> "Mg".
fn strip_label_digits(label: &str) -> String {
    label
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_string()
}

/// Parses a VASP 5 POSCAR (element-symbol line required). Supports
/// Selective dynamics and both Direct and Cartesian coordinates.
pub fn from_poscar(path: &Path) -> Result<Crystal> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read POSCAR file {:?}", path))?;
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());

    let _comment = lines.next().ok_or_else(|| anyhow!("empty POSCAR"))?;
    let scale: f64 = lines
        .next()
        .ok_or_else(|| anyhow!("POSCAR missing scale line"))?
        .parse()
        .context("POSCAR scale is not a number")?;

    let mut read_vector = |what: &str| -> Result<Vector3<f64>> {
        let line = lines
            .next()
            .ok_or_else(|| anyhow!("POSCAR missing {} vector", what))?;
        let v: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("bad {} vector: '{}'", what, line))?;
        if v.len() != 3 {
            bail!("{} vector does not have three components", what);
        }
        Ok(Vector3::new(v[0], v[1], v[2]) * scale)
    };
    let a = read_vector("a")?;
    let b = read_vector("b")?;
    let c = read_vector("c")?;
    let lattice = Lattice::new(Matrix3::from_columns(&[a, b, c]))?;

    let symbols_line = lines
        .next()
        .ok_or_else(|| anyhow!("POSCAR missing element symbols line"))?;
    if symbols_line
        .split_whitespace()
        .next()
        .map(|t| t.parse::<usize>().is_ok())
        .unwrap_or(true)
    {
        bail!("POSCAR has no element symbol line (VASP 4 format is not supported)");
    }
    let symbols: Vec<&str> = symbols_line.split_whitespace().collect();

    let counts_line = lines
        .next()
        .ok_or_else(|| anyhow!("POSCAR missing element counts line"))?;
    let counts: Vec<usize> = counts_line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("bad counts line: '{}'", counts_line))?;
    if symbols.len() != counts.len() {
        bail!(
            "POSCAR symbol/count mismatch: {} symbols, {} counts",
            symbols.len(),
            counts.len()
        );
    }

    let mut mode_line = lines
        .next()
        .ok_or_else(|| anyhow!("POSCAR missing coordinate mode line"))?;
    let selective = mode_line.to_ascii_lowercase().starts_with('s');
    if selective {
        mode_line = lines
            .next()
            .ok_or_else(|| anyhow!("POSCAR missing coordinate mode line"))?;
    }
    let cartesian = {
        let first = mode_line
            .chars()
            .next()
            .map(|ch| ch.to_ascii_lowercase())
            .unwrap_or('d');
        first == 'c' || first == 'k'
    };

    let mut sites = Vec::new();
    for (symbol, count) in symbols.iter().zip(&counts) {
        for _ in 0..*count {
            let line = lines
                .next()
                .ok_or_else(|| anyhow!("POSCAR ended before all coordinates were read"))?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                bail!("bad coordinate line: '{}'", line);
            }
            let x: f64 = tokens[0].parse().context("bad x coordinate")?;
            let y: f64 = tokens[1].parse().context("bad y coordinate")?;
            let z: f64 = tokens[2].parse().context("bad z coordinate")?;
            let raw = Vector3::new(x, y, z);
            let frac = if cartesian {
                lattice.to_fractional(&(raw * scale))
            } else {
                raw
            };

            let mut site = Site::new(*symbol, frac);
            if selective && tokens.len() >= 6 {
                let flag = |t: &str| t.eq_ignore_ascii_case("T");
                site.selective_dynamics =
                    Some([flag(tokens[3]), flag(tokens[4]), flag(tokens[5])]);
            }
            sites.push(site);
        }
    }

    Ok(Crystal::new(lattice, sites)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    const MGO_POSCAR: &str = "\
MgO
1.0
4.2 0.0 0.0
0.0 4.2 0.0
0.0 0.0 4.2
Mg O
2 2
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.0
0.0 0.5 0.0
";

    const MGO_CIF: &str = "\
data_MgO
_cell_length_a 4.212
_cell_length_b 4.212
_cell_length_c 4.212
_cell_angle_alpha 90.0
_cell_angle_beta 90.0
_cell_angle_gamma 90.0
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Mg 0.0 0.0 0.0
O 0.5 0.5 0.5
";

    #[test]
    fn poscar_direct_coordinates() {
        let (_dir, path) = write_temp("POSCAR", MGO_POSCAR);
        let crystal = from_file(&path).unwrap();
        assert_eq!(crystal.sites.len(), 4);
        assert_eq!(crystal.sites[0].element, "Mg");
        assert_eq!(crystal.sites[2].element, "O");
        let (a, _, _, alpha, _, _) = crystal.lattice.to_parameters();
        assert!((a - 4.2).abs() < 1e-9);
        assert!((alpha - 90.0).abs() < 1e-9);
    }

    #[test]
    fn poscar_selective_dynamics_flags() {
        let poscar = "\
slab
1.0
4.0 0.0 0.0
0.0 4.0 0.0
0.0 0.0 20.0
Mg
2
Selective dynamics
Direct
0.0 0.0 0.2 T T T
0.0 0.0 0.4 F F F
";
        let (_dir, path) = write_temp("POSCAR", poscar);
        let crystal = from_file(&path).unwrap();
        assert_eq!(
            crystal.sites[0].selective_dynamics,
            Some([true, true, true])
        );
        assert_eq!(
            crystal.sites[1].selective_dynamics,
            Some([false, false, false])
        );
    }

    #[test]
    fn poscar_vasp4_rejected() {
        let poscar = "\
comment
1.0
4.0 0.0 0.0
0.0 4.0 0.0
0.0 0.0 4.0
2 2
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.0
0.0 0.5 0.0
";
        let (_dir, path) = write_temp("POSCAR", poscar);
        assert!(from_file(&path).is_err());
    }

    #[test]
    fn cif_with_uncertainties() {
        let (_dir, path) = write_temp("mgo.cif", MGO_CIF);
        let crystal = from_file(&path).unwrap();
        assert_eq!(crystal.sites.len(), 2);
        assert_eq!(crystal.reduced_formula(), "MgO");
    }

    #[test]
    fn cif_label_column_fallback() {
        let cif = MGO_CIF
            .replace("_atom_site_type_symbol", "_atom_site_label")
            .replace("Mg 0.0", "Mg1 0.0")
            .replace("O 0.5", "O1 0.5");
        let (_dir, path) = write_temp("labelled.cif", &cif);
        let crystal = from_file(&path).unwrap();
        assert_eq!(crystal.sites[0].element, "Mg");
        assert_eq!(crystal.sites[1].element, "O");
    }
}
