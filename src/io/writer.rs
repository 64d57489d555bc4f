use crate::core::structure::{Crystal, Slab};
use crate::io::config::CalcConfig;
use crate::io::inputs;
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Output structure-file format, `--fmt` on the CLI. Not case sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Poscar,
    Cif,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "poscar" | "vasp" => Ok(Self::Poscar),
            "cif" => Ok(Self::Cif),
            "json" => Ok(Self::Json),
            other => bail!("unsupported output format '{}'", other),
        }
    }
}

/// Options for persisting a batch of slabs.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub root: PathBuf,
    /// One folder per termination: `hkl/slab_vac_index/NAME`.
    pub make_fols: bool,
    /// Also write INCAR, KPOINTS and POTCAR.spec into each folder.
    pub make_input_files: bool,
    pub fmt: OutputFormat,
    /// Structure filename, e.g. "POSCAR". Case sensitive.
    pub name: String,
    pub config: CalcConfig,
}

/// Saves slabs using one of the two directory conventions:
///
/// * `make_fols` (or `make_input_files`): a Miller-index folder holding
///   `slab_vac_index` folders, e.g. `001/20_30_1/POSCAR`;
/// * flat layout otherwise: a bulk-formula folder of indexed files,
///   e.g. `MgO/POSCAR_001_20_30_1`.
pub fn slabs_to_file(slabs: &[Slab], bulk_formula: &str, opts: &SaveOptions) -> Result<()> {
    if opts.make_fols || opts.make_input_files {
        for slab in slabs {
            let dir = opts.root.join(slab.hkl_string()).join(format!(
                "{}_{}_{}",
                slab.slab_thickness, slab.vacuum_thickness, slab.slab_index
            ));
            fs::create_dir_all(&dir)
                .with_context(|| format!("could not create {:?}", dir))?;

            write_structure(&slab.structure, &dir.join(&opts.name), opts.fmt)?;
            if opts.make_input_files {
                inputs::write_input_files(slab, &dir, &opts.config)?;
            }
        }
    } else {
        let dir = opts.root.join(bulk_formula);
        fs::create_dir_all(&dir).with_context(|| format!("could not create {:?}", dir))?;
        for slab in slabs {
            let fname = format!("{}_{}", opts.name, slab.label());
            write_structure(&slab.structure, &dir.join(fname), opts.fmt)?;
        }
    }
    Ok(())
}

/// Serializes the whole run (slabs plus provenance) to
/// `{formula}_metadata.json`, or a caller-supplied filename.
pub fn save_metadata(
    slabs: &[Slab],
    bulk_formula: &str,
    root: &Path,
    json_fname: Option<&str>,
) -> Result<PathBuf> {
    let fname = json_fname
        .map(String::from)
        .unwrap_or_else(|| format!("{}_metadata.json", bulk_formula));
    let path = root.join(fname);
    let text = serde_json::to_string_pretty(slabs).context("serializing slab metadata")?;
    fs::write(&path, text).with_context(|| format!("could not write {:?}", path))?;
    Ok(path)
}

pub fn write_structure(crystal: &Crystal, path: &Path, fmt: OutputFormat) -> Result<()> {
    let text = match fmt {
        OutputFormat::Poscar => to_poscar(crystal),
        OutputFormat::Cif => to_cif(crystal),
        OutputFormat::Json => serde_json::to_string_pretty(crystal)
            .context("serializing structure to JSON")?,
    };
    fs::write(path, text).with_context(|| format!("could not write {:?}", path))?;
    Ok(())
}

/// Renders a VASP 5 POSCAR. Sites are grouped by element in
/// alphabetical order; a Selective dynamics block is emitted when any
/// site carries relaxation flags.
pub fn to_poscar(crystal: &Crystal) -> String {
    let composition = crystal.composition();
    let selective = crystal
        .sites
        .iter()
        .any(|s| s.selective_dynamics.is_some());

    let mut out = String::new();
    let _ = writeln!(out, "{}", crystal.reduced_formula());
    let _ = writeln!(out, "1.0");
    for col in 0..3 {
        let v = crystal.lattice.matrix.column(col);
        let _ = writeln!(out, "{:>20.10} {:>20.10} {:>20.10}", v.x, v.y, v.z);
    }
    let symbols: Vec<&String> = composition.keys().collect();
    let _ = writeln!(
        out,
        "{}",
        symbols
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let _ = writeln!(
        out,
        "{}",
        symbols
            .iter()
            .map(|s| composition[s.as_str()].to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    if selective {
        let _ = writeln!(out, "Selective dynamics");
    }
    let _ = writeln!(out, "Direct");

    for element in &symbols {
        for site in crystal.sites.iter().filter(|s| &&s.element == element) {
            let c = site.fractional_coords;
            let _ = write!(out, "{:>18.10} {:>18.10} {:>18.10}", c[0], c[1], c[2]);
            if selective {
                let flags = site.selective_dynamics.unwrap_or([true, true, true]);
                for f in flags {
                    let _ = write!(out, " {}", if f { "T" } else { "F" });
                }
            }
            let _ = writeln!(out);
        }
    }
    out
}

/// Renders a P1 CIF with the atom_site loop the parser understands.
pub fn to_cif(crystal: &Crystal) -> String {
    let (a, b, c, alpha, beta, gamma) = crystal.lattice.to_parameters();
    let mut out = String::new();
    let _ = writeln!(out, "data_{}", crystal.reduced_formula());
    let _ = writeln!(out, "_symmetry_space_group_name_H-M   'P 1'");
    let _ = writeln!(out, "_cell_length_a   {:.6}", a);
    let _ = writeln!(out, "_cell_length_b   {:.6}", b);
    let _ = writeln!(out, "_cell_length_c   {:.6}", c);
    let _ = writeln!(out, "_cell_angle_alpha   {:.6}", alpha);
    let _ = writeln!(out, "_cell_angle_beta   {:.6}", beta);
    let _ = writeln!(out, "_cell_angle_gamma   {:.6}", gamma);
    let _ = writeln!(out, "loop_");
    let _ = writeln!(out, "_atom_site_type_symbol");
    let _ = writeln!(out, "_atom_site_label");
    let _ = writeln!(out, "_atom_site_fract_x");
    let _ = writeln!(out, "_atom_site_fract_y");
    let _ = writeln!(out, "_atom_site_fract_z");
    for (i, site) in crystal.sites.iter().enumerate() {
        let c = site.fractional_coords;
        let _ = writeln!(
            out,
            "{} {}{} {:.8} {:.8} {:.8}",
            site.element, site.element, i, c[0], c[1], c[2]
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Crystal, Lattice, Site, Slab};
    use crate::io::config::load_config;
    use crate::io::parser;
    use nalgebra::{Matrix3, Vector3};

    fn mgo_slab(index: usize) -> Slab {
        let lattice = Lattice::new(Matrix3::from_diagonal(&Vector3::new(
            4.2, 4.2, 30.0,
        )))
        .unwrap();
        let sites = vec![
            Site::new("Mg", Vector3::new(0.0, 0.0, 0.4)),
            Site::new("O", Vector3::new(0.5, 0.5, 0.4)),
            Site::new("Mg", Vector3::new(0.5, 0.5, 0.5)),
            Site::new("O", Vector3::new(0.0, 0.0, 0.5)),
        ];
        Slab {
            structure: Crystal::new(lattice, sites).unwrap(),
            hkl: [0, 0, 1],
            slab_thickness: 20.0,
            vacuum_thickness: 30.0,
            slab_layers: 2,
            slab_index: index,
            shift: 0.25,
        }
    }

    fn save_opts(root: &Path, make_fols: bool, make_input_files: bool) -> SaveOptions {
        SaveOptions {
            root: root.to_path_buf(),
            make_fols,
            make_input_files,
            fmt: OutputFormat::Poscar,
            name: "POSCAR".to_string(),
            config: load_config(None).unwrap(),
        }
    }

    #[test]
    fn poscar_roundtrip_through_parser() {
        let slab = mgo_slab(0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("POSCAR");
        write_structure(&slab.structure, &path, OutputFormat::Poscar).unwrap();
        let reread = parser::from_file(&path).unwrap();
        assert_eq!(reread.sites.len(), 4);
        assert_eq!(reread.reduced_formula(), "MgO");
    }

    #[test]
    fn cif_roundtrip_through_parser() {
        let slab = mgo_slab(0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slab.cif");
        write_structure(&slab.structure, &path, OutputFormat::Cif).unwrap();
        let reread = parser::from_file(&path).unwrap();
        assert_eq!(reread.sites.len(), 4);
        assert_eq!(reread.reduced_formula(), "MgO");
    }

    #[test]
    fn folder_layout_per_termination() {
        let dir = tempfile::tempdir().unwrap();
        let slabs = vec![mgo_slab(0), mgo_slab(1)];
        slabs_to_file(&slabs, "MgO", &save_opts(dir.path(), true, false)).unwrap();
        assert!(dir.path().join("001/20_30_0/POSCAR").is_file());
        assert!(dir.path().join("001/20_30_1/POSCAR").is_file());
    }

    #[test]
    fn flat_layout_under_formula() {
        let dir = tempfile::tempdir().unwrap();
        let slabs = vec![mgo_slab(0)];
        slabs_to_file(&slabs, "MgO", &save_opts(dir.path(), false, false)).unwrap();
        assert!(dir.path().join("MgO/POSCAR_001_20_30_0").is_file());
    }

    #[test]
    fn input_files_written_alongside_structure() {
        let dir = tempfile::tempdir().unwrap();
        let slabs = vec![mgo_slab(0)];
        slabs_to_file(&slabs, "MgO", &save_opts(dir.path(), false, true)).unwrap();
        // make_input_files forces the folder layout even without -r.
        let leaf = dir.path().join("001/20_30_0");
        assert!(leaf.join("POSCAR").is_file());
        assert!(leaf.join("INCAR").is_file());
        assert!(leaf.join("KPOINTS").is_file());
        assert!(leaf.join("POTCAR.spec").is_file());
    }

    #[test]
    fn metadata_dump_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let slabs = vec![mgo_slab(0)];
        let path = save_metadata(&slabs, "MgO", dir.path(), None).unwrap();
        assert!(path.ends_with("MgO_metadata.json"));
        let text = fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["hkl"], serde_json::json!([0, 0, 1]));
        assert_eq!(parsed[0]["slab_layers"], serde_json::json!(2));
    }
}
