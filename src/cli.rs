use crate::core::oxidation::OxidationSpec;
use crate::{GenerationConfig, MillerSpec};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Parses the `--hkl` values:
///
/// * one bare integer is a maximum index, e.g. `2`;
/// * one comma-delimited triple is a single index, e.g. `0,0,1`
///   (brackets tolerated: `(0,0,1)` or `[0,0,1]`);
/// * several triples form a list, e.g. `0,0,1 1,1,1`.
pub fn parse_miller(values: &[String]) -> Result<MillerSpec> {
    if values.is_empty() {
        bail!("no Miller index supplied");
    }
    if values.len() == 1 {
        let v = &values[0];
        if v.contains(',') {
            return Ok(MillerSpec::Single(parse_triple(v)?));
        }
        let max: i32 = v
            .parse()
            .with_context(|| format!("'{}' is not a Miller index or maximum index", v))?;
        if max < 1 {
            bail!("maximum Miller index must be at least 1, got {}", max);
        }
        return Ok(MillerSpec::MaxIndex(max));
    }
    let list = values
        .iter()
        .map(|v| parse_triple(v))
        .collect::<Result<Vec<_>>>()?;
    Ok(MillerSpec::List(list))
}

fn parse_triple(s: &str) -> Result<[i32; 3]> {
    let parts: Vec<i32> = s
        .trim_matches(|c| "[]()".contains(c))
        .split(',')
        .map(|t| t.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("'{}' is not a Miller index triple", s))?;
    if parts.len() != 3 {
        bail!("Miller index '{}' does not have three components", s);
    }
    Ok([parts[0], parts[1], parts[2]])
}

/// Parses colon-delimited oxidation-state pairs, e.g. `Fe:3,O:-2`.
pub fn parse_ox_dict(s: &str) -> Result<BTreeMap<String, f64>> {
    let mut map = BTreeMap::new();
    for pair in s.split(',') {
        let (element, state) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("'{}' is not an element:state pair", pair))?;
        let state: f64 = state
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a number", state))?;
        map.insert(element.trim().to_string(), state);
    }
    Ok(map)
}

/// clap adapter for `--oxi-dict`.
pub fn parse_ox_dict_arg(s: &str) -> Result<BTreeMap<String, f64>, String> {
    parse_ox_dict(s).map_err(|e| e.to_string())
}

/// A full generation run, either assembled from CLI flags or read
/// wholesale from a YAML settings file (`--yaml`), which overrides
/// every other flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub structure: PathBuf,
    pub hkl: Vec<String>,
    #[serde(default = "default_thickness")]
    pub thicknesses: Vec<f64>,
    #[serde(default = "default_thickness")]
    pub vacuums: Vec<f64>,
    #[serde(default)]
    pub make_fols: bool,
    #[serde(default)]
    pub make_input_files: bool,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_true")]
    pub center_slab: bool,
    #[serde(default)]
    pub ox_states_list: Option<Vec<f64>>,
    #[serde(default)]
    pub ox_states_dict: Option<BTreeMap<String, f64>>,
    #[serde(default = "default_true")]
    pub is_symmetric: bool,
    #[serde(default)]
    pub layers_to_relax: Option<usize>,
    #[serde(default = "default_fmt")]
    pub fmt: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub config_dict: Option<String>,
    #[serde(default)]
    pub user_incar_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub user_kpoints_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub user_potcar_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub processes: Option<usize>,
    #[serde(default = "default_true")]
    pub save_metadata: bool,
    #[serde(default)]
    pub json_fname: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_thickness() -> Vec<f64> {
    vec![10.0]
}
fn default_max_size() -> usize {
    500
}
fn default_fmt() -> String {
    "poscar".to_string()
}
fn default_name() -> String {
    "POSCAR".to_string()
}

impl Settings {
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read settings file {:?}", path))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("malformed settings file {:?}", path))
    }

    pub fn ox_spec(&self) -> OxidationSpec {
        if let Some(map) = &self.ox_states_dict {
            OxidationSpec::ByElement(map.clone())
        } else if let Some(list) = &self.ox_states_list {
            OxidationSpec::BySite(list.clone())
        } else {
            OxidationSpec::Guess
        }
    }

    pub fn generation_config(&self) -> Result<GenerationConfig> {
        // Selective dynamics only makes sense for POSCAR output.
        let layers_to_relax = if self.fmt.eq_ignore_ascii_case("poscar") {
            self.layers_to_relax
        } else {
            None
        };
        Ok(GenerationConfig {
            miller: parse_miller(&self.hkl)?,
            thicknesses: self.thicknesses.clone(),
            vacuums: self.vacuums.clone(),
            center_slab: self.center_slab,
            ox_states: self.ox_spec(),
            is_symmetric: self.is_symmetric,
            layers_to_relax,
            max_size: self.max_size,
            ftol: 0.1,
            processes: self.processes,
        })
    }
}
