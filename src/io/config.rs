use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Calculation settings used when writing VASP-style input files:
/// INCAR tags, KPOINTS density and POTCAR pseudopotential labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalcConfig {
    #[serde(rename = "INCAR", default)]
    pub incar: BTreeMap<String, Value>,
    #[serde(rename = "KPOINTS", default)]
    pub kpoints: BTreeMap<String, Value>,
    #[serde(rename = "POTCAR", default)]
    pub potcar: BTreeMap<String, String>,
}

/// Bundled presets: PBE and PBEsol for single-shot calculations, their
/// relaxation variants, and HSE06.
const PRESETS: &[(&str, &str)] = &[
    ("pbesol", include_str!("../../config/PBEsol.json")),
    ("pbe", include_str!("../../config/PBE.json")),
    ("hse06", include_str!("../../config/HSE06.json")),
    ("pbesol_relax", include_str!("../../config/PBEsol_relax.json")),
    ("pbe_relax", include_str!("../../config/PBE_relax.json")),
];

const DEFAULT_PRESET: &str = "pbesol";

/// Resolves a config specification, a three-way union:
///
/// * inline JSON text (starts with `{`) is parsed directly;
/// * a preset name (`pe`, `ps`, `hse06`, `pe_relax`, `ps_relax`, full
///   names accepted, not case sensitive, `.json` suffix tolerated);
/// * a filesystem path to a JSON file.
///
/// Unknown names and unreadable paths fall back to the PBEsol preset
/// with a warning; `None` loads PBEsol silently.
pub fn load_config(spec: Option<&str>) -> Result<CalcConfig> {
    let spec = match spec {
        Some(s) => s.trim(),
        None => return preset(DEFAULT_PRESET),
    };

    if spec.starts_with('{') {
        return serde_json::from_str(spec).context("malformed inline config dictionary");
    }

    let key = normalise_name(spec);
    if PRESETS.iter().any(|(name, _)| *name == key) {
        return preset(&key);
    }

    let path = Path::new(spec);
    if path.is_file() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {:?}", path))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("malformed config file {:?}", path));
    }

    warn!(
        "config dictionary '{}' not recognised; falling back to the PBEsol preset",
        spec
    );
    preset(DEFAULT_PRESET)
}

fn preset(name: &str) -> Result<CalcConfig> {
    let (_, text) = PRESETS
        .iter()
        .find(|(n, _)| *n == name)
        .expect("preset names are static");
    serde_json::from_str(text).context("bundled preset is malformed")
}

/// Maps the accepted aliases onto preset keys. Unrecognised input is
/// returned lowercased so the caller can try it as a path.
fn normalise_name(name: &str) -> String {
    let lower = name
        .to_ascii_lowercase()
        .trim_end_matches(".json")
        .to_string();
    match lower.as_str() {
        "pe" | "pbe" => "pbe".to_string(),
        "ps" | "pbesol" => "pbesol".to_string(),
        "hse" | "hse06" => "hse06".to_string(),
        "pe_relax" | "pbe_relax" => "pbe_relax".to_string(),
        "ps_relax" | "pbesol_relax" => "pbesol_relax".to_string(),
        other => other.to_string(),
    }
}

impl CalcConfig {
    /// Merges user overrides on top of the preset. Each argument is
    /// optional JSON text, e.g. `{"ENCUT": 350}`.
    pub fn apply_overrides(
        &mut self,
        incar: Option<&str>,
        kpoints: Option<&str>,
        potcar: Option<&str>,
    ) -> Result<()> {
        if let Some(text) = incar {
            let map: BTreeMap<String, Value> =
                serde_json::from_str(text).context("malformed INCAR overrides")?;
            self.incar.extend(map);
        }
        if let Some(text) = kpoints {
            let map: BTreeMap<String, Value> =
                serde_json::from_str(text).context("malformed KPOINTS overrides")?;
            self.kpoints.extend(map);
        }
        if let Some(text) = potcar {
            let map: BTreeMap<String, String> =
                serde_json::from_str(text).context("malformed POTCAR overrides")?;
            self.potcar.extend(map);
        }
        Ok(())
    }

    /// Pseudopotential label for an element; elements without an entry
    /// use the bare symbol.
    pub fn potcar_label(&self, element: &str) -> String {
        self.potcar
            .get(element)
            .cloned()
            .unwrap_or_else(|| element.to_string())
    }
}
