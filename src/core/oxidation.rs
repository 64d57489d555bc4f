use crate::core::structure::Crystal;
use anyhow::{bail, Result};
use log::warn;
use std::collections::BTreeMap;

/// How oxidation states are attached to the bulk structure before the
/// dipole filter runs.
#[derive(Debug, Clone, PartialEq)]
pub enum OxidationSpec {
    /// One state per element, e.g. {"Fe": 3.0, "O": -2.0}.
    ByElement(BTreeMap<String, f64>),
    /// One state per site, in site order.
    BySite(Vec<f64>),
    /// Pick from tabulated common states, balancing the cell charge.
    Guess,
}

impl Default for OxidationSpec {
    fn default() -> Self {
        OxidationSpec::Guess
    }
}

/// Attaches oxidation states to every site. Sites that already carry
/// states are left untouched; this mirrors relaxed bulk files that come
/// pre-decorated.
pub fn decorate(crystal: &mut Crystal, spec: &OxidationSpec) -> Result<()> {
    if crystal.has_oxidation_states() {
        return Ok(());
    }

    match spec {
        OxidationSpec::ByElement(map) => {
            for el in crystal.composition().keys() {
                if !map.contains_key(el) {
                    bail!("no oxidation state supplied for element {}", el);
                }
            }
            for el in map.keys() {
                if !crystal.composition().contains_key(el) {
                    bail!("oxidation state supplied for {} which is not in the structure", el);
                }
            }
            for site in &mut crystal.sites {
                site.oxidation_state = Some(map[&site.element]);
            }
        }
        OxidationSpec::BySite(states) => {
            if states.len() != crystal.sites.len() {
                bail!(
                    "{} oxidation states supplied for {} sites",
                    states.len(),
                    crystal.sites.len()
                );
            }
            for (site, &q) in crystal.sites.iter_mut().zip(states) {
                site.oxidation_state = Some(q);
            }
        }
        OxidationSpec::Guess => {
            let guessed = guess_by_element(crystal);
            for site in &mut crystal.sites {
                site.oxidation_state = Some(guessed[&site.element]);
            }
        }
    }
    Ok(())
}

/// Common formal oxidation states per element, most common first.
/// Covers the usual suspects in oxide/halide/chalcogenide surface work;
/// anything else defaults to 0 (metallic / unknown).
fn common_states(element: &str) -> &'static [f64] {
    match element {
        "H" => &[1.0, -1.0],
        "Li" | "Na" | "K" | "Rb" | "Cs" => &[1.0],
        "Be" | "Mg" | "Ca" | "Sr" | "Ba" | "Zn" | "Cd" => &[2.0],
        "B" | "Al" | "Ga" | "Sc" | "Y" | "La" => &[3.0],
        "In" => &[3.0, 1.0],
        "C" => &[4.0, -4.0, 2.0],
        "Si" | "Ge" | "Zr" | "Hf" => &[4.0],
        "Sn" | "Pb" | "Ti" => &[4.0, 2.0],
        "N" => &[-3.0, 3.0, 5.0],
        "P" | "As" | "Sb" | "Bi" => &[5.0, 3.0, -3.0],
        "O" => &[-2.0],
        "S" | "Se" | "Te" => &[-2.0, 4.0, 6.0],
        "F" => &[-1.0],
        "Cl" | "Br" | "I" => &[-1.0, 5.0, 7.0],
        "V" => &[5.0, 4.0, 3.0, 2.0],
        "Nb" | "Ta" => &[5.0],
        "Cr" => &[3.0, 6.0, 2.0],
        "Mo" | "W" => &[6.0, 4.0],
        "Mn" => &[2.0, 4.0, 3.0, 7.0],
        "Fe" => &[3.0, 2.0],
        "Co" | "Ni" => &[2.0, 3.0],
        "Cu" => &[2.0, 1.0],
        "Ag" => &[1.0],
        "Au" => &[3.0, 1.0],
        _ => &[0.0],
    }
}

/// One state per element, chosen so the cell is charge neutral if any
/// combination of tabulated states manages it. Depth-first over the
/// (few) candidates per element; falls back to the most common states
/// with a warning when nothing balances.
fn guess_by_element(crystal: &Crystal) -> BTreeMap<String, f64> {
    let composition = crystal.composition();
    let elements: Vec<(&String, usize)> =
        composition.iter().map(|(el, &n)| (el, n)).collect();

    let mut chosen = vec![0usize; elements.len()];
    if balance(&elements, 0, 0.0, &mut chosen) {
        return elements
            .iter()
            .zip(&chosen)
            .map(|(&(el, _), &i)| (el.clone(), common_states(el)[i]))
            .collect();
    }

    warn!(
        "no charge-balanced oxidation state assignment found for {}; \
         using most common states per element",
        crystal.reduced_formula()
    );
    elements
        .iter()
        .map(|&(el, _)| (el.clone(), common_states(el)[0]))
        .collect()
}

fn balance(
    elements: &[(&String, usize)],
    depth: usize,
    charge: f64,
    chosen: &mut [usize],
) -> bool {
    if depth == elements.len() {
        return charge.abs() < 1e-6;
    }
    let (el, count) = elements[depth];
    for (i, &state) in common_states(el).iter().enumerate() {
        chosen[depth] = i;
        if balance(elements, depth + 1, charge + state * count as f64, chosen) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Crystal, Lattice, Site};
    use nalgebra::{Matrix3, Vector3};

    fn rocksalt() -> Crystal {
        let lattice = Lattice::new(Matrix3::identity() * 4.2).unwrap();
        let sites = vec![
            Site::new("Mg", Vector3::new(0.0, 0.0, 0.0)),
            Site::new("O", Vector3::new(0.5, 0.5, 0.5)),
        ];
        Crystal::new(lattice, sites).unwrap()
    }

    #[test]
    fn guess_balances_mgo() {
        let mut crystal = rocksalt();
        decorate(&mut crystal, &OxidationSpec::Guess).unwrap();
        assert_eq!(crystal.sites[0].oxidation_state, Some(2.0));
        assert_eq!(crystal.sites[1].oxidation_state, Some(-2.0));
        assert!(crystal.total_charge().abs() < 1e-9);
    }

    #[test]
    fn guess_balances_mixed_valence() {
        let lattice = Lattice::new(Matrix3::identity() * 5.0).unwrap();
        let sites = vec![
            Site::new("Sn", Vector3::new(0.0, 0.0, 0.0)),
            Site::new("O", Vector3::new(0.5, 0.0, 0.0)),
            Site::new("O", Vector3::new(0.0, 0.5, 0.0)),
        ];
        let mut crystal = Crystal::new(lattice, sites).unwrap();
        decorate(&mut crystal, &OxidationSpec::Guess).unwrap();
        assert_eq!(crystal.sites[0].oxidation_state, Some(4.0));
    }

    #[test]
    fn by_element_requires_full_coverage() {
        let mut crystal = rocksalt();
        let mut map = BTreeMap::new();
        map.insert("Mg".to_string(), 2.0);
        let err = decorate(&mut crystal, &OxidationSpec::ByElement(map));
        assert!(err.is_err());
    }

    #[test]
    fn by_site_length_mismatch_rejected() {
        let mut crystal = rocksalt();
        let err = decorate(&mut crystal, &OxidationSpec::BySite(vec![2.0]));
        assert!(err.is_err());
    }

    #[test]
    fn predecorated_sites_untouched() {
        let mut crystal = rocksalt();
        for site in &mut crystal.sites {
            site.oxidation_state = Some(9.0);
        }
        decorate(&mut crystal, &OxidationSpec::Guess).unwrap();
        assert_eq!(crystal.sites[0].oxidation_state, Some(9.0));
    }
}
