pub mod cli;
pub mod core;
pub mod io;
pub mod math;
pub mod plotting;
pub mod synthesis;

pub use crate::core::oxidation::OxidationSpec;
pub use crate::core::structure::{Crystal, Lattice, Site, Slab};
pub use crate::io::config::{load_config, CalcConfig};
pub use crate::io::writer::{slabs_to_file, OutputFormat, SaveOptions};

use crate::core::{oxidation, symmetry};
use crate::synthesis::builder::SlabBuilder;
use crate::synthesis::population::SlabPopulator;
use crate::synthesis::{dynamics, filter, terminations};
use anyhow::{anyhow, Context, Result};
use log::warn;
use rayon::prelude::*;

/// Which Miller indices to cleave along.
#[derive(Debug, Clone, PartialEq)]
pub enum MillerSpec {
    /// One specific index.
    Single([i32; 3]),
    /// An explicit list of indices.
    List(Vec<[i32; 3]>),
    /// Search all symmetrically distinct indices up to a maximum.
    MaxIndex(i32),
}

/// Configuration for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub miller: MillerSpec,
    /// Minimum slab thicknesses in Angstroms.
    pub thicknesses: Vec<f64>,
    /// Minimum vacuum thicknesses in Angstroms.
    pub vacuums: Vec<f64>,
    /// Centre the slab in the box with vacuum on both sides, or leave
    /// it at the bottom with all vacuum above.
    pub center_slab: bool,
    pub ox_states: OxidationSpec,
    /// Keep only slabs with inversion symmetry. Downgraded with a
    /// warning when the bulk itself is non-centrosymmetric.
    pub is_symmetric: bool,
    /// Relax this many surface layers via selective dynamics.
    pub layers_to_relax: Option<usize>,
    /// Atom-count threshold for the size warning. Larger slabs are
    /// still produced.
    pub max_size: usize,
    /// Clustering tolerance for termination enumeration, in fractional
    /// plane units.
    pub ftol: f64,
    /// Worker threads for the combination sweep; defaults to all
    /// available cores minus one.
    pub processes: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            miller: MillerSpec::MaxIndex(1),
            thicknesses: vec![10.0],
            vacuums: vec![10.0],
            center_slab: true,
            ox_states: OxidationSpec::Guess,
            is_symmetric: true,
            layers_to_relax: None,
            max_size: 500,
            ftol: 0.1,
            processes: None,
        }
    }
}

/// Generates all unique zero-dipole slabs for the requested Miller
/// indices and slab/vacuum thickness combinations. Termination
/// enumeration includes every distinct cleavage plane per index; polar
/// and (optionally) non-centrosymmetric slabs are filtered out,
/// duplicates across combinations are dropped with a warning.
pub fn generate_slabs(bulk: &Crystal, config: &GenerationConfig) -> Result<Vec<Slab>> {
    let mut bulk = bulk.clone();
    oxidation::decorate(&mut bulk, &config.ox_states)
        .context("adding oxidation states to the bulk")?;

    let mut is_symmetric = config.is_symmetric;
    if is_symmetric && !symmetry::is_laue(&bulk) {
        warn!(
            "inversion symmetry not found in the bulk structure; \
             slabs produced will be non-centrosymmetric"
        );
        is_symmetric = false;
    }

    let miller: Vec<[i32; 3]> = match &config.miller {
        MillerSpec::Single(hkl) => vec![*hkl],
        MillerSpec::List(list) => list.clone(),
        MillerSpec::MaxIndex(max) => {
            let found = symmetry::symmetrically_distinct_miller_indices(&bulk, *max);
            if found.is_empty() {
                return Err(anyhow!("no Miller indices found up to max index {}", max));
            }
            found
        }
    };

    let combos: Vec<([i32; 3], f64, f64)> = miller
        .iter()
        .flat_map(|&hkl| {
            config.thicknesses.iter().flat_map(move |&t| {
                config.vacuums.iter().map(move |&v| (hkl, t, v))
            })
        })
        .collect();

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let processes = config
        .processes
        .unwrap_or_else(|| available.saturating_sub(1))
        .clamp(1, available);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(processes)
        .build()
        .context("building worker pool")?;

    let nested: Vec<Vec<Slab>> = pool.install(|| {
        combos
            .par_iter()
            .map(|&(hkl, thickness, vacuum)| {
                generate_combination(&bulk, hkl, thickness, vacuum, is_symmetric, config)
            })
            .collect::<Result<_>>()
    })?;
    let provisional: Vec<Slab> = nested.into_iter().flatten().collect();

    let report = filter::filter_unique(provisional, config.max_size);
    if !report.repeats.is_empty() {
        warn!(
            "some hkl or slab/vacuum combinations produced repeat structures \
             and were dropped: {}",
            report.repeats.join(", ")
        );
    }
    if !report.oversized.is_empty() {
        warn!(
            "some slabs exceed the maximum size of {} atoms: {}",
            config.max_size,
            report.oversized.join(", ")
        );
    }

    let mut unique = report.unique;
    if unique.is_empty() {
        return Err(anyhow!(
            "no zero-dipole (Tasker I or II) slabs found for the specified Miller indices"
        ));
    }

    if let Some(layers) = config.layers_to_relax {
        let too_thin = dynamics::apply_selective_dynamics(&mut unique, layers);
        if !too_thin.is_empty() {
            warn!(
                "some slabs were too thin to fix the centre; no selective \
                 dynamics applied to: {}",
                too_thin.join(", ")
            );
        }
    }

    Ok(unique)
}

/// All surviving terminations for one (hkl, thickness, vacuum) tuple.
fn generate_combination(
    bulk: &Crystal,
    hkl: [i32; 3],
    thickness: f64,
    vacuum: f64,
    is_symmetric: bool,
    config: &GenerationConfig,
) -> Result<Vec<Slab>> {
    let builder = SlabBuilder::new(hkl, thickness, vacuum);
    let geometry = builder.compute_geometry(bulk).with_context(|| {
        format!("computing slab geometry for ({} {} {})", hkl[0], hkl[1], hkl[2])
    })?;

    let shifts = terminations::enumerate_shifts(bulk, hkl, config.ftol);

    let mut slabs = Vec::new();
    for (index, &shift) in shifts.iter().enumerate() {
        let sites =
            SlabPopulator::populate(bulk, &geometry, shift, config.center_slab)?;
        let slab = Slab {
            structure: Crystal::new(geometry_lattice(&geometry)?, sites)?,
            hkl,
            slab_thickness: thickness,
            vacuum_thickness: vacuum,
            slab_layers: geometry.n_layers,
            slab_index: index,
            shift,
        };

        if filter::is_polar(&slab) {
            continue;
        }
        if is_symmetric && !filter::is_symmetric(&slab) {
            continue;
        }
        slabs.push(slab);
    }
    Ok(slabs)
}

fn geometry_lattice(
    geometry: &crate::synthesis::builder::SlabGeometry,
) -> Result<Lattice> {
    Ok(Lattice::new(geometry.basis)?)
}
