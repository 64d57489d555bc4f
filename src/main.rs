use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

use crystal_slab_generator::cli::{parse_ox_dict_arg, Settings};
use crystal_slab_generator::io::{parser, writer};
use crystal_slab_generator::plotting::{
    load_columns, load_convergence, plot_bond_analysis, plot_convergence, plot_potential,
    PlotOptions, Quantity,
};
use crystal_slab_generator::{generate_slabs, load_config, slabs_to_file, OutputFormat, SaveOptions};

#[derive(Parser)]
#[command(author, version, about = "Miller-index surface slab generation and analysis plots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cuts zero-dipole surface slabs from a bulk structure.
    Generate {
        /// Bulk structure file (POSCAR or CIF).
        #[arg(short, long, required_unless_present = "yaml")]
        structure: Option<PathBuf>,

        /// Maximum Miller index (`2`), one index (`0,0,1`) or several.
        #[arg(long, num_args = 1.., required_unless_present = "yaml")]
        hkl: Vec<String>,

        /// Minimum slab thicknesses in Angstroms.
        #[arg(short, long, num_args = 1.., default_values_t = [10.0])]
        thicknesses: Vec<f64>,

        /// Minimum vacuum thicknesses in Angstroms.
        #[arg(short, long, num_args = 1.., default_values_t = [10.0])]
        vacuums: Vec<f64>,

        /// One folder per termination instead of flat files.
        #[arg(short = 'r', long = "fols")]
        fols: bool,

        /// Also write INCAR, KPOINTS and POTCAR.spec per folder.
        #[arg(short = 'f', long = "files")]
        files: bool,

        /// Warn when a slab has more atoms than this.
        #[arg(long, default_value_t = 500)]
        max_size: usize,

        /// Leave the slab at the cell bottom instead of centering it.
        #[arg(long)]
        not_centered: bool,

        /// Oxidation states in site order, e.g. `3 3 -2 -2 -2`.
        #[arg(long, num_args = 1.., allow_negative_numbers = true)]
        oxi_list: Option<Vec<f64>>,

        /// Oxidation states by element, e.g. `Fe:3,O:-2`.
        #[arg(long, value_parser = parse_ox_dict_arg, conflicts_with = "oxi_list")]
        oxi_dict: Option<std::collections::BTreeMap<String, f64>>,

        /// Keep non-centrosymmetric slabs too.
        #[arg(long = "no-sym")]
        no_sym: bool,

        /// Relax this many atomic layers at each surface (POSCAR only).
        #[arg(long)]
        sd: Option<usize>,

        /// Output format: poscar, cif or json.
        #[arg(long, default_value = "poscar")]
        fmt: String,

        /// Structure filename within each folder.
        #[arg(long, default_value = "POSCAR")]
        name: String,

        /// Calculation preset name, JSON file path or inline JSON.
        #[arg(long)]
        config_dict: Option<String>,

        /// INCAR overrides as JSON, e.g. `{"ENCUT": 350}`.
        #[arg(short, long)]
        incar: Option<String>,

        /// KPOINTS overrides as JSON.
        #[arg(short, long)]
        kpoints: Option<String>,

        /// POTCAR label overrides as JSON.
        #[arg(short, long)]
        potcar: Option<String>,

        /// Worker threads for the hkl x thickness x vacuum sweep.
        #[arg(long)]
        processes: Option<usize>,

        /// Skip writing the metadata JSON.
        #[arg(long)]
        no_metadata: bool,

        /// Metadata filename; defaults to `{formula}_metadata.json`.
        #[arg(long)]
        json_fname: Option<String>,

        /// Settings file overriding every other flag.
        #[arg(long)]
        yaml: Option<PathBuf>,
    },

    /// Renders analysis plots from CSV data.
    Plot {
        #[arg(long, value_enum)]
        kind: PlotKind,

        /// Input CSV file.
        #[arg(long)]
        csv: PathBuf,

        /// Output PNG path; defaults to `<kind>.png`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pixel scale in percent of the base size.
        #[arg(long, default_value_t = 100)]
        scale: u32,

        /// Coloured grid instead of line series (convergence kinds).
        #[arg(long)]
        heatmap: bool,

        /// Omit the time-taken annotations.
        #[arg(long)]
        no_time: bool,

        /// Bond pairs for bond-analysis, e.g. `Y-O`; defaults to every
        /// pair found in the CSV.
        #[arg(long, num_args = 0..)]
        bonds: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlotKind {
    SurfaceEnergy,
    EnergyPerAtom,
    BondAnalysis,
    Potential,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            structure,
            hkl,
            thicknesses,
            vacuums,
            fols,
            files,
            max_size,
            not_centered,
            oxi_list,
            oxi_dict,
            no_sym,
            sd,
            fmt,
            name,
            config_dict,
            incar,
            kpoints,
            potcar,
            processes,
            no_metadata,
            json_fname,
            yaml,
        } => {
            let settings = match yaml {
                Some(path) => Settings::from_yaml(&path)?,
                None => Settings {
                    // required_unless_present guarantees these.
                    structure: structure.unwrap_or_default(),
                    hkl,
                    thicknesses,
                    vacuums,
                    make_fols: fols,
                    make_input_files: files,
                    max_size,
                    center_slab: !not_centered,
                    ox_states_list: oxi_list,
                    ox_states_dict: oxi_dict,
                    is_symmetric: !no_sym,
                    layers_to_relax: sd,
                    fmt,
                    name,
                    config_dict,
                    user_incar_settings: json_text(incar)?,
                    user_kpoints_settings: json_text(kpoints)?,
                    user_potcar_settings: json_text(potcar)?,
                    processes,
                    save_metadata: !no_metadata,
                    json_fname,
                },
            };
            run_generate(&settings)
        }
        Commands::Plot {
            kind,
            csv,
            output,
            scale,
            heatmap,
            no_time,
            bonds,
        } => run_plot(kind, &csv, output, scale, heatmap, no_time, &bonds),
    }
}

fn json_text(text: Option<String>) -> Result<Option<serde_json::Value>> {
    text.map(|t| serde_json::from_str(&t).context("overrides are not valid JSON"))
        .transpose()
}

fn run_generate(settings: &Settings) -> Result<()> {
    let start = Instant::now();

    let bulk = parser::from_file(&settings.structure)?;
    log::info!(
        "loaded {} ({} sites) from {:?}",
        bulk.reduced_formula(),
        bulk.sites.len(),
        settings.structure
    );

    let config = settings.generation_config()?;
    let slabs = generate_slabs(&bulk, &config)?;
    log::info!("generated {} slabs", slabs.len());

    let mut calc_config = load_config(settings.config_dict.as_deref())?;
    calc_config.apply_overrides(
        settings.user_incar_settings.as_ref().map(|v| v.to_string()).as_deref(),
        settings.user_kpoints_settings.as_ref().map(|v| v.to_string()).as_deref(),
        settings.user_potcar_settings.as_ref().map(|v| v.to_string()).as_deref(),
    )?;

    let opts = SaveOptions {
        root: PathBuf::from("."),
        make_fols: settings.make_fols,
        make_input_files: settings.make_input_files,
        fmt: OutputFormat::parse(&settings.fmt)?,
        name: settings.name.clone(),
        config: calc_config,
    };
    let formula = bulk.reduced_formula();
    slabs_to_file(&slabs, &formula, &opts)?;

    if settings.save_metadata {
        let path = writer::save_metadata(
            &slabs,
            &formula,
            &opts.root,
            settings.json_fname.as_deref(),
        )?;
        log::info!("metadata written to {:?}", path);
    }

    println!(
        "Done: {} {} slabs in {:.2?}",
        slabs.len(),
        formula,
        start.elapsed()
    );
    Ok(())
}

fn run_plot(
    kind: PlotKind,
    csv: &std::path::Path,
    output: Option<PathBuf>,
    scale: u32,
    heatmap: bool,
    no_time: bool,
    bonds: &[String],
) -> Result<()> {
    let default_name = match kind {
        PlotKind::SurfaceEnergy => "surface_energy.png",
        PlotKind::EnergyPerAtom => "energy_per_atom.png",
        PlotKind::BondAnalysis => "bond_analysis.png",
        PlotKind::Potential => "potential.png",
    };
    let output = output.unwrap_or_else(|| PathBuf::from(default_name));

    match kind {
        PlotKind::SurfaceEnergy | PlotKind::EnergyPerAtom => {
            let records = load_convergence(csv)?;
            let quantity = match kind {
                PlotKind::SurfaceEnergy => Quantity::SurfaceEnergy,
                _ => Quantity::EnergyPerAtom,
            };
            let opts = PlotOptions {
                output,
                scale,
                heatmap,
                show_time: !no_time,
            };
            plot_convergence(&records, quantity, &opts)?;
        }
        PlotKind::BondAnalysis => {
            let table = load_columns(csv)?;
            let pairs = bonds
                .iter()
                .map(|p| parse_bond_pair(p.as_str()))
                .collect::<Result<Vec<_>>>()?;
            plot_bond_analysis(&table, &pairs, &output, scale)?;
        }
        PlotKind::Potential => {
            let table = load_columns(csv)?;
            plot_potential(&table, &output, scale)?;
        }
    }
    Ok(())
}

fn parse_bond_pair(s: &str) -> Result<(String, String)> {
    let (el1, el2) = s
        .split_once('-')
        .with_context(|| format!("'{}' is not an element pair like Y-O", s))?;
    Ok((el1.trim().to_string(), el2.trim().to_string()))
}
