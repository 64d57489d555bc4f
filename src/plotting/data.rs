use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One row of a convergence-testing CSV, as produced by a batch of
/// surface-energy calculations over slab and vacuum thicknesses.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvergenceRecord {
    pub slab_thickness: f64,
    pub vac_thickness: f64,
    pub slab_index: usize,
    pub surface_energy: f64,
    pub slab_per_atom: f64,
    #[serde(default)]
    pub time_taken: Option<f64>,
}

/// Which convergence quantity a plot shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    SurfaceEnergy,
    EnergyPerAtom,
}

impl Quantity {
    pub fn axis_label(self) -> &'static str {
        match self {
            Quantity::SurfaceEnergy => "Surface energy / J m^-2",
            Quantity::EnergyPerAtom => "Energy per atom / eV",
        }
    }

    pub fn of(self, record: &ConvergenceRecord) -> f64 {
        match self {
            Quantity::SurfaceEnergy => record.surface_energy,
            Quantity::EnergyPerAtom => record.slab_per_atom,
        }
    }
}

pub fn load_convergence(path: &Path) -> Result<Vec<ConvergenceRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("could not open {:?}", path))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: ConvergenceRecord =
            row.with_context(|| format!("malformed row in {:?}", path))?;
        records.push(record);
    }
    Ok(records)
}

/// Convergence values for one termination, pivoted so rows are slab
/// thicknesses and columns are vacuum thicknesses. Cells with no
/// matching row are `None`.
#[derive(Debug, Clone)]
pub struct ConvergenceGrid {
    pub slab_index: usize,
    pub thicknesses: Vec<f64>,
    pub vacuums: Vec<f64>,
    pub values: Vec<Vec<Option<f64>>>,
    pub times: Vec<Vec<Option<f64>>>,
}

impl ConvergenceGrid {
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for v in self.values.iter().flatten().flatten() {
            range = Some(match range {
                None => (*v, *v),
                Some((lo, hi)) => (lo.min(*v), hi.max(*v)),
            });
        }
        range
    }

    pub fn has_times(&self) -> bool {
        self.times.iter().flatten().any(|t| t.is_some())
    }
}

/// Pivots convergence rows into one grid per termination index.
pub fn pivot(records: &[ConvergenceRecord], quantity: Quantity) -> Vec<ConvergenceGrid> {
    let mut indices: Vec<usize> = records.iter().map(|r| r.slab_index).collect();
    indices.sort_unstable();
    indices.dedup();

    let mut thicknesses: Vec<f64> = records.iter().map(|r| r.slab_thickness).collect();
    sort_dedup(&mut thicknesses);
    let mut vacuums: Vec<f64> = records.iter().map(|r| r.vac_thickness).collect();
    sort_dedup(&mut vacuums);

    indices
        .into_iter()
        .map(|slab_index| {
            let mut values = vec![vec![None; vacuums.len()]; thicknesses.len()];
            let mut times = vec![vec![None; vacuums.len()]; thicknesses.len()];
            for r in records.iter().filter(|r| r.slab_index == slab_index) {
                let row = position(&thicknesses, r.slab_thickness);
                let col = position(&vacuums, r.vac_thickness);
                values[row][col] = Some(quantity.of(r));
                times[row][col] = r.time_taken;
            }
            ConvergenceGrid {
                slab_index,
                thicknesses: thicknesses.clone(),
                vacuums: vacuums.clone(),
                values,
                times,
            }
        })
        .collect()
}

fn sort_dedup(values: &mut Vec<f64>) {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
}

fn position(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .position(|v| (v - value).abs() < 1e-9)
        .unwrap_or(0)
}

/// A CSV read as named numeric columns, for the bond-analysis and
/// potential files whose headers vary with the structure. Every column
/// has one cell per row; non-numeric or missing cells are holes, so
/// columns never lose row alignment.
#[derive(Debug, Clone)]
pub struct ColumnTable {
    pub headers: Vec<String>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl ColumnTable {
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.columns
            .values()
            .all(|c| c.iter().all(Option::is_none))
    }
}

pub fn load_columns(path: &Path) -> Result<ColumnTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("could not open {:?}", path))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("missing header row in {:?}", path))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut columns: BTreeMap<String, Vec<Option<f64>>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();
    for row in reader.records() {
        let row = row.with_context(|| format!("malformed row in {:?}", path))?;
        for (idx, header) in headers.iter().enumerate() {
            let value = row.get(idx).and_then(|f| f.trim().parse::<f64>().ok());
            if let Some(col) = columns.get_mut(header) {
                col.push(value);
            }
        }
    }
    Ok(ColumnTable { headers, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    const CSV: &str = "\
slab_thickness,vac_thickness,slab_index,surface_energy,slab_per_atom,time_taken
10,10,0,1.23,-5.01,60.0
10,20,0,1.20,-5.02,75.0
20,10,0,1.10,-5.03,120.0
20,20,0,1.08,-5.04,150.0
10,10,1,1.50,-4.90,55.0
";

    #[test]
    fn pivot_builds_one_grid_per_termination() {
        let (_dir, path) = write_csv(CSV);
        let records = load_convergence(&path).unwrap();
        let grids = pivot(&records, Quantity::SurfaceEnergy);
        assert_eq!(grids.len(), 2);
        let g0 = &grids[0];
        assert_eq!(g0.slab_index, 0);
        assert_eq!(g0.thicknesses, vec![10.0, 20.0]);
        assert_eq!(g0.vacuums, vec![10.0, 20.0]);
        assert_eq!(g0.values[1][0], Some(1.10));
        assert_eq!(g0.times[0][1], Some(75.0));
        // The second termination only has one cell filled in.
        let g1 = &grids[1];
        assert_eq!(g1.values[0][0], Some(1.50));
        assert_eq!(g1.values[1][1], None);
    }

    #[test]
    fn value_range_ignores_missing_cells() {
        let (_dir, path) = write_csv(CSV);
        let records = load_convergence(&path).unwrap();
        let grids = pivot(&records, Quantity::EnergyPerAtom);
        let (lo, hi) = grids[0].value_range().unwrap();
        assert!((lo - -5.04).abs() < 1e-12);
        assert!((hi - -5.01).abs() < 1e-12);
    }

    #[test]
    fn column_table_keeps_row_alignment() {
        let (_dir, path) =
            write_csv("label,Y_c_coord,Y-O_bond_distance\nY1,0.25,2.28\nY2,,2.31\n");
        let table = load_columns(&path).unwrap();
        // Non-numeric and empty cells become holes, not omissions, so
        // every column stays one cell per row.
        assert_eq!(table.column("Y_c_coord"), Some(&[Some(0.25), None][..]));
        assert_eq!(table.column("Y-O_bond_distance"), Some(&[Some(2.28), Some(2.31)][..]));
        assert_eq!(table.column("label"), Some(&[None, None][..]));
        assert!(!table.is_empty());
    }

    #[test]
    fn table_of_only_labels_is_empty() {
        let (_dir, path) = write_csv("label\nY1\nY2\n");
        let table = load_columns(&path).unwrap();
        assert!(table.is_empty());
    }
}
