use crate::plotting::data::ColumnTable;
use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

/// Line plot of the planar (and, when present, macroscopic) average
/// electrostatic potential along the surface normal. Expects a
/// `planar` column and optionally a `macroscopic` one; x is the grid
/// point index.
pub fn plot_potential(table: &ColumnTable, output: &Path, scale: u32) -> Result<()> {
    let planar: Vec<(f64, f64)> = table
        .column("planar")
        .map(series_points)
        .unwrap_or_default();
    if planar.is_empty() {
        log::warn!("no planar potential column, skipping {:?}", output);
        return Ok(());
    }
    let macroscopic: Vec<(f64, f64)> = table
        .column("macroscopic")
        .map(series_points)
        .unwrap_or_default();

    let n_points = table.column("planar").map(|c| c.len()).unwrap_or(0);
    let mut y_lo = f64::INFINITY;
    let mut y_hi = f64::NEG_INFINITY;
    for &(_, v) in planar.iter().chain(macroscopic.iter()) {
        y_lo = y_lo.min(v);
        y_hi = y_hi.max(v);
    }
    let y_pad = ((y_hi - y_lo) * 0.05).max(1e-3);

    let s = scale as f64 / 100.0;
    let root = BitMapBackend::new(output, ((900.0 * s) as u32, (500.0 * s) as u32))
        .into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Electrostatic potential", ("sans-serif", (20.0 * s) as i32))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..n_points as f64, y_lo - y_pad..y_hi + y_pad)?;
    chart
        .configure_mesh()
        .x_desc("Lattice point along c")
        .y_desc("Potential / eV")
        .draw()?;

    chart
        .draw_series(LineSeries::new(planar, BLUE.stroke_width(2)))?
        .label("planar")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
    if !macroscopic.is_empty() {
        chart
            .draw_series(LineSeries::new(macroscopic, RED.stroke_width(2)))?
            .label("macroscopic")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Cell values paired with their grid point index; holes keep their
/// place on the x axis by being dropped after enumeration.
fn series_points(col: &[Option<f64>]) -> Vec<(f64, f64)> {
    col.iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plotting::data::load_columns;
    use std::io::Write;

    fn table(contents: &str) -> (tempfile::TempDir, ColumnTable) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("potential.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let table = load_columns(&path).unwrap();
        (dir, table)
    }

    #[test]
    fn plots_planar_and_macroscopic() {
        let (dir, table) = table("planar,macroscopic\n-3.0,-2.9\n4.1,4.0\n-3.2,-3.0\n");
        let out = dir.path().join("potential.png");
        plot_potential(&table, &out, 100).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn holes_keep_their_grid_index() {
        assert_eq!(
            series_points(&[Some(1.0), None, Some(3.0)]),
            vec![(0.0, 1.0), (2.0, 3.0)]
        );
    }

    #[test]
    fn missing_planar_column_skips() {
        let (dir, table) = table("other\n1.0\n");
        let out = dir.path().join("potential.png");
        plot_potential(&table, &out, 100).unwrap();
        assert!(!out.exists());
    }
}
