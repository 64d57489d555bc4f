use crate::plotting::data::ColumnTable;
use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

/// Scatter plots of bond distance against the fractional c coordinate
/// of the first element, one panel per bond pair. Expects the columns
/// `{el1}_c_coord` and `{el1}-{el2}_bond_distance`.
///
/// With no explicit pairs, every `*_bond_distance` column in the table
/// is plotted. Pairs whose columns are missing are skipped with a
/// warning.
pub fn plot_bond_analysis(
    table: &ColumnTable,
    pairs: &[(String, String)],
    output: &Path,
    scale: u32,
) -> Result<()> {
    let pairs = if pairs.is_empty() {
        discover_pairs(table)
    } else {
        pairs.to_vec()
    };

    let mut panels_data = Vec::new();
    for (el1, el2) in &pairs {
        let x_col = format!("{}_c_coord", el1);
        let y_col = format!("{}-{}_bond_distance", el1, el2);
        let points = match (table.column(&x_col), table.column(&y_col)) {
            (Some(xs), Some(ys)) => paired(xs, ys),
            _ => Vec::new(),
        };
        if points.is_empty() {
            log::warn!("no data for {}-{} bonds, skipping panel", el1, el2);
        } else {
            panels_data.push((el1.clone(), el2.clone(), points));
        }
    }
    if panels_data.is_empty() {
        log::warn!("no bond data to plot, skipping {:?}", output);
        return Ok(());
    }

    let s = scale as f64 / 100.0;
    let width = ((460.0 * s) as u32) * panels_data.len() as u32;
    let height = (400.0 * s) as u32;
    let root = BitMapBackend::new(output, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, panels_data.len()));

    for ((el1, el2, points), panel) in panels_data.into_iter().zip(panels.iter()) {
        let (y_lo, y_hi) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
                (lo.min(y), hi.max(y))
            });
        let y_pad = ((y_hi - y_lo) * 0.1).max(1e-3);
        let mut chart = ChartBuilder::on(panel)
            .caption(
                format!("{}-{} bond", el1, el2),
                ("sans-serif", (18.0 * s) as i32),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..1.0, y_lo - y_pad..y_hi + y_pad)?;
        chart
            .configure_mesh()
            .x_desc("Fractional c coordinate")
            .y_desc("Bond distance / A")
            .draw()?;
        chart.draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, BLUE.mix(0.6).filled())),
        )?;
    }
    root.present()?;
    Ok(())
}

/// Pairs the coordinate and distance columns row by row, dropping rows
/// where either cell is a hole. Cells must not be filtered before
/// pairing or the columns drift out of step.
fn paired(xs: &[Option<f64>], ys: &[Option<f64>]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect()
}

fn discover_pairs(table: &ColumnTable) -> Vec<(String, String)> {
    table
        .headers
        .iter()
        .filter_map(|h| {
            let pair = h.strip_suffix("_bond_distance")?;
            let (el1, el2) = pair.split_once('-')?;
            Some((el1.to_string(), el2.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plotting::data::load_columns;
    use std::io::Write;

    fn table(contents: &str) -> (tempfile::TempDir, ColumnTable) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bonds.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let table = load_columns(&path).unwrap();
        (dir, table)
    }

    #[test]
    fn discovers_pairs_from_headers() {
        let (_dir, table) =
            table("Y_c_coord,Y-O_bond_distance,Ti_c_coord,Ti-O_bond_distance\n0.1,2.3,0.2,1.9\n");
        let pairs = discover_pairs(&table);
        assert_eq!(
            pairs,
            vec![
                ("Y".to_string(), "O".to_string()),
                ("Ti".to_string(), "O".to_string()),
            ]
        );
    }

    #[test]
    fn writes_png_for_present_pairs() {
        let (dir, table) = table("Y_c_coord,Y-O_bond_distance\n0.1,2.3\n0.6,2.4\n");
        let out = dir.path().join("bonds.png");
        plot_bond_analysis(&table, &[], &out, 100).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn rows_with_holes_stay_aligned() {
        // The empty coordinate cell must drop its whole row, not shift
        // later distances onto earlier coordinates.
        let (_dir, table) = table("Y_c_coord,Y-O_bond_distance\n0.1,2.3\n,2.4\n0.9,2.5\n");
        let xs = table.column("Y_c_coord").unwrap();
        let ys = table.column("Y-O_bond_distance").unwrap();
        assert_eq!(paired(xs, ys), vec![(0.1, 2.3), (0.9, 2.5)]);
    }

    #[test]
    fn missing_columns_skip_without_error() {
        let (dir, table) = table("unrelated\n1.0\n");
        let out = dir.path().join("bonds.png");
        plot_bond_analysis(
            &table,
            &[("Mg".to_string(), "O".to_string())],
            &out,
            100,
        )
        .unwrap();
        assert!(!out.exists());
    }
}
