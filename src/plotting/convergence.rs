use crate::plotting::data::{pivot, ConvergenceGrid, ConvergenceRecord, Quantity};
use anyhow::Result;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::PathBuf;

/// Rendering options shared by both convergence plots.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub output: PathBuf,
    /// Pixel scale in percent of the base size (100 = default).
    pub scale: u32,
    /// Coloured grid instead of line series.
    pub heatmap: bool,
    /// Annotate with the time-taken column where present.
    pub show_time: bool,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("convergence.png"),
            scale: 100,
            heatmap: false,
            show_time: true,
        }
    }
}

/// Renders a surface-energy or energy-per-atom convergence plot, one
/// panel (or panel row) per termination. Empty input is not an error;
/// it logs a warning and writes nothing.
pub fn plot_convergence(
    records: &[ConvergenceRecord],
    quantity: Quantity,
    opts: &PlotOptions,
) -> Result<()> {
    if records.is_empty() {
        log::warn!("no convergence data to plot, skipping {:?}", opts.output);
        return Ok(());
    }
    let grids = pivot(records, quantity);
    if opts.heatmap {
        draw_heatmap(&grids, quantity, opts)
    } else {
        draw_lines(&grids, quantity, opts)
    }
}

/// The Wistia yellow-to-orange ramp, interpolated from its five
/// anchor colours.
fn wistia(t: f64) -> RGBColor {
    const STOPS: [(f64, (u8, u8, u8)); 5] = [
        (0.00, (228, 255, 122)),
        (0.25, (255, 232, 26)),
        (0.50, (255, 189, 0)),
        (0.75, (255, 160, 0)),
        (1.00, (252, 127, 0)),
    ];
    let t = t.clamp(0.0, 1.0);
    for pair in STOPS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = (t - t0) / (t1 - t0);
            let mix = |a: u8, b: u8| (a as f64 + f * (b as f64 - a as f64)).round() as u8;
            return RGBColor(mix(c0.0, c1.0), mix(c0.1, c1.1), mix(c0.2, c1.2));
        }
    }
    RGBColor(252, 127, 0)
}

fn scaled(base: f64, scale: u32) -> u32 {
    (base * scale as f64 / 100.0).round().max(1.0) as u32
}

fn trim_float(v: f64) -> String {
    format!("{}", v)
}

fn draw_heatmap(grids: &[ConvergenceGrid], quantity: Quantity, opts: &PlotOptions) -> Result<()> {
    let (lo, hi) = grids
        .iter()
        .filter_map(|g| g.value_range())
        .fold(None, |acc: Option<(f64, f64)>, (lo, hi)| {
            Some(match acc {
                None => (lo, hi),
                Some((alo, ahi)) => (alo.min(lo), ahi.max(hi)),
            })
        })
        .unwrap_or((0.0, 1.0));
    let span = (hi - lo).max(1e-12);

    let panel_w = scaled(430.0, opts.scale);
    let legend_w = scaled(110.0, opts.scale);
    let height = scaled(420.0, opts.scale);
    let width = panel_w * grids.len() as u32 + legend_w;
    let font = scaled(13.0, opts.scale) as i32;

    let root = BitMapBackend::new(&opts.output, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let (panel_root, legend_root) = root.split_horizontally((width - legend_w) as i32);
    let panels = panel_root.split_evenly((1, grids.len()));

    for (grid, panel) in grids.iter().zip(panels.iter()) {
        let ncols = grid.vacuums.len();
        let nrows = grid.thicknesses.len();
        let mut chart = ChartBuilder::on(panel)
            .caption(
                format!("Termination {}", grid.slab_index),
                ("sans-serif", scaled(18.0, opts.scale) as i32),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(
                -0.5..ncols as f64 - 0.5,
                -0.5..nrows as f64 - 0.5,
            )?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(ncols)
            .y_labels(nrows)
            .x_label_formatter(&|x| axis_tick(&grid.vacuums, *x))
            .y_label_formatter(&|y| axis_tick(&grid.thicknesses, *y))
            .x_desc("Vacuum thickness / A")
            .y_desc("Slab thickness / A")
            .draw()?;

        // Cell i,j is centred on integer coordinates (j, i).
        chart.draw_series(grid.values.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, v)| {
                let v = (*v)?;
                let colour = wistia((v - lo) / span);
                Some(Rectangle::new(
                    [
                        (c as f64 - 0.5, r as f64 - 0.5),
                        (c as f64 + 0.5, r as f64 + 0.5),
                    ],
                    colour.filled(),
                ))
            })
        }))?;

        let centred = Pos::new(HPos::Center, VPos::Center);
        let value_style = ("sans-serif", font).into_font().color(&BLACK).pos(centred);
        let time_style = ("sans-serif", font - 2)
            .into_font()
            .color(&BLACK.mix(0.6))
            .pos(centred);
        for (r, row) in grid.values.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                let Some(v) = v else { continue };
                let time = opts.show_time.then(|| grid.times[r][c]).flatten();
                let dy = if time.is_some() { 0.14 } else { 0.0 };
                chart.draw_series(std::iter::once(Text::new(
                    format!("{:.3}", v),
                    (c as f64, r as f64 + dy),
                    value_style.clone(),
                )))?;
                if let Some(t) = time {
                    chart.draw_series(std::iter::once(Text::new(
                        format!("{:.0} s", t),
                        (c as f64, r as f64 - 0.18),
                        time_style.clone(),
                    )))?;
                }
            }
        }
    }

    draw_colour_scale(&legend_root, quantity, lo, hi, opts)?;
    root.present()?;
    Ok(())
}

fn axis_tick(axis: &[f64], position: f64) -> String {
    let i = position.round();
    if (position - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    match axis.get(i as usize) {
        Some(v) => trim_float(*v),
        None => String::new(),
    }
}

fn draw_colour_scale<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    quantity: Quantity,
    lo: f64,
    hi: f64,
    opts: &PlotOptions,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let span = (hi - lo).max(1e-12);
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .y_label_area_size(scaled(55.0, opts.scale) as i32)
        .build_cartesian_2d(0.0..1.0, lo..lo + span)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(quantity.axis_label())
        .draw()?;
    const STEPS: usize = 64;
    chart.draw_series((0..STEPS).map(|i| {
        let f0 = i as f64 / STEPS as f64;
        let f1 = (i + 1) as f64 / STEPS as f64;
        Rectangle::new(
            [(0.0, lo + f0 * span), (1.0, lo + f1 * span)],
            wistia(f0).filled(),
        )
    }))?;
    Ok(())
}

fn draw_lines(grids: &[ConvergenceGrid], quantity: Quantity, opts: &PlotOptions) -> Result<()> {
    let show_time = opts.show_time && grids.iter().any(|g| g.has_times());
    let cols = if show_time { 2 } else { 1 };
    let width = scaled(560.0, opts.scale) * cols as u32;
    let height = scaled(380.0, opts.scale) * grids.len() as u32;

    let root = BitMapBackend::new(&opts.output, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((grids.len(), cols));

    for (i, grid) in grids.iter().enumerate() {
        draw_line_panel(&panels[i * cols], grid, quantity.axis_label(), &grid.values, opts)?;
        if show_time {
            draw_line_panel(&panels[i * cols + 1], grid, "Time taken / s", &grid.times, opts)?;
        }
    }
    root.present()?;
    Ok(())
}

fn draw_line_panel<DB: DrawingBackend>(
    panel: &DrawingArea<DB, plotters::coord::Shift>,
    grid: &ConvergenceGrid,
    y_label: &str,
    cells: &[Vec<Option<f64>>],
    opts: &PlotOptions,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let xs = &grid.thicknesses;
    let (x_lo, x_hi) = (xs[0], xs[xs.len() - 1]);
    let x_pad = ((x_hi - x_lo) * 0.05).max(0.5);

    let mut y_lo = f64::INFINITY;
    let mut y_hi = f64::NEG_INFINITY;
    for v in cells.iter().flatten().flatten() {
        y_lo = y_lo.min(*v);
        y_hi = y_hi.max(*v);
    }
    if !y_lo.is_finite() {
        log::warn!(
            "termination {} has no data for '{}', leaving panel empty",
            grid.slab_index,
            y_label
        );
        return Ok(());
    }
    let y_pad = ((y_hi - y_lo) * 0.1).max(1e-3);

    let mut chart = ChartBuilder::on(panel)
        .caption(
            format!("Termination {}", grid.slab_index),
            ("sans-serif", scaled(18.0, opts.scale) as i32),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo - x_pad..x_hi + x_pad, y_lo - y_pad..y_hi + y_pad)?;
    chart
        .configure_mesh()
        .x_desc("Slab thickness / A")
        .y_desc(y_label)
        .draw()?;

    for (col, vacuum) in grid.vacuums.iter().enumerate() {
        let colour = Palette99::pick(col).to_rgba();
        let points: Vec<(f64, f64)> = xs
            .iter()
            .zip(cells.iter())
            .filter_map(|(x, row)| row[col].map(|v| (*x, v)))
            .collect();
        if points.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(points.clone(), colour.stroke_width(2)))?
            .label(format!("{} A vacuum", trim_float(*vacuum)))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], colour));
        chart.draw_series(
            points
                .into_iter()
                .map(|p| Circle::new(p, 3, colour.filled())),
        )?;
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}
