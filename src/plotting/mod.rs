//! Plot rendering for convergence testing and surface analysis,
//! backed by `plotters` bitmap output.

pub mod bonds;
pub mod convergence;
pub mod data;
pub mod potential;

pub use bonds::plot_bond_analysis;
pub use convergence::{plot_convergence, PlotOptions};
pub use data::{load_columns, load_convergence, Quantity};
pub use potential::plot_potential;
