pub mod oxidation;
pub mod structure;
pub mod symmetry;
