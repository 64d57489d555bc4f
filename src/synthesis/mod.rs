pub mod builder;
pub mod dynamics;
pub mod filter;
pub mod population;
pub mod terminations;
