pub mod config;
pub mod inputs;
pub mod parser;
pub mod writer;
