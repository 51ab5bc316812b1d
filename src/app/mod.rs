mod audit;
mod critic;
mod data_io;
mod extract;
mod runtime;
mod score;
mod types;

pub use runtime::run;
