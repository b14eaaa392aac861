pub mod qc;
pub mod types;
