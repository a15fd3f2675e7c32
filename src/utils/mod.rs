pub mod errors;
pub mod precision;
pub mod types;
