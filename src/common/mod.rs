pub mod error;
pub mod grouping;
pub mod params;
pub mod types;
