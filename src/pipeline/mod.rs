pub mod source;
pub mod workers;
