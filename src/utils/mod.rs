pub mod math;
pub mod sanitize;
