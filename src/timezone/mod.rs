pub mod formatter;
pub mod model;
