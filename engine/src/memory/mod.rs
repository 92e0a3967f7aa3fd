pub mod model;
pub mod pointer;
pub mod target;
