//
// Abstract interpretation over pointer programs
//
pub mod domain;
pub mod pointsto;
