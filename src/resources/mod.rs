//! Resource data model
//!
//! Vertex attributes, uniform values and the material contract that ties
//! them to shader programs.

mod attribute;
mod material;
mod stock;
mod uniform;

pub use attribute::*;
pub use material::*;
pub use stock::*;
pub use uniform::*;
