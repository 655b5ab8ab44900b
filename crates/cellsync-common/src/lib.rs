pub mod coord;
pub mod dataset;
pub mod error;
pub mod patch;
pub mod value;

pub use coord::*;
pub use dataset::*;
pub use error::*;
pub use patch::*;
pub use value::*;
