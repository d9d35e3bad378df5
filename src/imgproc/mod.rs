pub mod color;
pub mod contours;
pub mod drawing;
pub mod filter;
pub mod histogram;
pub mod morphology;
pub mod threshold;

pub use color::*;
pub use contours::*;
pub use filter::*;
pub use histogram::*;
pub use morphology::*;
pub use threshold::*;
