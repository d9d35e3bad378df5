pub mod frame;
pub mod ops;
pub mod types;

pub use frame::Frame;
pub use ops::*;
pub use types::*;
