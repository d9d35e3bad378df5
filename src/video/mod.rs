pub mod background;

pub use background::{BackgroundModel, BackgroundParams, KnnModel, Mog2Model, SHADOW_VALUE};
