pub mod asset;
pub mod math;
pub mod opportunity;
pub mod payload;

pub use asset::*;
pub use math::*;
pub use opportunity::*;
pub use payload::*;
