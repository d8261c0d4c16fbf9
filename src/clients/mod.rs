pub mod sim;
pub mod traits;

pub use traits::*;
