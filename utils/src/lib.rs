pub mod memory;
pub mod rng;

pub use memory::{Align64, box_array};
pub use rng::Xorshift64;
