pub mod block;
pub mod model;

pub use block::{Block, compute_merkle_root};
pub use model::{Blockchain, ChainSnapshot};
