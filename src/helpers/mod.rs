//! Index arithmetic and register-tile helpers shared by every kernel

pub mod fast_div;
mod index;
pub mod math;
pub mod register_tile;
pub mod tensor_index;
pub mod window_index;
pub mod workgroup_reduce;

pub use fast_div::{FastDiv, IndexDivisor, PlainDiv};
pub use index::{Index, IndexRange, range};
pub use register_tile::{RegisterTile1D, RegisterTile2D, RegisterTile3D};
pub use window_index::{WindowIndices, in_window_from_output, out_window_from_input};
