pub mod context;
pub mod registry;
pub mod state;

pub use context::{MAX_VOLUME, Player};
pub use registry::PlayerRegistry;
pub use state::*;
