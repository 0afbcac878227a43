pub mod base;
pub mod logging;
pub mod node;
pub mod player;

pub use base::*;
pub use logging::*;
pub use node::*;
pub use player::*;
