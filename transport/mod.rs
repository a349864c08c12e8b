// Transport module: raw stream socket mechanics and descriptor ownership
pub mod classify;
pub mod handle;
pub mod sock;

pub use classify::*;
pub use handle::*;
pub use sock::*;
