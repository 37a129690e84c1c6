mod device;
pub mod dto;
mod packages;
mod permissions;
pub mod response;
mod router;

pub use router::{AppState, create_router};
