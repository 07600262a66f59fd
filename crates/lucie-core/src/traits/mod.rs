//! Trait seams between the bridge engine and its collaborators

mod gateway;
mod transport;

pub use gateway::{ProgressFn, TaskGateway, TaskWork};
pub use transport::Transport;
