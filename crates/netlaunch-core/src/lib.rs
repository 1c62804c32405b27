pub mod config;
pub mod logging;

pub mod cache;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod jar;
pub mod loader;
pub mod resource;
pub mod retry;
pub mod security;
pub mod tracker;
pub mod verify;

pub use error::{LaunchError, LoadError};
pub use loader::{LaunchContext, LoadedClass, LoaderState, ResourceGraphLoader};
pub use tracker::{DownloadContext, ResourceTracker};
