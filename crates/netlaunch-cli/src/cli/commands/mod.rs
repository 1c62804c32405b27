//! CLI command handlers, one file per command.

mod cache;
mod completions;
mod fetch;
mod launch;
mod verify;

pub use cache::{run_cache, CacheAction};
pub use completions::run_completions;
pub use fetch::run_fetch;
pub use launch::run_launch;
pub use verify::run_verify;
#[cfg(test)]
pub(crate) use verify::status_label;
