pub mod client;
pub mod common;
pub mod descriptor;
pub mod launcher;
pub mod scheduler;

pub type Error = crate::common::error::LaunchError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = std::collections::HashMap<K, V>;

/// Identifier assigned by the batch scheduler to a submitted job.
pub type JobId = String;

pub const SWITCHQ_VERSION: &str = {
    match option_env!("SWITCHQ_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
