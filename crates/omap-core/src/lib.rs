pub mod config;
pub mod logging;

pub mod accountant;
pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod network;
pub mod region_db;
pub mod retry;
pub mod source;
pub mod storage;
pub mod tile;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ManagerError;
pub use manager::DownloadManager;
