pub mod amount;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod matcher;
pub mod model;
pub mod state;

pub use error::{Error, Result};
pub use state::{AppState, CycleReport, PaymentWatcher, WatcherHandle};
