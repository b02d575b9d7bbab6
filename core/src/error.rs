use crate::types::{ProcessId, ResourceId, SimTime, StoreId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Process {0:?} not found")]
    UnknownProcess(ProcessId),

    #[error("Resource {0:?} not found")]
    UnknownResource(ResourceId),

    #[error("Depletable resource {0:?} not found")]
    UnknownStore(StoreId),

    #[error("Cannot {operation} process '{name}' while it is running")]
    ProcessRunning { name: String, operation: &'static str },

    #[error("Cannot schedule at {at}: clock is already at {now}")]
    TimeReversal { now: SimTime, at: SimTime },

    #[error("Invalid duration {duration} requested by '{name}'")]
    InvalidDuration { name: String, duration: SimTime },

    #[error("Invalid quantity {quantity} for '{name}' (capacity {capacity})")]
    InvalidQuantity { name: String, quantity: f64, capacity: f64 },

    #[error("Release of {requested} units from '{resource}' exceeds the {held} units held")]
    OverRelease { resource: String, requested: f64, held: f64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
