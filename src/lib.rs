pub mod capabilities;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_log;
pub mod simulation;
pub mod storage;
pub mod trace;
pub mod types;
pub mod worker;

pub use config::ExperimentConfig;
pub use coordinator::Coordinator;
pub use worker::WorkerAgent;
