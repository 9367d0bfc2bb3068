//! Visibility search, prioritization, and per-frame update scheduling

pub mod distance;
pub mod events;
pub mod ingest;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod search;

pub use queue::PriorityQueue;
pub use scheduler::Scheduler;
