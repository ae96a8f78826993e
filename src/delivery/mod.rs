//! Delivery engine: scheduling, dispatch, retry, batching and the sweep.

pub mod batch;
pub mod dispatcher;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod sweep;

pub use batch::{BatchCoordinator, BatchSummary};
pub use dispatcher::Dispatcher;
pub use pipeline::{DeliveryPipeline, OutcomeCounts};
pub use sweep::{start_sweep_service, SweepConfig, SweepReport, Sweeper};
