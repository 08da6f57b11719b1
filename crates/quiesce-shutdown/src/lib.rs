pub mod bounded;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod resource;
pub mod signal;
pub mod strategy;

pub use bounded::{BoundedClose, BoundedCloseBuilder, CloseAttempt, CloseOutcome, CloseReport, CloseTask};
pub use config::CloseConfig;
pub use context::{CancelHandle, Context};
pub use error::{CloseError, ContextError, ResourceError};
pub use fault::{FaultBranch, FaultInjecting, EARLY, RETURN_KEY};
pub use resource::{Resource, ResourceHandle, ResourceState, SimulatedSession};
pub use signal::{completion_channel, CompletionReceiver, CompletionSignal};
pub use strategy::{Graceful, ShutdownStrategy};
