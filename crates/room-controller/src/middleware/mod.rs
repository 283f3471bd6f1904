//! Middleware pipelines and the room authorization middlewares.

pub mod lock;
pub mod pipeline;

pub use lock::{create_lock_middleware, LockMiddleware, LOCK_ROOM, UNLOCK_ROOM};
pub use pipeline::{Middleware, Next, Pipeline, PipelineContext};
