//! Runtime adapters: bounded run dispatch on top of an async executor.

pub mod dispatcher;
pub mod tokio_spawner;

pub use dispatcher::{Dispatcher, Spawn};
pub use tokio_spawner::TokioSpawner;
