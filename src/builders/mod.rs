pub mod pacer_builder;

pub use pacer_builder::{build_task_runner, PacerBuilder};
