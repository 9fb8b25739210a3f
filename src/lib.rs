// src/lib.rs
pub mod cli;
pub mod config;
pub mod pipelines;
pub mod runner;
pub mod utils;
pub use cli::{Arguments, InputType, RunnerKind};
