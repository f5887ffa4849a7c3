//! Test helpers for code that shells out through `CommandRunner`.

pub mod scripted_runner;

pub use scripted_runner::ScriptedRunner;
