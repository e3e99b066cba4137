//! Shared fixtures for the tests of the workspace.
//!
//! The fixtures are built in memory, no test depends on network access or downloaded assets.

pub mod tokenizer;
