//! artifactor-lib: build orchestration for deployable artifacts.
//!
//! This crate turns a checked-out repository into published artifacts:
//! - `process`: running external commands, alone or piped, with cancellation
//! - `credentials`: concurrent acquisition of the short-lived credentials a build needs
//! - `build`: the task model and the orchestrator that runs tasks in order, failing fast
//! - `config`: reading the `builds.yaml` task configuration
//! - `source`: fetching a repository at a commit into a temporary directory
//! - `settings`: run settings from `ARTIFACTOR_*` environment variables

pub mod build;
pub mod config;
pub mod consts;
pub mod credentials;
pub mod process;
pub mod settings;
pub mod source;
pub mod util;
