#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod angular;
mod blueprint;
pub mod config;
mod core;
mod engine;
mod error;
pub mod fileset;
pub mod html;
pub mod inject;
pub mod pipeline;
mod reload;
pub mod tasks;
pub mod tools;
pub mod utils;
pub mod vendor;

pub use crate::blueprint::{Blueprint, TaskDef, Taskfile};
pub use crate::config::Project;
pub use crate::core::{Environment, Mode, TaskContext};
pub use crate::engine::{Diagnostics, RunToken, TaskExecution};
#[cfg(feature = "live")]
pub use crate::engine::{ChangeKind, Policy, WatchRule};
pub use crate::error::*;
pub use crate::fileset::FileSet;
