//! Engine and HTTP drivers for serverbench
//!
//! This crate provides the implementations behind two core traits:
//!
//! - [`DockerDriver`]: `ContainerDriver` over the docker CLI, including
//!   compose stacks and `docker stats` sampling
//! - [`HttpTarget`]: `TargetClient` over a pooled reqwest client

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compose;
pub mod docker;
pub mod http;
pub mod process;
pub mod stats;

pub use docker::{DockerConfig, DockerDriver};
pub use http::{HttpConfig, HttpTarget};
