//! Host metric sources
//!
//! - [`sampler::SystemSampler`]: reads CPU, memory, disk, network and process
//!   figures through `sysinfo`
//! - [`sampler::Clock`]: produces non-decreasing [`Timestamp`](crate::Timestamp)s

pub mod sampler;

pub use sampler::{Clock, Sampler, SystemSampler};
