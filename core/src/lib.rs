//! Builds one bootloader image per benchmark.
//!
//! For every benchmark in the catalog the selector line of the device-tree
//! include is rewritten, the bootloader project is cleaned and rebuilt, and
//! the resulting image is copied to `<output_dir>/<benchmark>.bin`.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod dts;
pub mod make;
pub mod manifest;
pub mod pipeline;

#[cfg(test)]
mod artifact_test;

pub use catalog::{Benchmark, Catalog};
pub use config::SdBinsConfig;
pub use pipeline::{Pipeline, RunOptions, RunReport};
