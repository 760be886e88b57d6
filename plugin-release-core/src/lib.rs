#![doc = "plugin-release-core: stages for shipping a host-application plugin tarball."]

//! This crate holds every pipeline stage and the scheduler that chains them:
//! mirror sync, lint, clean, build, package, release, manifest version alignment
//! and the dev watch loop. It has no opinion about where artifacts are stored;
//! the CLI crate supplies an [`contract::ArtifactStore`].
//!
//! # Usage
//! Build a [`pipeline::Pipeline`] from a [`config::PipelineConfig`] and run the
//! stages you need; prerequisites are added automatically.

pub mod clean;
pub mod config;
pub mod contract;
pub mod error;
pub mod lint;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod release;
pub mod sync;
pub mod watch;
