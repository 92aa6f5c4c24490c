//! # HTTP surface
//!
//! Routers and handlers for both binaries. Split per service since their
//! route sets and state shapes differ; [`common`] holds the pieces they
//! share (error translation).

pub mod common;
pub mod query;
pub mod update;
