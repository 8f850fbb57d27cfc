//! # locus-server
//!
//! HTTP server library for the locus location service.
//!
//! This library provides the API handlers and state management for locus.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
