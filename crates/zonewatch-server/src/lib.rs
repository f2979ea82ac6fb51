//! # zonewatch-server
//!
//! HTTP host for the zonewatch geofencing subsystem.
//!
//! The device forwards its region-monitoring callbacks here; this library
//! provides the API handlers, the webhook client that submits location
//! updates, and the state tying them to a [`zonewatch_core::Coordinator`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod platform;
pub mod state;
pub mod webhook;
