#![no_std]

// Shared logic for the step-response bench.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. The firmware drives the sampler against real pins and
// timers; the host reuses the wire protocol and time base to parse the stream.

pub mod config;
pub mod protocol;
pub mod queue;
pub mod sampler;
pub mod stream;
pub mod timebase;
