//! Integration test common infrastructure.
//!
//! An in-process session server wired to a simulated fabric router, and a
//! client handle that sends requests under its connection's current sender
//! identity.

#![allow(dead_code)]

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{TestServer, eventually, sample_dna};
