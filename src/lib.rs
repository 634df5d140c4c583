// src/lib.rs
//! Client-side core for a tvfamily media server: a typed wrapper over the
//! HTTP API, an on-disk picture cache and a request machinery that runs
//! server calls on worker threads and delivers results back on the
//! caller's event loop.

pub mod api;
pub mod config;
pub mod core;
pub mod data;
