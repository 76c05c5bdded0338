// src/lib.rs

//! mirrorgate library
//!
//! Resolves manga entries across several third-party mirrors and normalizes
//! them into one canonical shape.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;
