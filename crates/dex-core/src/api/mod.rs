//! Dataset API integration
//!
//! This module contains the HTTP client for the dataset platform, endpoint
//! URL builders, and the wire types the platform exchanges.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::DatasetClient;
