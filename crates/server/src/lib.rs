//! Cluster metrics HTTP service

pub mod api;
pub mod config;
