// src/lib.rs
pub mod config;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_support;
