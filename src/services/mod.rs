// src/services/mod.rs
pub mod alpha_vantage;
pub mod bigquery;
pub mod coerce;
pub mod embeddings;
pub mod fetch;
pub mod financials;
pub mod google_oauth;
pub mod news_api;
pub mod risk;
pub mod sentiment;
pub mod yahoo;
