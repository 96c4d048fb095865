pub mod api;
pub mod astro;
pub mod config;
pub mod context;
pub mod error;
pub mod measurement;
pub mod ratelimit;
pub mod stats;
pub mod store;
pub mod verdict;
