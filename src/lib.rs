//! Data-aggregation controller behind the NYC taxi dashboard.
//!
//! Views are assembled by [`controller::ViewController`] from datasets
//! fetched through a [`gateway::DataSource`] and memoised in a
//! [`cache::SessionCache`]. The controller emits plain
//! [`output::ViewFrame`] values; drawing them is left to an
//! [`output::Renderer`].
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod gateway;
pub mod insights;
pub mod normalize;
pub mod output;
pub mod pagination;
pub mod types;
pub mod util;
