//! BasketForge: market-basket rule mining over geographically selected retail stores
//!
//! This library ingests positional retail flat files (stores, SKUs, prices,
//! departments, ZIP coordinates and transaction lines), picks a spread of
//! representative stores by k-medoids clustering on store coordinates, and
//! mines association rules from the selected stores' high-revenue baskets.

pub mod basket;
pub mod cli;
pub mod cluster;
pub mod data;
pub mod mine;
pub mod report;
pub mod viz;

// Re-export public items for easier access
pub use basket::{build_baskets, filter_by_revenue, Basket, BasketKeyField};
pub use cli::Args;
pub use cluster::{cluster_stores, StoreClusters};
pub use data::{RetailData, TablePaths, TransactionLine};
pub use mine::{mine_rules, MiningParams, Rule};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
