//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::basket::{parse_basket_key, BasketKeyField, DEFAULT_BASKET_KEY};
use crate::data::TablePaths;
use crate::mine::MiningParams;

/// Market-basket rule mining over geographically selected retail stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the department dimension table
    #[arg(long, default_value = "data/deptinfo.csv")]
    pub departments: String,

    /// Path to the SKU dimension table
    #[arg(long, default_value = "data/skuinfo.csv")]
    pub skus: String,

    /// Path to the per-store SKU pricing table
    #[arg(long, default_value = "data/skstinfo.csv")]
    pub prices: String,

    /// Path to the store metadata table
    #[arg(long, default_value = "data/strinfo.csv")]
    pub stores: String,

    /// Path to the ZIP-to-coordinates reference table
    #[arg(long, default_value = "data/zip_latlong.csv")]
    pub zip_coords: String,

    /// Path to the transaction fact table
    #[arg(long, default_value = "data/trnsact.csv")]
    pub transactions: String,

    /// Number of geographic clusters, and therefore of selected stores
    #[arg(short = 'k', long, default_value = "10")]
    pub clusters: usize,

    /// Maximum number of PAM swap iterations
    #[arg(long, default_value = "100")]
    pub max_swaps: usize,

    /// Keep only SKUs whose total revenue strictly exceeds this amount
    #[arg(long, default_value = "2000.0")]
    pub revenue_threshold: f64,

    /// Minimum itemset support as a fraction of all baskets
    #[arg(long, default_value = "0.0001")]
    pub min_support: f64,

    /// Minimum rule confidence
    #[arg(long, default_value = "0.1")]
    pub min_confidence: f64,

    /// Largest itemset size to mine
    #[arg(long, default_value = "4")]
    pub max_rule_len: usize,

    /// Number of top rules (ranked by lift) to report
    #[arg(long, default_value = "100")]
    pub top_n: usize,

    /// Comma-separated fields forming the basket grouping key
    #[arg(long, default_value = DEFAULT_BASKET_KEY)]
    pub basket_key: String,

    /// Write the ranked rules to this CSV file
    #[arg(long)]
    pub rules_out: Option<String>,

    /// Write the intermediate basket file (one basket per line)
    #[arg(long)]
    pub baskets_out: Option<String>,

    /// Write cluster diagnostic plots, starting at this PNG path
    #[arg(long)]
    pub plot: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// The six input table paths as one bundle.
    pub fn table_paths(&self) -> TablePaths<'_> {
        TablePaths {
            departments: &self.departments,
            skus: &self.skus,
            prices: &self.prices,
            stores: &self.stores,
            zip_coords: &self.zip_coords,
            transactions: &self.transactions,
        }
    }

    /// Mining thresholds from the corresponding flags.
    pub fn mining_params(&self) -> MiningParams {
        MiningParams {
            min_support: self.min_support,
            min_confidence: self.min_confidence,
            max_len: self.max_rule_len,
            top_n: self.top_n,
        }
    }

    /// Parse the basket key specification.
    pub fn basket_key_fields(&self) -> crate::Result<Vec<BasketKeyField>> {
        parse_basket_key(&self.basket_key)
    }
}
