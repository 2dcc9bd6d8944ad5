//! Per-SKU revenue filtering and basket construction.
//!
//! A basket is one purchase event: the distinct SKUs of all transaction
//! lines sharing a grouping key. The key defaults to (store, register,
//! transaction number, date) but is configurable, since the composite-key
//! assumption is not a verified invariant of the source data.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use csv::WriterBuilder;
use log::info;

use crate::data::TransactionLine;

/// Default grouping key for baskets.
pub const DEFAULT_BASKET_KEY: &str = "store,register,transaction,date";

/// One component of the configurable basket grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasketKeyField {
    Store,
    Register,
    Transaction,
    Date,
}

impl FromStr for BasketKeyField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(BasketKeyField::Store),
            "register" => Ok(BasketKeyField::Register),
            "transaction" => Ok(BasketKeyField::Transaction),
            "date" => Ok(BasketKeyField::Date),
            other => Err(anyhow::anyhow!(
                "unknown basket key field '{}' (expected store, register, transaction or date)",
                other
            )),
        }
    }
}

/// Parse a comma-separated basket key specification such as
/// `"store,register,transaction,date"`.
pub fn parse_basket_key(spec: &str) -> crate::Result<Vec<BasketKeyField>> {
    let mut fields = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let field: BasketKeyField = part.parse()?;
        if fields.contains(&field) {
            bail!("basket key field '{}' listed twice", part);
        }
        fields.push(field);
    }
    if fields.is_empty() {
        bail!("basket key must name at least one field");
    }
    Ok(fields)
}

/// A concrete key value for one basket group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Store(u32),
    Register(u32),
    Transaction(u32),
    Date(NaiveDate),
}

/// One purchase event: the distinct SKUs bought under one key.
#[derive(Debug, Clone)]
pub struct Basket {
    pub key: Vec<KeyPart>,
    /// Distinct SKU ids, ascending.
    pub sku_ids: Vec<u32>,
}

/// Total revenue (sum of `amount`) per SKU across all lines.
///
/// Returns and negative amounts are summed as-is, so a returns-heavy SKU
/// ends up with low or negative net revenue.
pub fn sku_revenue(lines: &[TransactionLine]) -> HashMap<u32, f64> {
    let mut revenue = HashMap::new();
    for line in lines {
        *revenue.entry(line.sku_id).or_insert(0.0) += line.amount;
    }
    revenue
}

/// Keep only lines whose SKU's total revenue is strictly greater than
/// `threshold`. The aggregation is global across all retained stores, not
/// per store.
pub fn filter_by_revenue(lines: Vec<TransactionLine>, threshold: f64) -> Vec<TransactionLine> {
    let revenue = sku_revenue(&lines);
    let keep: HashSet<u32> = revenue
        .iter()
        .filter(|&(_, &total)| total > threshold)
        .map(|(&sku, _)| sku)
        .collect();

    let total_skus = revenue.len();
    let total_lines = lines.len();
    let retained: Vec<TransactionLine> = lines
        .into_iter()
        .filter(|line| keep.contains(&line.sku_id))
        .collect();

    info!(
        "revenue filter: kept {} of {} SKUs with revenue > {:.2}, {} of {} lines",
        keep.len(),
        total_skus,
        threshold,
        retained.len(),
        total_lines
    );
    retained
}

/// Group lines by the configured key and collapse each group to its
/// distinct SKU set.
///
/// Baskets come back ordered by key and with ascending SKU lists, so the
/// serialization (and everything derived from it) is stable across runs.
pub fn build_baskets(lines: &[TransactionLine], key_fields: &[BasketKeyField]) -> Vec<Basket> {
    let mut groups: BTreeMap<Vec<KeyPart>, BTreeSet<u32>> = BTreeMap::new();
    for line in lines {
        groups
            .entry(basket_key(line, key_fields))
            .or_default()
            .insert(line.sku_id);
    }
    let baskets: Vec<Basket> = groups
        .into_iter()
        .map(|(key, skus)| Basket {
            key,
            sku_ids: skus.into_iter().collect(),
        })
        .collect();
    info!("built {} baskets from {} lines", baskets.len(), lines.len());
    baskets
}

fn basket_key(line: &TransactionLine, key_fields: &[BasketKeyField]) -> Vec<KeyPart> {
    key_fields
        .iter()
        .map(|field| match field {
            BasketKeyField::Store => KeyPart::Store(line.store_id),
            BasketKeyField::Register => KeyPart::Register(line.register_id),
            BasketKeyField::Transaction => KeyPart::Transaction(line.transaction_num),
            BasketKeyField::Date => KeyPart::Date(line.sale_date),
        })
        .collect()
}

/// Write the intermediate basket file: one basket per line, SKU ids
/// comma-delimited in ascending order. Kept for compatibility with
/// external miners that expect this format; the in-memory pipeline does
/// not read it back.
pub fn write_basket_file(baskets: &[Basket], path: &str) -> crate::Result<()> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("cannot create basket file at {}", path))?;
    for basket in baskets {
        let fields: Vec<String> = basket.sku_ids.iter().map(|sku| sku.to_string()).collect();
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    info!("wrote {} baskets to {}", baskets.len(), path);
    Ok(())
}
