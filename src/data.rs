//! Typed ingestion of the retail input tables.
//!
//! All six inputs are headerless, positional flat files. Parsing is
//! deliberately permissive: ragged rows are tolerated, malformed rows are
//! skipped and counted rather than rejected, and invalid SKU ids (zero or
//! missing) are filtered out at the door.

use std::collections::HashMap;
use std::fs::File;
use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};

/// Department dimension row (first 2 columns of the department table).
#[derive(Debug, Clone)]
pub struct Department {
    pub dept_id: u32,
    pub description: String,
}

/// SKU dimension row (first 10 columns of the SKU table).
#[derive(Debug, Clone)]
pub struct Sku {
    pub sku_id: u32,
    pub dept_id: u32,
    pub class_id: String,
    pub upc: String,
    pub style: String,
    pub color: String,
    pub size: String,
    pub pack_size: String,
    pub vendor: String,
    pub brand: String,
}

/// Per-store SKU pricing row (first 4 columns of the pricing table).
#[derive(Debug, Clone, Copy)]
pub struct SkuPrice {
    pub sku_id: u32,
    pub store_id: u32,
    pub cost: f64,
    pub retail: f64,
}

/// Store metadata row (first 4 columns of the store table).
#[derive(Debug, Clone)]
pub struct Store {
    pub store_id: u32,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Store metadata joined to its ZIP-code coordinates.
#[derive(Debug, Clone)]
pub struct StoreGeo {
    pub store_id: u32,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One transaction fact row.
///
/// The raw file carries 14 positional columns; columns 9 and 14 (1-based)
/// are unexplained in the source data and dropped, leaving the 12 fields
/// below in file order.
#[derive(Debug, Clone)]
pub struct TransactionLine {
    /// Stock keeping unit sold on this line.
    pub sku_id: u32,
    /// Store where the sale was rung up.
    pub store_id: u32,
    /// Register within the store.
    pub register_id: u32,
    /// Register-local transaction number.
    pub transaction_num: u32,
    /// Opaque interim identifier carried through from the source.
    pub interim_id: String,
    /// Date of sale.
    pub sale_date: NaiveDate,
    /// Sale type code (purchase/return in the source data).
    pub sale_type: String,
    /// Units sold.
    pub quantity: i32,
    /// Original ticket price.
    pub original_price: f64,
    /// Amount actually paid for the line.
    pub amount: f64,
    /// Line sequence number.
    pub sequence: u64,
    /// Merchandise identification code.
    pub mic_code: String,
}

/// Paths to the six input tables.
#[derive(Debug, Clone, Copy)]
pub struct TablePaths<'a> {
    pub departments: &'a str,
    pub skus: &'a str,
    pub prices: &'a str,
    pub stores: &'a str,
    pub zip_coords: &'a str,
    pub transactions: &'a str,
}

/// Everything the pipeline ingests, loaded and validity-filtered.
#[derive(Debug)]
pub struct RetailData {
    pub departments: Vec<Department>,
    pub skus: Vec<Sku>,
    pub prices: Vec<SkuPrice>,
    /// Stores with resolvable coordinates; stores with unknown ZIPs are dropped.
    pub stores: Vec<StoreGeo>,
    pub transactions: Vec<TransactionLine>,
}

impl RetailData {
    /// Load all six tables and join stores to their coordinates.
    ///
    /// The dimension tables (departments, SKUs, prices) may be empty; the
    /// store, ZIP and transaction tables must yield at least one valid row
    /// or the pipeline has nothing to work on.
    pub fn load(paths: &TablePaths) -> crate::Result<RetailData> {
        let departments = load_departments(paths.departments)?;
        let skus = load_skus(paths.skus)?;
        let prices = load_sku_prices(paths.prices)?;
        let stores = load_stores(paths.stores)?;
        let zip_coords = load_zip_coords(paths.zip_coords)?;
        let transactions = load_transactions(paths.transactions)?;

        if departments.is_empty() {
            warn!("department table {} yielded no rows", paths.departments);
        }
        if skus.is_empty() {
            warn!("SKU table {} yielded no rows", paths.skus);
        }
        if prices.is_empty() {
            warn!("pricing table {} yielded no rows", paths.prices);
        }
        if stores.is_empty() {
            anyhow::bail!("no valid store rows in {}", paths.stores);
        }
        if zip_coords.is_empty() {
            anyhow::bail!("no valid ZIP coordinate rows in {}", paths.zip_coords);
        }
        if transactions.is_empty() {
            anyhow::bail!("no valid transaction lines in {}", paths.transactions);
        }

        let stores = resolve_store_coordinates(stores, &zip_coords);
        if stores.is_empty() {
            anyhow::bail!(
                "none of the stores in {} have a resolvable ZIP code",
                paths.stores
            );
        }

        Ok(RetailData {
            departments,
            skus,
            prices,
            stores,
            transactions,
        })
    }

    /// SKU id to catalog row, for annotating mined rules.
    pub fn sku_catalog(&self) -> HashMap<u32, &Sku> {
        self.skus.iter().map(|s| (s.sku_id, s)).collect()
    }

    /// Department id to description.
    pub fn department_names(&self) -> HashMap<u32, &str> {
        self.departments
            .iter()
            .map(|d| (d.dept_id, d.description.as_str()))
            .collect()
    }

    /// Mean retail price per SKU across all stores that price it.
    pub fn average_retail(&self) -> HashMap<u32, f64> {
        let mut sums: HashMap<u32, (f64, u32)> = HashMap::new();
        for price in &self.prices {
            let entry = sums.entry(price.sku_id).or_insert((0.0, 0));
            entry.0 += price.retail;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(sku, (sum, count))| (sku, sum / f64::from(count)))
            .collect()
    }
}

/// Load the department table (dept_id, description).
pub fn load_departments(path: &str) -> crate::Result<Vec<Department>> {
    load_table(path, "departments", parse_department)
}

/// Load the SKU table; rows with a zero or unparseable SKU id are dropped.
pub fn load_skus(path: &str) -> crate::Result<Vec<Sku>> {
    load_table(path, "skus", parse_sku)
}

/// Load the per-store SKU pricing table.
pub fn load_sku_prices(path: &str) -> crate::Result<Vec<SkuPrice>> {
    load_table(path, "prices", parse_sku_price)
}

/// Load the store metadata table.
pub fn load_stores(path: &str) -> crate::Result<Vec<Store>> {
    load_table(path, "stores", parse_store)
}

/// Load the ZIP-to-coordinate reference table. The first occurrence of a
/// ZIP wins when the reference file carries duplicates.
pub fn load_zip_coords(path: &str) -> crate::Result<HashMap<String, (f64, f64)>> {
    let rows: Vec<(String, f64, f64)> = load_table(path, "zip coordinates", parse_zip_coord)?;
    let mut coords = HashMap::with_capacity(rows.len());
    for (zip, lat, lon) in rows {
        coords.entry(zip).or_insert((lat, lon));
    }
    Ok(coords)
}

/// Load the transaction fact table, mapping 14 raw columns to the 12
/// retained fields and dropping rows missing any pipeline-critical field.
pub fn load_transactions(path: &str) -> crate::Result<Vec<TransactionLine>> {
    load_table(path, "transactions", parse_transaction)
}

/// Join stores to coordinates by ZIP; stores without a match are dropped.
pub fn resolve_store_coordinates(
    stores: Vec<Store>,
    zip_coords: &HashMap<String, (f64, f64)>,
) -> Vec<StoreGeo> {
    let total = stores.len();
    let mut resolved = Vec::with_capacity(total);
    for store in stores {
        match zip_coords.get(&store.zip) {
            Some(&(latitude, longitude)) => resolved.push(StoreGeo {
                store_id: store.store_id,
                city: store.city,
                state: store.state,
                zip: store.zip,
                latitude,
                longitude,
            }),
            None => {
                debug!(
                    "store {} dropped: ZIP {} has no coordinates",
                    store.store_id, store.zip
                );
            }
        }
    }
    let dropped = total - resolved.len();
    if dropped > 0 {
        warn!(
            "stores: dropped {} of {} rows with unresolvable ZIP codes",
            dropped, total
        );
    }
    resolved
}

/// Stream a positional CSV file through `parse`, skipping and counting
/// rows the parser rejects.
fn load_table<T>(
    path: &str,
    table: &str,
    parse: impl Fn(&StringRecord) -> Option<T>,
) -> crate::Result<Vec<T>> {
    let file =
        File::open(path).with_context(|| format!("cannot open {} table at {}", table, path))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                dropped += 1;
                debug!("{}: unreadable row {} in {}", table, idx + 1, path);
                continue;
            }
        };
        match parse(&record) {
            Some(row) => rows.push(row),
            None => {
                dropped += 1;
                debug!("{}: malformed row {} in {}", table, idx + 1, path);
            }
        }
    }
    if dropped > 0 {
        warn!("{}: skipped {} malformed rows from {}", table, dropped, path);
    }
    debug!("{}: loaded {} rows from {}", table, rows.len(), path);
    Ok(rows)
}

fn field<'a>(record: &'a StringRecord, idx: usize) -> Option<&'a str> {
    match record.get(idx) {
        Some(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn num_field<T: FromStr>(record: &StringRecord, idx: usize) -> Option<T> {
    field(record, idx)?.parse().ok()
}

fn text_field(record: &StringRecord, idx: usize) -> String {
    field(record, idx).unwrap_or("").to_string()
}

fn parse_department(record: &StringRecord) -> Option<Department> {
    Some(Department {
        dept_id: num_field(record, 0)?,
        description: field(record, 1)?.to_string(),
    })
}

fn parse_sku(record: &StringRecord) -> Option<Sku> {
    let sku_id: u32 = num_field(record, 0)?;
    if sku_id == 0 {
        return None;
    }
    // Identity columns are mandatory; the descriptive tail of the SKU
    // table is ragged in the source data, so missing text defaults empty.
    Some(Sku {
        sku_id,
        dept_id: num_field(record, 1)?,
        class_id: text_field(record, 2),
        upc: text_field(record, 3),
        style: text_field(record, 4),
        color: text_field(record, 5),
        size: text_field(record, 6),
        pack_size: text_field(record, 7),
        vendor: text_field(record, 8),
        brand: text_field(record, 9),
    })
}

fn parse_sku_price(record: &StringRecord) -> Option<SkuPrice> {
    let sku_id: u32 = num_field(record, 0)?;
    if sku_id == 0 {
        return None;
    }
    Some(SkuPrice {
        sku_id,
        store_id: num_field(record, 1)?,
        cost: num_field(record, 2)?,
        retail: num_field(record, 3)?,
    })
}

fn parse_store(record: &StringRecord) -> Option<Store> {
    Some(Store {
        store_id: num_field(record, 0)?,
        city: text_field(record, 1),
        state: text_field(record, 2),
        zip: field(record, 3)?.to_string(),
    })
}

fn parse_zip_coord(record: &StringRecord) -> Option<(String, f64, f64)> {
    Some((
        field(record, 0)?.to_string(),
        num_field(record, 1)?,
        num_field(record, 2)?,
    ))
}

fn parse_transaction(record: &StringRecord) -> Option<TransactionLine> {
    // Raw columns are 0..14; indices 8 and 13 are the dropped columns 9
    // and 14 of the source layout.
    let sku_id: u32 = num_field(record, 0)?;
    if sku_id == 0 {
        return None;
    }
    let sale_date = NaiveDate::parse_from_str(field(record, 5)?, "%Y-%m-%d").ok()?;
    Some(TransactionLine {
        sku_id,
        store_id: num_field(record, 1)?,
        register_id: num_field(record, 2)?,
        transaction_num: num_field(record, 3)?,
        interim_id: text_field(record, 4),
        sale_date,
        sale_type: text_field(record, 6),
        quantity: num_field(record, 7).unwrap_or(0),
        original_price: num_field(record, 9).unwrap_or(0.0),
        amount: num_field(record, 10)?,
        sequence: num_field(record, 11).unwrap_or(0),
        mic_code: text_field(record, 12),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_transaction_column_mapping() {
        let file = write_file(&["4108,504,120,30001,0,2004-08-21,P,1,x,24.00,12.50,9001,53,y"]);
        let lines = load_transactions(file.path().to_str().unwrap()).unwrap();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.sku_id, 4108);
        assert_eq!(line.store_id, 504);
        assert_eq!(line.register_id, 120);
        assert_eq!(line.transaction_num, 30001);
        assert_eq!(line.interim_id, "0");
        assert_eq!(line.sale_date, NaiveDate::from_ymd_opt(2004, 8, 21).unwrap());
        assert_eq!(line.sale_type, "P");
        assert_eq!(line.quantity, 1);
        assert_eq!(line.original_price, 24.00);
        assert_eq!(line.amount, 12.50);
        assert_eq!(line.sequence, 9001);
        assert_eq!(line.mic_code, "53");
    }

    #[test]
    fn test_invalid_transactions_skipped() {
        let file = write_file(&[
            // valid
            "4108,504,120,30001,0,2004-08-21,P,1,x,24.00,12.50,9001,53,y",
            // zero SKU id
            "0,504,120,30002,0,2004-08-21,P,1,x,24.00,12.50,9002,53,y",
            // unparseable date
            "4108,504,120,30003,0,not-a-date,P,1,x,24.00,12.50,9003,53,y",
            // ragged: amount column missing entirely
            "4108,504,120,30004",
            // valid with the trailing dropped column absent
            "777,504,121,30005,0,2004-08-22,P,2,x,5.00,9.99,9004,53",
        ]);
        let lines = load_transactions(file.path().to_str().unwrap()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sku_id, 4108);
        assert_eq!(lines[1].sku_id, 777);
        assert_eq!(lines[1].amount, 9.99);
    }

    #[test]
    fn test_ragged_sku_rows_tolerated() {
        let file = write_file(&[
            "4108,800,1,000123,classic,red,M,1,ACME,BRANDX",
            // descriptive tail missing: still a usable SKU row
            "777,801",
            // missing department id: dropped
            "778",
            // zero id: dropped
            "0,800,1,000123,classic,red,M,1,ACME,BRANDX",
        ]);
        let skus = load_skus(file.path().to_str().unwrap()).unwrap();
        assert_eq!(skus.len(), 2);
        assert_eq!(skus[0].brand, "BRANDX");
        assert_eq!(skus[1].sku_id, 777);
        assert_eq!(skus[1].brand, "");
    }

    #[test]
    fn test_store_zip_join_drops_unresolvable() {
        let stores = vec![
            Store {
                store_id: 101,
                city: "AUSTIN".into(),
                state: "TX".into(),
                zip: "78701".into(),
            },
            Store {
                store_id: 102,
                city: "NOWHERE".into(),
                state: "ZZ".into(),
                zip: "00000".into(),
            },
        ];
        let mut zips = HashMap::new();
        zips.insert("78701".to_string(), (30.27, -97.74));

        let resolved = resolve_store_coordinates(stores, &zips);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].store_id, 101);
        assert!((resolved[0].latitude - 30.27).abs() < 1e-9);
    }

    #[test]
    fn test_zip_coords_first_occurrence_wins() {
        let file = write_file(&["78701,30.27,-97.74", "78701,99.0,99.0"]);
        let coords = load_zip_coords(file.path().to_str().unwrap()).unwrap();
        assert_eq!(coords.len(), 1);
        assert!((coords["78701"].0 - 30.27).abs() < 1e-9);
    }

    #[test]
    fn test_average_retail() {
        let data = RetailData {
            departments: vec![],
            skus: vec![],
            prices: vec![
                SkuPrice {
                    sku_id: 1,
                    store_id: 101,
                    cost: 4.0,
                    retail: 10.0,
                },
                SkuPrice {
                    sku_id: 1,
                    store_id: 102,
                    cost: 4.0,
                    retail: 14.0,
                },
                SkuPrice {
                    sku_id: 2,
                    store_id: 101,
                    cost: 1.0,
                    retail: 2.0,
                },
            ],
            stores: vec![],
            transactions: vec![],
        };
        let retail = data.average_retail();
        assert!((retail[&1] - 12.0).abs() < 1e-9);
        assert!((retail[&2] - 2.0).abs() < 1e-9);
    }
}
