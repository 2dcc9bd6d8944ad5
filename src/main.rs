//! BasketForge: store selection and market-basket rule mining over retail transactions
//!
//! This is the main entrypoint that orchestrates table ingestion, store
//! selection, revenue filtering, basket construction, rule mining and
//! reporting.

use anyhow::Result;
use basketforge::{basket, cluster, mine, report, viz, Args, RetailData};
use clap::Parser;
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    if args.verbose {
        println!("BasketForge - store selection and market-basket rule mining");
        println!("============================================================\n");
    }

    run_pipeline(&args)
}

/// Run the full ingestion-to-report pipeline
fn run_pipeline(args: &Args) -> Result<()> {
    println!("=== Market-Basket Pipeline ===\n");

    let basket_key = args.basket_key_fields()?;
    let start_time = Instant::now();

    // Step 1: Load the input tables
    if args.verbose {
        println!("Step 1: Loading input tables");
        println!("  Transactions: {}", args.transactions);
        println!("  Stores: {}", args.stores);
    }

    let load_start = Instant::now();
    let mut data = RetailData::load(&args.table_paths())?;
    let load_time = load_start.elapsed();

    println!(
        "✓ Data loaded: {} transaction lines, {} stores with coordinates, {} SKUs",
        data.transactions.len(),
        data.stores.len(),
        data.skus.len()
    );
    if args.verbose {
        println!("  Loading time: {:.2}s", load_time.as_secs_f64());
        println!(
            "  Departments: {}, price rows: {}",
            data.departments.len(),
            data.prices.len()
        );
    }

    let transactions = std::mem::take(&mut data.transactions);
    let stores = std::mem::take(&mut data.stores);

    // Step 2: Cluster stores geographically and keep the medoids
    if args.verbose {
        println!("\nStep 2: Selecting stores");
        println!("  Clusters: {}", args.clusters);
        println!("  Max swap iterations: {}", args.max_swaps);
    }

    let cluster_start = Instant::now();
    let eligible = cluster::stores_in_transactions(stores, &transactions);
    let clusters = cluster::cluster_stores(eligible, args.clusters, args.max_swaps)?;
    let cluster_time = cluster_start.elapsed();

    println!(
        "✓ Selected {} medoid stores out of {}",
        clusters.k(),
        clusters.stores.len()
    );
    for medoid in clusters.medoid_stores() {
        println!(
            "  store {} ({}, {})",
            medoid.store_id, medoid.city, medoid.state
        );
    }
    if args.verbose {
        println!("  Clustering time: {:.2}s", cluster_time.as_secs_f64());
        println!("  Total deviation: {:.4}", clusters.total_deviation);
        for (i, size) in clusters.cluster_sizes().iter().enumerate() {
            println!("  Cluster {}: {} stores", i, size);
        }
    }

    let selected = cluster::restrict_to_medoids(transactions, &clusters);
    println!(
        "✓ {} transaction lines at the selected stores",
        selected.len()
    );

    // Step 3: Drop low-revenue SKUs
    if args.verbose {
        println!("\nStep 3: Filtering by SKU revenue");
        println!("  Threshold: {}", args.revenue_threshold);
    }

    let filtered = basket::filter_by_revenue(selected, args.revenue_threshold);
    println!(
        "✓ {} lines remain after the revenue filter",
        filtered.len()
    );

    // Step 4: Build baskets
    if args.verbose {
        println!("\nStep 4: Building baskets");
        println!("  Grouping key: {}", args.basket_key);
    }

    let baskets = basket::build_baskets(&filtered, &basket_key);
    println!("✓ {} baskets built", baskets.len());
    if let Some(path) = &args.baskets_out {
        basket::write_basket_file(&baskets, path)?;
        println!("  Basket file saved to: {}", path);
    }

    // Step 5: Mine association rules
    if args.verbose {
        println!("\nStep 5: Mining association rules");
        println!("  Min support: {}", args.min_support);
        println!("  Min confidence: {}", args.min_confidence);
        println!("  Max itemset size: {}", args.max_rule_len);
    }

    let mine_start = Instant::now();
    let rules = mine::mine_rules(&baskets, &args.mining_params())?;
    let mine_time = mine_start.elapsed();

    println!("✓ {} rules mined", rules.len());
    if args.verbose {
        println!("  Mining time: {:.2}s", mine_time.as_secs_f64());
    }

    // Step 6: Report
    if rules.is_empty() {
        println!("\nNo rules above the configured thresholds.");
    } else {
        let catalog = data.sku_catalog();
        let departments = data.department_names();
        let avg_retail = data.average_retail();

        println!("\n=== Top Rules ===");
        print!(
            "{}",
            report::render_top_detail(&rules, &catalog, &departments, &avg_retail, 10)
        );

        println!("\n=== Ranked Rules ===");
        print!("{}", report::render_rules(&rules));
    }

    if let Some(path) = &args.rules_out {
        report::write_rules_csv(&rules, path)?;
        println!("\nRules saved to: {}", path);
    }

    if let Some(path) = &args.plot {
        viz::generate_cluster_report(&clusters, path)?;
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
