//! Rendering of mined rules as console tables and CSV exports.

use std::collections::HashMap;

use anyhow::Context;
use csv::Writer;

use crate::data::Sku;
use crate::mine::Rule;

/// Render the full ranked rule list as an aligned text table.
pub fn render_rules(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "no rules above the configured thresholds\n".to_string();
    }
    let label_width = rules
        .iter()
        .map(|r| r.label().len())
        .max()
        .unwrap_or(0)
        .max("rule".len());

    let mut out = String::new();
    out.push_str(&format!(
        "{:>4}  {:<width$}  {:>10}  {:>10}  {:>12}\n",
        "#",
        "rule",
        "support",
        "confidence",
        "lift",
        width = label_width
    ));
    for (rank, rule) in rules.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:>10.6}  {:>10.6}  {:>12.4}\n",
            rank + 1,
            rule.label(),
            rule.support,
            rule.confidence,
            rule.lift,
            width = label_width
        ));
    }
    out
}

/// Render the top `limit` rules with one catalog line per SKU: brand,
/// department and average retail price where the dimension tables have
/// them, an explicit placeholder where they do not.
pub fn render_top_detail(
    rules: &[Rule],
    catalog: &HashMap<u32, &Sku>,
    departments: &HashMap<u32, &str>,
    avg_retail: &HashMap<u32, f64>,
    limit: usize,
) -> String {
    let mut out = String::new();
    for (rank, rule) in rules.iter().take(limit).enumerate() {
        out.push_str(&format!(
            "{:>3}. {}   support {:.6}  confidence {:.6}  lift {:.4}\n",
            rank + 1,
            rule.label(),
            rule.support,
            rule.confidence,
            rule.lift
        ));
        for &sku_id in rule.antecedent.iter().chain(rule.consequent.iter()) {
            out.push_str("       ");
            out.push_str(&annotate_sku(sku_id, catalog, departments, avg_retail));
            out.push('\n');
        }
    }
    out
}

fn annotate_sku(
    sku_id: u32,
    catalog: &HashMap<u32, &Sku>,
    departments: &HashMap<u32, &str>,
    avg_retail: &HashMap<u32, f64>,
) -> String {
    let Some(sku) = catalog.get(&sku_id) else {
        return format!("sku {}: no catalog entry", sku_id);
    };
    let brand = if sku.brand.is_empty() {
        "-"
    } else {
        sku.brand.as_str()
    };
    let dept = departments
        .get(&sku.dept_id)
        .copied()
        .unwrap_or("unknown dept");
    match avg_retail.get(&sku_id) {
        Some(price) => format!(
            "sku {}: brand {}, dept {}, avg retail ${:.2}",
            sku_id, brand, dept, price
        ),
        None => format!("sku {}: brand {}, dept {}, no price data", sku_id, brand, dept),
    }
}

/// Write the ranked rules to a CSV file with a header row.
pub fn write_rules_csv(rules: &[Rule], path: &str) -> crate::Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("cannot create rule file at {}", path))?;
    writer.write_record(["rule", "support", "confidence", "lift"])?;
    for rule in rules {
        writer.write_record([
            rule.label(),
            format!("{:.6}", rule.support),
            format!("{:.6}", rule.confidence),
            format!("{:.4}", rule.lift),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
