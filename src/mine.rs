//! Apriori frequent-itemset mining and association-rule generation.
//!
//! Works on the distinct-SKU baskets produced by [`crate::basket`]. Itemsets
//! are grown level by level with the classic join-and-prune step, then every
//! frequent itemset of two or more SKUs is split into antecedent/consequent
//! pairs and scored by support, confidence and lift.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use anyhow::bail;
use log::{info, warn};

use crate::basket::Basket;

/// Thresholds and limits for the miner.
#[derive(Debug, Clone, Copy)]
pub struct MiningParams {
    /// Minimum fraction of baskets an itemset must appear in, in (0, 1].
    pub min_support: f64,
    /// Minimum rule confidence, in [0, 1].
    pub min_confidence: f64,
    /// Largest itemset size to grow, between 2 and 63.
    pub max_len: usize,
    /// Number of rules to keep after ranking by lift.
    pub top_n: usize,
}

impl Default for MiningParams {
    fn default() -> Self {
        MiningParams {
            min_support: 0.0001,
            min_confidence: 0.1,
            max_len: 4,
            top_n: 100,
        }
    }
}

/// One association rule (antecedent -> consequent) with its metrics.
///
/// `support` is the fraction of baskets containing the full itemset,
/// `confidence` the fraction of antecedent baskets that also hold the
/// consequent, and `lift` the ratio of confidence to the consequent's
/// base rate. Lift above 1.0 means the SKUs co-occur more often than
/// independence would predict.
#[derive(Debug, Clone)]
pub struct Rule {
    pub antecedent: Vec<u32>,
    pub consequent: Vec<u32>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

impl Rule {
    /// Human-readable form, e.g. `"839404 857653 -> 839405"`.
    pub fn label(&self) -> String {
        format!(
            "{} -> {}",
            join_ids(&self.antecedent),
            join_ids(&self.consequent)
        )
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mine association rules from `baskets`, ranked by lift descending.
///
/// The absolute support floor is the smallest basket count whose
/// fraction of all baskets reaches `min_support`, never below one
/// basket. Support and confidence floors are inclusive.
/// Ties in lift are broken by support, then by antecedent and consequent
/// ids, so the ranking is stable across runs.
pub fn mine_rules(baskets: &[Basket], params: &MiningParams) -> crate::Result<Vec<Rule>> {
    validate(params)?;
    if baskets.is_empty() {
        warn!("no baskets to mine, skipping rule generation");
        return Ok(Vec::new());
    }

    let n = baskets.len();
    let min_count = support_floor(params.min_support, n);
    let transactions: Vec<&[u32]> = baskets.iter().map(|b| b.sku_ids.as_slice()).collect();

    let mut item_counts: BTreeMap<u32, u64> = BTreeMap::new();
    for t in &transactions {
        for &item in *t {
            *item_counts.entry(item).or_insert(0) += 1;
        }
    }

    // Level 1, then join-and-prune upwards until nothing survives.
    let mut level: Vec<Vec<u32>> = item_counts
        .iter()
        .filter(|&(_, &count)| count >= min_count)
        .map(|(&item, _)| vec![item])
        .collect();
    let mut frequent: BTreeMap<Vec<u32>, u64> = item_counts
        .into_iter()
        .filter(|&(_, count)| count >= min_count)
        .map(|(item, count)| (vec![item], count))
        .collect();

    let mut size = 1;
    while !level.is_empty() && size < params.max_len {
        let mut next_level = Vec::new();
        for candidate in join_candidates(&level) {
            let count = transactions
                .iter()
                .filter(|t| contains_sorted(t, &candidate))
                .count() as u64;
            if count >= min_count {
                frequent.insert(candidate.clone(), count);
                next_level.push(candidate);
            }
        }
        level = next_level;
        size += 1;
    }

    let mut rules = derive_rules(&frequent, n, params);
    let total = rules.len();
    sort_rules(&mut rules);
    rules.truncate(params.top_n);
    info!(
        "mined {} frequent itemsets and {} rules from {} baskets, keeping top {}",
        frequent.len(),
        total,
        n,
        rules.len()
    );
    Ok(rules)
}

fn validate(params: &MiningParams) -> crate::Result<()> {
    if !(params.min_support > 0.0 && params.min_support <= 1.0) {
        bail!("min_support must be in (0, 1], got {}", params.min_support);
    }
    if !(0.0..=1.0).contains(&params.min_confidence) {
        bail!(
            "min_confidence must be in [0, 1], got {}",
            params.min_confidence
        );
    }
    if !(2..=63).contains(&params.max_len) {
        bail!("max_len must be between 2 and 63, got {}", params.max_len);
    }
    if params.top_n == 0 {
        bail!("top_n must be at least 1");
    }
    Ok(())
}

/// Smallest basket count whose support fraction meets the inclusive
/// `min_support` floor, never below one basket.
///
/// The `ceil(min_support * n)` estimate alone can land one basket high:
/// the product rounds just past an integer for values like 0.07 * 100.
/// Settling the estimate against the same `count / n` division that
/// scores itemsets keeps exact-boundary itemsets in.
fn support_floor(min_support: f64, n: usize) -> u64 {
    let total = n as f64;
    let mut min_count = ((min_support * total).ceil() as u64).clamp(1, n as u64);
    while min_count > 1 && (min_count - 1) as f64 / total >= min_support {
        min_count -= 1;
    }
    while min_count < n as u64 && (min_count as f64) / total < min_support {
        min_count += 1;
    }
    min_count
}

/// Join level-k itemsets sharing a (k-1)-prefix into (k+1)-candidates,
/// dropping any candidate with an infrequent k-subset.
fn join_candidates(level: &[Vec<u32>]) -> Vec<Vec<u32>> {
    let seen: HashSet<&[u32]> = level.iter().map(|s| s.as_slice()).collect();
    let mut candidates = Vec::new();
    for i in 0..level.len() {
        for j in (i + 1)..level.len() {
            let (a, b) = (&level[i], &level[j]);
            let k = a.len();
            if a[..k - 1] != b[..k - 1] {
                continue;
            }
            let mut candidate = a.clone();
            candidate.push(b[k - 1]);
            let all_subsets_frequent = (0..candidate.len()).all(|skip| {
                let subset: Vec<u32> = candidate
                    .iter()
                    .enumerate()
                    .filter(|&(idx, _)| idx != skip)
                    .map(|(_, &item)| item)
                    .collect();
                seen.contains(subset.as_slice())
            });
            if all_subsets_frequent {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// True when every item of sorted `needle` occurs in sorted `haystack`.
fn contains_sorted(haystack: &[u32], needle: &[u32]) -> bool {
    let mut items = haystack.iter();
    needle.iter().all(|want| items.any(|have| have == want))
}

fn derive_rules(frequent: &BTreeMap<Vec<u32>, u64>, n: usize, params: &MiningParams) -> Vec<Rule> {
    let total = n as f64;
    let mut rules = Vec::new();
    for (itemset, &count) in frequent {
        let m = itemset.len();
        if m < 2 {
            continue;
        }
        let support = count as f64 / total;
        // Every proper non-empty subset as an antecedent.
        for mask in 1..((1u64 << m) - 1) {
            let mut antecedent = Vec::new();
            let mut consequent = Vec::new();
            for (idx, &item) in itemset.iter().enumerate() {
                if mask & (1 << idx) != 0 {
                    antecedent.push(item);
                } else {
                    consequent.push(item);
                }
            }
            // Subsets of a frequent itemset are themselves frequent.
            let (Some(&antecedent_count), Some(&consequent_count)) = (
                frequent.get(antecedent.as_slice()),
                frequent.get(consequent.as_slice()),
            ) else {
                continue;
            };
            let confidence = count as f64 / antecedent_count as f64;
            if confidence < params.min_confidence {
                continue;
            }
            let lift = confidence / (consequent_count as f64 / total);
            rules.push(Rule {
                antecedent,
                consequent,
                support,
                confidence,
                lift,
            });
        }
    }
    rules
}

fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.lift
            .partial_cmp(&a.lift)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.support
                    .partial_cmp(&a.support)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.antecedent.cmp(&b.antecedent))
            .then_with(|| a.consequent.cmp(&b.consequent))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basket(sku_ids: &[u32]) -> Basket {
        Basket {
            key: Vec::new(),
            sku_ids: sku_ids.to_vec(),
        }
    }

    fn params(min_support: f64, min_confidence: f64) -> MiningParams {
        MiningParams {
            min_support,
            min_confidence,
            ..MiningParams::default()
        }
    }

    /// Five baskets over three SKUs with hand-checkable counts:
    /// each single SKU appears 4 times, each pair 3 times, the
    /// triple twice.
    fn fixture() -> Vec<Basket> {
        vec![
            basket(&[1, 2, 3]),
            basket(&[1, 2]),
            basket(&[1, 3]),
            basket(&[2, 3]),
            basket(&[1, 2, 3]),
        ]
    }

    fn find<'a>(rules: &'a [Rule], antecedent: &[u32], consequent: &[u32]) -> Option<&'a Rule> {
        rules
            .iter()
            .find(|r| r.antecedent == antecedent && r.consequent == consequent)
    }

    #[test]
    fn test_metrics_match_hand_computation() {
        let rules = mine_rules(&fixture(), &params(0.4, 0.1)).unwrap();

        let rule = find(&rules, &[1], &[2]).unwrap();
        assert!((rule.support - 0.6).abs() < 1e-9);
        assert!((rule.confidence - 0.75).abs() < 1e-9);
        assert!((rule.lift - 0.9375).abs() < 1e-9);

        let rule = find(&rules, &[1, 2], &[3]).unwrap();
        assert!((rule.support - 0.4).abs() < 1e-9);
        assert!((rule.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!((rule.lift - (2.0 / 3.0) / 0.8).abs() < 1e-9);
        assert_eq!(rule.label(), "1 2 -> 3");
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        // Pair support is exactly 0.6 and pair confidence exactly 0.75.
        let rules = mine_rules(&fixture(), &params(0.6, 0.75)).unwrap();
        assert!(find(&rules, &[1], &[2]).is_some());

        // Nudge the confidence floor above 0.75 and every rule goes away.
        let rules = mine_rules(&fixture(), &params(0.6, 0.76)).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_support_floor_prunes_itemsets() {
        // A floor of 3 of 5 baskets keeps pairs but drops the triple.
        let rules = mine_rules(&fixture(), &params(0.5, 0.1)).unwrap();
        assert!(!rules.is_empty());
        assert!(rules
            .iter()
            .all(|r| r.antecedent.len() + r.consequent.len() == 2));
    }

    #[test]
    fn test_support_floor_matches_scored_fraction() {
        // 0.07 * 100 rounds just above 7.0 in f64, so a ceil-only floor
        // would demand 8 baskets; an itemset in exactly 7 of 100 baskets
        // still meets the inclusive floor.
        let mut baskets: Vec<Basket> = (0..7).map(|_| basket(&[1, 2])).collect();
        for _ in 7..100 {
            baskets.push(basket(&[3]));
        }
        let rules = mine_rules(&baskets, &params(0.07, 0.1)).unwrap();
        let rule = find(&rules, &[1], &[2]).unwrap();
        assert!((rule.support - 0.07).abs() < 1e-12);
        assert!((rule.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_support_floor_boundaries() {
        assert_eq!(support_floor(0.07, 100), 7);
        assert_eq!(support_floor(0.0001, 4), 1);
        assert_eq!(support_floor(0.25, 4), 1);
        assert_eq!(support_floor(0.26, 4), 2);
        assert_eq!(support_floor(0.5, 5), 3);
        assert_eq!(support_floor(1.0, 5), 5);
    }

    #[test]
    fn test_max_len_caps_itemset_growth() {
        let capped = MiningParams {
            max_len: 2,
            ..params(0.4, 0.1)
        };
        let rules = mine_rules(&fixture(), &capped).unwrap();
        assert!(rules
            .iter()
            .all(|r| r.antecedent.len() + r.consequent.len() == 2));

        let rules = mine_rules(&fixture(), &params(0.4, 0.1)).unwrap();
        assert!(find(&rules, &[1, 2], &[3]).is_some());
    }

    #[test]
    fn test_rule_sets_are_disjoint_and_bounded() {
        // Permissive thresholds give the maximal rule set.
        let capped = MiningParams {
            max_len: 3,
            ..params(0.2, 0.0)
        };
        let rules = mine_rules(&fixture(), &capped).unwrap();
        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(!rule.antecedent.is_empty());
            assert!(!rule.consequent.is_empty());
            assert!(rule.antecedent.len() + rule.consequent.len() <= capped.max_len);
            assert!(rule
                .antecedent
                .iter()
                .all(|sku| !rule.consequent.contains(sku)));
        }
    }

    #[test]
    fn test_perfect_pair_ranks_first_by_lift() {
        let baskets = vec![basket(&[4, 5]), basket(&[4, 5]), basket(&[1]), basket(&[2])];
        let rules = mine_rules(&baskets, &params(0.25, 0.1)).unwrap();
        assert_eq!(rules.len(), 2);
        // Equal lift and support, so antecedent ids break the tie.
        assert_eq!(rules[0].label(), "4 -> 5");
        assert_eq!(rules[1].label(), "5 -> 4");
        assert!((rules[0].lift - 2.0).abs() < 1e-9);
        assert!((rules[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_is_lift_then_support_descending() {
        let rules = mine_rules(&fixture(), &params(0.4, 0.1)).unwrap();
        for pair in rules.windows(2) {
            assert!(pair[0].lift >= pair[1].lift);
            if (pair[0].lift - pair[1].lift).abs() < 1e-12 {
                assert!(pair[0].support >= pair[1].support);
            }
        }
    }

    #[test]
    fn test_top_n_truncates_after_ranking() {
        let full = mine_rules(&fixture(), &params(0.4, 0.1)).unwrap();
        assert!(full.len() > 5);

        let capped = MiningParams {
            top_n: 5,
            ..params(0.4, 0.1)
        };
        let rules = mine_rules(&fixture(), &capped).unwrap();
        assert_eq!(rules.len(), 5);
        for (kept, original) in rules.iter().zip(full.iter()) {
            assert_eq!(kept.label(), original.label());
        }
    }

    #[test]
    fn test_empty_baskets_yield_no_rules() {
        let rules = mine_rules(&[], &MiningParams::default()).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_singleton_baskets_yield_no_rules() {
        let baskets = vec![basket(&[1]), basket(&[2]), basket(&[1])];
        let rules = mine_rules(&baskets, &params(0.1, 0.0)).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let baskets = fixture();
        assert!(mine_rules(&baskets, &params(0.0, 0.1)).is_err());
        assert!(mine_rules(&baskets, &params(1.5, 0.1)).is_err());
        assert!(mine_rules(&baskets, &params(0.4, -0.1)).is_err());
        assert!(mine_rules(&baskets, &params(0.4, 1.1)).is_err());
        let bad_len = MiningParams {
            max_len: 1,
            ..MiningParams::default()
        };
        assert!(mine_rules(&baskets, &bad_len).is_err());
        // 64 would overflow the u64 subset masks in rule generation.
        let oversized_len = MiningParams {
            max_len: 64,
            ..MiningParams::default()
        };
        assert!(mine_rules(&baskets, &oversized_len).is_err());
        let bad_top = MiningParams {
            top_n: 0,
            ..MiningParams::default()
        };
        assert!(mine_rules(&baskets, &bad_top).is_err());
    }
}
