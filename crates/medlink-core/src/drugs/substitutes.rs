//! Better-margin substitute ranking over stocked items.

use serde::{Deserialize, Serialize};

use crate::models::{StockItem, SubstituteCandidate};

/// Thresholds a candidate must beat the reference item by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginPolicy {
    /// Absolute profit gain per unit, in rupees.
    pub min_profit_gain: f64,
    /// Margin gain in percentage points.
    pub min_margin_gain_pct: f64,
}

impl Default for MarginPolicy {
    fn default() -> Self {
        Self {
            min_profit_gain: 5.0,
            min_margin_gain_pct: 5.0,
        }
    }
}

fn normalized(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

fn shares_molecule(reference: &StockItem, candidate: &StockItem) -> bool {
    let same = |a: Option<&str>, b: Option<&str>| match (normalized(a), normalized(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    same(reference.composition.as_deref(), candidate.composition.as_deref())
        || same(reference.generic_name.as_deref(), candidate.generic_name.as_deref())
}

fn is_reference(reference: &StockItem, candidate: &StockItem) -> bool {
    candidate.id == reference.id
        || candidate.name.trim().eq_ignore_ascii_case(reference.name.trim())
}

/// Stocked items sharing the reference's composition or generic whose profit
/// or margin beats it by the policy thresholds, most profitable first.
/// The reference itself is never returned.
pub fn find_better_margin_substitutes(
    reference: &StockItem,
    pool: &[StockItem],
    policy: &MarginPolicy,
) -> Vec<SubstituteCandidate> {
    let ref_profit = reference.profit();
    let ref_margin = reference.margin_pct();

    let mut out: Vec<SubstituteCandidate> = pool
        .iter()
        .filter(|c| !is_reference(reference, c))
        .filter(|c| shares_molecule(reference, c))
        .filter(|c| {
            c.profit() - ref_profit >= policy.min_profit_gain
                || c.margin_pct() - ref_margin >= policy.min_margin_gain_pct
        })
        .map(|c| SubstituteCandidate {
            name: c.name.clone(),
            generic: c
                .generic_name
                .clone()
                .or_else(|| c.composition.clone())
                .unwrap_or_default(),
            price: c.sale_price,
            margin_pct: c.margin_pct(),
            profit: c.profit(),
            savings: reference.sale_price - c.sale_price,
        })
        .collect();

    out.sort_by(|a, b| {
        b.profit
            .total_cmp(&a.profit)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(name: &str, generic: &str, cost: f64, sale: f64) -> StockItem {
        StockItem::new(name, 10, cost, sale).with_generic(generic)
    }

    #[test]
    fn test_profit_gain_qualifies() {
        let reference = item("Dolo 650", "paracetamol", 20.0, 30.0);
        let pool = vec![
            reference.clone(),
            item("Pacimol 650", "paracetamol", 10.0, 28.0),
            item("Calpol 650", "paracetamol", 19.0, 30.0),
            item("Pan 40", "pantoprazole", 5.0, 100.0),
        ];
        let subs = find_better_margin_substitutes(&reference, &pool, &MarginPolicy::default());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "Pacimol 650");
        assert_eq!(subs[0].profit, 18.0);
        assert_eq!(subs[0].savings, 2.0);
    }

    #[test]
    fn test_margin_gain_qualifies() {
        // Profit gain 1.0 but margin gain > 5 points.
        let reference = item("A", "x", 90.0, 100.0);
        let cheap = item("B", "x", 9.0, 20.0);
        let subs = find_better_margin_substitutes(&reference, &[cheap], &MarginPolicy::default());
        assert_eq!(subs.len(), 1);
        assert!(subs[0].savings > 0.0);
    }

    #[test]
    fn test_composition_match() {
        let reference = StockItem::new("Augmentin 625", 5, 150.0, 200.0)
            .with_composition("Amoxicillin 500 + Clavulanic 125");
        let alt = StockItem::new("Moxikind-CV 625", 5, 90.0, 180.0)
            .with_composition("amoxicillin 500 + clavulanic 125");
        let subs = find_better_margin_substitutes(&reference, &[alt], &MarginPolicy::default());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].generic, "amoxicillin 500 + clavulanic 125");
    }

    #[test]
    fn test_reference_excluded_by_name() {
        let reference = item("Dolo 650", "paracetamol", 20.0, 30.0);
        let mut copy = item("dolo 650", "paracetamol", 1.0, 30.0);
        copy.id = "other".into();
        let subs = find_better_margin_substitutes(&reference, &[copy], &MarginPolicy::default());
        assert!(subs.is_empty());
    }

    #[test]
    fn test_custom_policy() {
        let reference = item("A", "x", 20.0, 30.0);
        let pool = vec![item("B", "x", 19.0, 30.0)];
        let strict = MarginPolicy { min_profit_gain: 1.0, min_margin_gain_pct: 50.0 };
        assert_eq!(find_better_margin_substitutes(&reference, &pool, &strict).len(), 1);
        assert!(find_better_margin_substitutes(&reference, &pool, &MarginPolicy::default()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_reference_and_sorted_by_profit(
            prices in prop::collection::vec((1.0f64..200.0, 1.0f64..300.0), 1..25)
        ) {
            let reference = item("Ref", "g", 50.0, 60.0);
            let mut pool: Vec<StockItem> = prices
                .iter()
                .enumerate()
                .map(|(i, (cost, sale))| item(&format!("Alt {i}"), "g", *cost, *sale))
                .collect();
            pool.push(reference.clone());

            let subs = find_better_margin_substitutes(&reference, &pool, &MarginPolicy::default());
            prop_assert!(subs.iter().all(|s| s.name != reference.name));
            prop_assert!(subs.windows(2).all(|w| w[0].profit >= w[1].profit));
        }
    }
}
