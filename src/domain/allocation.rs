//! Target allocation and the normalization contract.

use crate::domain::defaults::WEIGHT_EPSILON;
use std::collections::{BTreeMap, BTreeSet};

/// Instrument → weight in [0, 1]. Ordered so equal inputs produce
/// bit-identical outputs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Allocation {
    weights: BTreeMap<String, f64>,
}

/// What to return when there is too little history to compute anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAllocation {
    EqualWeight,
    AllZero,
}

impl Allocation {
    pub fn zero(universe: &[String]) -> Self {
        Self {
            weights: universe.iter().map(|c| (c.clone(), 0.0)).collect(),
        }
    }

    /// 1/n across `holders`, 0 for every other universe member.
    pub fn equal_weight(universe: &[String], holders: &[String]) -> Self {
        let mut allocation = Self::zero(universe);
        if holders.is_empty() {
            return allocation;
        }
        let weight = 1.0 / holders.len() as f64;
        for code in holders {
            allocation.weights.insert(code.clone(), weight);
        }
        allocation
    }

    pub fn fallback(kind: FallbackAllocation, universe: &[String], holders: &[String]) -> Self {
        match kind {
            FallbackAllocation::EqualWeight => Self::equal_weight(universe, holders),
            FallbackAllocation::AllZero => Self::zero(universe),
        }
    }

    pub fn weight(&self, code: &str) -> f64 {
        self.weights.get(code).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.weights.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Instruments holding a non-zero weight.
    pub fn holdings(&self) -> Vec<&str> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Every weight in [0, 1] and the total at most 1.
    pub fn is_valid(&self) -> bool {
        self.weights
            .values()
            .all(|w| w.is_finite() && (0.0..=1.0).contains(w))
            && self.total() <= 1.0 + WEIGHT_EPSILON
    }
}

/// Turn raw, possibly negative weights into an [`Allocation`].
///
/// Negative and non-finite weights clip to 0 and excluded instruments are
/// zeroed. A non-positive total yields the all-zero allocation. With
/// `normalize_to_one` the weights are divided by their total; otherwise they
/// are divided only when the total exceeds 1, leaving the residual in cash.
/// Every universe member appears in the result.
pub fn normalize(
    raw: &BTreeMap<String, f64>,
    universe: &[String],
    excluded: &BTreeSet<String>,
    normalize_to_one: bool,
) -> Allocation {
    let mut clipped: BTreeMap<String, f64> = universe.iter().map(|c| (c.clone(), 0.0)).collect();
    for (code, &weight) in raw {
        if excluded.contains(code) {
            continue;
        }
        if let Some(slot) = clipped.get_mut(code) {
            *slot = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        }
    }

    let total: f64 = clipped.values().sum();
    if !total.is_finite() || total <= 0.0 {
        return Allocation::zero(universe);
    }

    let divisor = if normalize_to_one || total > 1.0 {
        total
    } else {
        1.0
    };
    for weight in clipped.values_mut() {
        *weight = (*weight / divisor).min(1.0);
    }

    Allocation { weights: clipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn universe() -> Vec<String> {
        vec!["AAA".into(), "BBB".into(), "CCC".into()]
    }

    fn raw(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(c, w)| (c.to_string(), *w)).collect()
    }

    #[test]
    fn normalize_to_one_divides_by_total() {
        let alloc = normalize(
            &raw(&[("AAA", 2.0), ("BBB", 1.0)]),
            &universe(),
            &BTreeSet::new(),
            true,
        );
        assert_relative_eq!(alloc.weight("AAA"), 2.0 / 3.0);
        assert_relative_eq!(alloc.weight("BBB"), 1.0 / 3.0);
        assert_eq!(alloc.weight("CCC"), 0.0);
        assert_relative_eq!(alloc.total(), 1.0);
        assert_eq!(alloc.len(), 3);
    }

    #[test]
    fn cash_mode_keeps_partial_exposure() {
        let alloc = normalize(
            &raw(&[("AAA", 0.2), ("BBB", 0.1)]),
            &universe(),
            &BTreeSet::new(),
            false,
        );
        assert_relative_eq!(alloc.weight("AAA"), 0.2);
        assert_relative_eq!(alloc.total(), 0.3);
    }

    #[test]
    fn cash_mode_caps_total_at_one() {
        let alloc = normalize(
            &raw(&[("AAA", 1.5), ("BBB", 0.5)]),
            &universe(),
            &BTreeSet::new(),
            false,
        );
        assert_relative_eq!(alloc.total(), 1.0);
        assert_relative_eq!(alloc.weight("AAA"), 0.75);
    }

    #[test]
    fn negatives_and_nan_clip_to_zero() {
        let alloc = normalize(
            &raw(&[("AAA", -1.0), ("BBB", f64::NAN), ("CCC", 0.5)]),
            &universe(),
            &BTreeSet::new(),
            true,
        );
        assert_eq!(alloc.weight("AAA"), 0.0);
        assert_eq!(alloc.weight("BBB"), 0.0);
        assert_relative_eq!(alloc.weight("CCC"), 1.0);
    }

    #[test]
    fn degenerate_total_is_all_zero() {
        let alloc = normalize(
            &raw(&[("AAA", -1.0), ("BBB", 0.0)]),
            &universe(),
            &BTreeSet::new(),
            true,
        );
        assert_eq!(alloc, Allocation::zero(&universe()));
        assert_eq!(alloc.total(), 0.0);
        assert!(alloc.is_valid());
    }

    #[test]
    fn excluded_and_foreign_codes_are_dropped() {
        let excluded: BTreeSet<String> = ["AAA".to_string()].into_iter().collect();
        let alloc = normalize(
            &raw(&[("AAA", 5.0), ("BBB", 1.0), ("ZZZ", 9.0)]),
            &universe(),
            &excluded,
            true,
        );
        assert_eq!(alloc.weight("AAA"), 0.0);
        assert_relative_eq!(alloc.weight("BBB"), 1.0);
        assert_eq!(alloc.weight("ZZZ"), 0.0);
        assert_eq!(alloc.len(), 3);
    }

    #[test]
    fn equal_weight_over_holders() {
        let holders = vec!["AAA".to_string(), "CCC".to_string()];
        let alloc = Allocation::equal_weight(&universe(), &holders);
        assert_relative_eq!(alloc.weight("AAA"), 0.5);
        assert_eq!(alloc.weight("BBB"), 0.0);
        assert_eq!(alloc.holdings(), vec!["AAA", "CCC"]);
        assert!(alloc.is_valid());
    }

    #[test]
    fn fallback_kinds() {
        let u = universe();
        let eq = Allocation::fallback(FallbackAllocation::EqualWeight, &u, &u);
        assert_relative_eq!(eq.weight("BBB"), 1.0 / 3.0);
        let zero = Allocation::fallback(FallbackAllocation::AllZero, &u, &u);
        assert_eq!(zero.total(), 0.0);
    }
}
