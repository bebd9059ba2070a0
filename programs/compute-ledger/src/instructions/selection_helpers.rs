//! Constrained random selection of nodes.
//!
//! Used by `purchase_stack` to pick the serving node and by `try_settle` to
//! sample attesters. Both apply the same eligibility filter to the task's
//! advertisements and draw from an injected [`EntropySource`].

use crate::errors::LedgerError;
use crate::instructions::account_helpers::load_node_or_absent;
use crate::instructions::constants::PERMILLE_BASE;
use crate::state::{Advertisement, Node, Task};
use crate::utils::entropy::EntropySource;
use anchor_lang::prelude::*;

/// Terms a node must meet to serve (or attest) a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFilter {
    pub price_cap: u64,
    pub units: u64,
    pub minimum_reputation: u8,
}

impl EligibilityFilter {
    pub fn admits(&self, ad: &Advertisement, node: &Node) -> bool {
        ad.price_per_unit <= self.price_cap
            && ad.max_units >= self.units
            && node.is_selectable()
            && node.reputation >= self.minimum_reputation
    }
}

/// Deserialize the node behind every advertisement of `task`.
///
/// `accounts` must list the node accounts in advertisement order. Destroyed
/// nodes come back as `None`.
pub fn load_candidates(task: &Task, accounts: &[AccountInfo]) -> Result<Vec<Option<Node>>> {
    require!(
        accounts.len() == task.advertisements.len(),
        LedgerError::CandidateAccountsMismatch
    );
    task.advertisements
        .iter()
        .zip(accounts)
        .map(|(ad, info)| load_node_or_absent(info, ad.node_id))
        .collect()
}

/// Ids of the advertised, whitelisted nodes that pass `filter`, in
/// advertisement order.
pub fn eligible_node_ids(
    task: &Task,
    nodes: &[Option<Node>],
    filter: &EligibilityFilter,
) -> Vec<u64> {
    task.advertisements
        .iter()
        .zip(nodes)
        .filter_map(|(ad, node)| match node {
            Some(node) if task.is_whitelisted(ad.node_id) && filter.admits(ad, node) => {
                Some(ad.node_id)
            }
            _ => None,
        })
        .collect()
}

/// Uniform choice of one eligible node.
pub fn select_node(eligible: &[u64], entropy: &mut impl EntropySource) -> Result<u64> {
    require!(!eligible.is_empty(), LedgerError::NoNodesEligible);
    let index = entropy.below(eligible.len() as u64) as usize;
    Ok(eligible[index])
}

/// One Bernoulli trial succeeding with `probability_permille / 1000`.
pub fn sampling_trial(probability_permille: u16, entropy: &mut impl EntropySource) -> bool {
    entropy.below(PERMILLE_BASE) < u64::from(probability_permille)
}

/// Up to `count` distinct ids drawn without replacement (partial
/// Fisher-Yates over `pool`).
pub fn sample_attesters(
    mut pool: Vec<u64>,
    count: usize,
    entropy: &mut impl EntropySource,
) -> Vec<u64> {
    let take = count.min(pool.len());
    for i in 0..take {
        let remaining = (pool.len() - i) as u64;
        let j = i + entropy.below(remaining) as usize;
        pool.swap(i, j);
    }
    pool.truncate(take);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::entropy::Entropy;
    use std::collections::HashSet;

    fn node(id: u64, collateral: u64, reputation: u8) -> Node {
        let mut n = Node::new(id, Pubkey::new_unique(), collateral, 0, 0);
        n.reputation = reputation;
        n
    }

    fn task_with(ads: &[(u64, u64, u64)]) -> Task {
        let mut task = Task::default();
        for (node_id, price, units) in ads {
            task.subscribe(*node_id, *price, *units).unwrap();
        }
        task
    }

    const FILTER: EligibilityFilter = EligibilityFilter {
        price_cap: 10,
        units: 100,
        minimum_reputation: 50,
    };

    #[test]
    fn test_filter_checks_every_term() {
        let ad = Advertisement {
            node_id: 1,
            price_per_unit: 10,
            max_units: 100,
        };
        assert!(FILTER.admits(&ad, &node(1, 1, 50)));

        let pricey = Advertisement {
            price_per_unit: 11,
            ..ad
        };
        assert!(!FILTER.admits(&pricey, &node(1, 1, 50)));

        let small = Advertisement { max_units: 99, ..ad };
        assert!(!FILTER.admits(&small, &node(1, 1, 50)));

        assert!(!FILTER.admits(&ad, &node(1, 0, 50)));
        assert!(!FILTER.admits(&ad, &node(1, 1, 49)));

        let mut disabled = node(1, 1, 50);
        disabled.disable(0).unwrap();
        assert!(!FILTER.admits(&ad, &disabled));
    }

    #[test]
    fn test_eligible_ids_keep_advertisement_order() {
        let task = task_with(&[(3, 5, 100), (1, 20, 100), (2, 10, 500)]);
        let nodes = vec![
            Some(node(3, 1, 100)),
            Some(node(1, 1, 100)),
            Some(node(2, 1, 100)),
        ];
        assert_eq!(eligible_node_ids(&task, &nodes, &FILTER), vec![3, 2]);
    }

    #[test]
    fn test_eligible_ids_honor_whitelist() {
        let mut task = task_with(&[(3, 5, 100), (1, 5, 100), (2, 5, 100)]);
        let nodes = vec![
            Some(node(3, 1, 100)),
            Some(node(1, 1, 100)),
            Some(node(2, 1, 100)),
        ];
        task.whitelist_nodes(&[2, 1]).unwrap();
        assert_eq!(eligible_node_ids(&task, &nodes, &FILTER), vec![1, 2]);
    }

    #[test]
    fn test_destroyed_nodes_are_skipped() {
        let task = task_with(&[(1, 5, 100), (2, 5, 100)]);
        let nodes = vec![None, Some(node(2, 1, 100))];
        assert_eq!(eligible_node_ids(&task, &nodes, &FILTER), vec![2]);
    }

    #[test]
    fn test_select_node_errors_on_empty_pool() {
        let mut entropy = Entropy::from_seed([0u8; 32]);
        assert!(select_node(&[], &mut entropy).is_err());
    }

    #[test]
    fn test_single_candidate_always_chosen() {
        for seed in 0..16u8 {
            let mut entropy = Entropy::from_seed([seed; 32]);
            assert_eq!(select_node(&[42], &mut entropy).unwrap(), 42);
        }
    }

    #[test]
    fn test_selection_is_reproducible_for_a_seed() {
        let pool = [1, 2, 3, 4, 5];
        let a = select_node(&pool, &mut Entropy::from_seed([5u8; 32])).unwrap();
        let b = select_node(&pool, &mut Entropy::from_seed([5u8; 32])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_trial_extremes() {
        let mut entropy = Entropy::from_seed([1u8; 32]);
        for _ in 0..50 {
            assert!(!sampling_trial(0, &mut entropy));
            assert!(sampling_trial(1000, &mut entropy));
        }
    }

    #[test]
    fn test_sample_attesters_distinct_and_bounded() {
        let pool: Vec<u64> = (1..=10).collect();
        for seed in 0..32u8 {
            let mut entropy = Entropy::from_seed([seed; 32]);
            let picked = sample_attesters(pool.clone(), 3, &mut entropy);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(picked.iter().all(|id| pool.contains(id)));
        }
    }

    #[test]
    fn test_sample_attesters_small_pool() {
        let mut entropy = Entropy::from_seed([2u8; 32]);
        let mut picked = sample_attesters(vec![7, 8], 5, &mut entropy);
        picked.sort();
        assert_eq!(picked, vec![7, 8]);
        assert!(sample_attesters(vec![], 3, &mut entropy).is_empty());
        assert!(sample_attesters(vec![1, 2], 0, &mut entropy).is_empty());
    }
}
