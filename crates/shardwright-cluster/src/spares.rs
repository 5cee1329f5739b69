//! Spare node allocation
//!
//! Spares are handed out in inventory order where the roles allow it. Every
//! claim runs under one lock acquisition, so a node can never be claimed
//! twice and a failed claim leaves the pool untouched.

use parking_lot::Mutex;
use shardwright_core::types::{SpareFilter, SpareNode};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

/// One slice of a batch claim
#[derive(Debug, Clone)]
pub struct SpareRequest {
    pub count: usize,
    pub filter: SpareFilter,
}

impl SpareRequest {
    pub fn new(count: usize, filter: SpareFilter) -> Self {
        Self { count, filter }
    }
}

/// Pool of unclaimed spare nodes
#[derive(Debug, Default)]
pub struct SpareAllocator {
    spares: Mutex<Vec<SpareNode>>,
}

impl SpareAllocator {
    pub fn new(spares: Vec<SpareNode>) -> Self {
        Self {
            spares: Mutex::new(spares),
        }
    }

    pub fn count(&self, filter: &SpareFilter) -> usize {
        self.spares.lock().iter().filter(|s| s.matches(filter)).count()
    }

    pub fn available(&self) -> Vec<SpareNode> {
        self.spares.lock().clone()
    }

    /// Claim exactly `count` matching spares, or none
    pub fn claim(&self, count: usize, filter: &SpareFilter) -> ClusterResult<Vec<SpareNode>> {
        let mut claimed = self.claim_batch(&[SpareRequest::new(count, filter.clone())])?;
        Ok(claimed.pop().unwrap_or_default())
    }

    pub fn claim_one(&self, filter: &SpareFilter) -> ClusterResult<SpareNode> {
        self.claim(1, filter)?
            .pop()
            .ok_or_else(|| ClusterError::insufficient(filter.role, 1, 0))
    }

    /// Claim several groups at once. Either every request is satisfied or
    /// nothing is taken. A node picked for one request is not offered to
    /// another. Picks are a bipartite matching of request slots to spares,
    /// so a spare able to fill several roles is moved to whichever request
    /// has no other candidate.
    pub fn claim_batch(&self, requests: &[SpareRequest]) -> ClusterResult<Vec<Vec<SpareNode>>> {
        let mut spares = self.spares.lock();
        let fits: Vec<Vec<bool>> = requests
            .iter()
            .map(|r| spares.iter().map(|s| s.matches(&r.filter)).collect())
            .collect();
        let slots: Vec<usize> = requests
            .iter()
            .enumerate()
            .flat_map(|(r, request)| std::iter::repeat(r).take(request.count))
            .collect();

        let mut owner: Vec<Option<usize>> = vec![None; spares.len()];
        for slot in 0..slots.len() {
            let mut visited = vec![false; spares.len()];
            augment(slot, &slots, &fits, &mut owner, &mut visited);
        }

        let mut picks: Vec<Vec<usize>> = vec![Vec::new(); requests.len()];
        for (i, slot) in owner.iter().enumerate() {
            if let Some(slot) = slot {
                picks[slots[*slot]].push(i);
            }
        }
        if let Some((request, chosen)) = requests
            .iter()
            .zip(&picks)
            .find(|(request, chosen)| chosen.len() < request.count)
        {
            return Err(ClusterError::insufficient(
                request.filter.role,
                request.count,
                chosen.len(),
            ));
        }
        let taken: Vec<bool> = owner.iter().map(Option::is_some).collect();

        let mut by_index: Vec<Option<SpareNode>> = Vec::with_capacity(spares.len());
        let mut remaining = Vec::with_capacity(spares.len());
        for (i, spare) in spares.drain(..).enumerate() {
            if taken[i] {
                by_index.push(Some(spare));
            } else {
                by_index.push(None);
                remaining.push(spare);
            }
        }
        *spares = remaining;

        let groups = picks
            .into_iter()
            .map(|chosen| {
                chosen
                    .into_iter()
                    .filter_map(|i| by_index[i].take())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        debug!(
            "Claimed {} spares, {} left",
            groups.iter().map(Vec::len).sum::<usize>(),
            spares.len()
        );
        Ok(groups)
    }

    /// Put spares back after a claim could not be recorded
    pub fn restore(&self, returned: Vec<SpareNode>) {
        let mut spares = self.spares.lock();
        for spare in returned {
            if !spares.iter().any(|s| s.address() == spare.address()) {
                spares.push(spare);
            }
        }
    }
}

/// Find a spare for `slot`, moving earlier slots to other spares when
/// that frees one up
fn augment(
    slot: usize,
    slots: &[usize],
    fits: &[Vec<bool>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for i in 0..owner.len() {
        if visited[i] || !fits[slots[slot]][i] {
            continue;
        }
        visited[i] = true;
        let free = match owner[i] {
            None => true,
            Some(other) => augment(other, slots, fits, owner, visited),
        };
        if free {
            owner[i] = Some(slot);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardwright_core::types::{HardwareProfile, NodeRole};
    use std::sync::Arc;

    fn large() -> HardwareProfile {
        HardwareProfile::new("db-large", 256, "dc1")
    }

    fn allocator(n: usize) -> SpareAllocator {
        SpareAllocator::new(
            (0..n)
                .map(|i| SpareNode::new(format!("10.9.0.{}:3306", i), large()))
                .collect(),
        )
    }

    #[test]
    fn test_claim_reduces_count() {
        let spares = allocator(5);
        let filter = SpareFilter::role(NodeRole::Master).like(&large());

        let claimed = spares.claim(2, &filter).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(spares.count(&filter), 3);
    }

    #[test]
    fn test_failed_claim_takes_nothing() {
        let spares = allocator(3);
        let filter = SpareFilter::role(NodeRole::Master);

        let err = spares.claim(4, &filter).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::InsufficientSpares {
                needed: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(spares.count(&filter), 3);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let spares = allocator(5);
        let masters = SpareRequest::new(2, SpareFilter::role(NodeRole::Master));
        let standbys = SpareRequest::new(4, SpareFilter::role(NodeRole::StandbyReplica));

        assert!(spares.claim_batch(&[masters.clone(), standbys]).is_err());
        assert_eq!(spares.count(&SpareFilter::default()), 5);

        let standbys = SpareRequest::new(3, SpareFilter::role(NodeRole::StandbyReplica));
        let groups = spares.claim_batch(&[masters, standbys]).unwrap();
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 3);
        assert_eq!(spares.count(&SpareFilter::default()), 0);
    }

    #[test]
    fn test_batch_leaves_dual_role_spares_for_later_requests() {
        let spares = SpareAllocator::new(vec![
            SpareNode::new("10.9.0.1:3306", large()),
            SpareNode::new("10.9.0.2:3306", large()).filling([NodeRole::Master]),
        ]);
        let groups = spares
            .claim_batch(&[
                SpareRequest::new(1, SpareFilter::role(NodeRole::Master)),
                SpareRequest::new(1, SpareFilter::role(NodeRole::StandbyReplica)),
            ])
            .unwrap();
        assert_eq!(groups[0][0].address().as_str(), "10.9.0.2:3306");
        assert_eq!(groups[1][0].address().as_str(), "10.9.0.1:3306");
    }

    #[test]
    fn test_batch_with_role_specific_spares() {
        let masters_only = (0..2)
            .map(|i| SpareNode::new(format!("10.9.1.{}:3306", i), large()).filling([NodeRole::Master]));
        let standbys_only = (0..3).map(|i| {
            SpareNode::new(format!("10.9.2.{}:3306", i), large()).filling([NodeRole::StandbyReplica])
        });
        let mut pool: Vec<SpareNode> = vec![SpareNode::new("10.9.0.1:3306", large())];
        pool.extend(masters_only);
        pool.extend(standbys_only);
        let spares = SpareAllocator::new(pool);

        let groups = spares
            .claim_batch(&[
                SpareRequest::new(2, SpareFilter::role(NodeRole::Master).like(&large())),
                SpareRequest::new(4, SpareFilter::role(NodeRole::StandbyReplica).like(&large())),
            ])
            .unwrap();
        assert!(groups[0].iter().all(|s| s.can_fill(NodeRole::Master)));
        assert_eq!(groups[1].len(), 4);
        assert!(groups[1]
            .iter()
            .any(|s| s.address().as_str() == "10.9.0.1:3306"));
        assert_eq!(spares.count(&SpareFilter::default()), 0);
    }

    #[test]
    fn test_role_filter() {
        let spares = SpareAllocator::new(vec![
            SpareNode::new("10.9.0.1:3306", large()).filling([NodeRole::BackupReplica]),
            SpareNode::new("10.9.0.2:3306", large()),
        ]);
        let backup = spares
            .claim_one(&SpareFilter::role(NodeRole::BackupReplica))
            .unwrap();
        assert_eq!(backup.address().as_str(), "10.9.0.1:3306");
        assert!(spares
            .claim_one(&SpareFilter::role(NodeRole::BackupReplica))
            .is_err());
    }

    #[test]
    fn test_concurrent_claims_never_share_a_node() {
        let spares = Arc::new(allocator(20));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let spares = Arc::clone(&spares);
                std::thread::spawn(move || spares.claim(3, &SpareFilter::default()))
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        let mut granted = 0;
        for handle in handles {
            if let Ok(claimed) = handle.join().unwrap() {
                granted += 1;
                for spare in claimed {
                    assert!(seen.insert(spare.address().clone()));
                }
            }
        }
        assert_eq!(granted, 6);
        assert_eq!(spares.count(&SpareFilter::default()), 2);
    }
}
