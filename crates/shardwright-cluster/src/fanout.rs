//! Bounded concurrent execution across independent targets

use futures::stream::{self, StreamExt};
use std::fmt::Display;
use std::future::Future;

use crate::error::{ClusterResult, TargetOutcome};

/// Run `task` for every target with at most `limit` in flight. Results come
/// back in target order regardless of completion order.
pub(crate) async fn fan_out<T, R, F, Fut>(
    targets: Vec<T>,
    limit: usize,
    task: F,
) -> Vec<(T, ClusterResult<R>)>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = ClusterResult<R>>,
{
    let mut results: Vec<(usize, T, ClusterResult<R>)> = stream::iter(targets.into_iter().enumerate())
        .map(|(index, target)| {
            let fut = task(target.clone());
            async move { (index, target, fut.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, target, result)| (target, result))
        .collect()
}

/// Outcomes for a fan-out, one per target
pub(crate) fn outcomes<T: Display, R>(results: &[(T, ClusterResult<R>)]) -> Vec<TargetOutcome> {
    results
        .iter()
        .map(|(target, result)| TargetOutcome::from_result(target, result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_target_order() {
        let results = fan_out(vec![30u64, 10, 20], 3, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, ClusterError>(delay * 2)
        })
        .await;

        let values: Vec<u64> = results.iter().map(|(_, r)| *r.as_ref().unwrap()).collect();
        assert_eq!(values, vec![60, 20, 40]);
    }

    #[tokio::test]
    async fn test_limit_bounds_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fan_out((0..8).collect::<Vec<u32>>(), 2, |n| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if n == 3 {
                    Err(ClusterError::transport(n, "boom"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        let outcomes = outcomes(&results);
        assert_eq!(outcomes.iter().filter(|o| !o.succeeded()).count(), 1);
        assert_eq!(outcomes[3].target, "3");
    }
}
