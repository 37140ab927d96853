//! Background health probing
//!
//! One task per registered cluster. Each tick calls
//! [`ClusterRegistry::probe_once`], which probes outside the per-name lock
//! and records the outcome under it.

use super::registry::{ClusterRegistry, RegistryInner};
use kubefleet_common::{ClusterStatus, Error};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Status after one probe, plus the new consecutive-failure count
///
/// A Connected cluster turns Unhealthy once `threshold` probes in a row have
/// failed; a single success brings an Unhealthy cluster back.
pub fn next_status(
    current: ClusterStatus,
    failures: u32,
    success: bool,
    threshold: u32,
) -> (ClusterStatus, u32) {
    if success {
        let next = match current {
            ClusterStatus::Connected | ClusterStatus::Unhealthy | ClusterStatus::Pending => {
                ClusterStatus::Connected
            }
            ClusterStatus::Disabled => ClusterStatus::Disabled,
        };
        return (next, 0);
    }

    let failures = failures.saturating_add(1);
    let next = match current {
        ClusterStatus::Connected if failures >= threshold.max(1) => ClusterStatus::Unhealthy,
        ClusterStatus::Pending => ClusterStatus::Unhealthy,
        other => other,
    };
    (next, failures)
}

/// Start the periodic probe loop for `name`
///
/// The task holds only a weak reference to the registry and exits when the
/// token is cancelled, the registry is dropped, or the cluster is removed.
pub(crate) fn spawn(
    registry: Weak<RegistryInner>,
    name: String,
    cancel: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the cluster was just probed
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = registry.upgrade() else {
                break;
            };

            match ClusterRegistry::from_inner(inner).probe_once(&name).await {
                Ok(_) => {}
                Err(Error::NotRegistered(_)) => break,
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "Failed to record health probe");
                }
            }
        }

        tracing::debug!(cluster = %name, "Health prober stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_needs_threshold_failures() {
        let (status, failures) = next_status(ClusterStatus::Connected, 0, false, 3);
        assert_eq!((status, failures), (ClusterStatus::Connected, 1));

        let (status, failures) = next_status(status, failures, false, 3);
        assert_eq!((status, failures), (ClusterStatus::Connected, 2));

        let (status, failures) = next_status(status, failures, false, 3);
        assert_eq!((status, failures), (ClusterStatus::Unhealthy, 3));
    }

    #[test]
    fn test_single_success_recovers() {
        assert_eq!(
            next_status(ClusterStatus::Unhealthy, 7, true, 3),
            (ClusterStatus::Connected, 0)
        );
    }

    #[test]
    fn test_success_resets_failure_count() {
        assert_eq!(
            next_status(ClusterStatus::Connected, 2, true, 3),
            (ClusterStatus::Connected, 0)
        );
    }

    #[test]
    fn test_unhealthy_stays_unhealthy_on_failure() {
        assert_eq!(
            next_status(ClusterStatus::Unhealthy, 3, false, 3),
            (ClusterStatus::Unhealthy, 4)
        );
    }

    #[test]
    fn test_disabled_never_changes() {
        assert_eq!(next_status(ClusterStatus::Disabled, 0, true, 1).0, ClusterStatus::Disabled);
        assert_eq!(next_status(ClusterStatus::Disabled, 0, false, 1).0, ClusterStatus::Disabled);
    }

    #[test]
    fn test_zero_threshold_behaves_as_one() {
        assert_eq!(next_status(ClusterStatus::Connected, 0, false, 0).0, ClusterStatus::Unhealthy);
    }
}
