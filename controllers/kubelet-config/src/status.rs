//! KubeletConfig status reporting.
//!
//! After each reconciliation the matched overrides get a single `Success` or
//! `Failure` condition. A status is only patched when its content changes,
//! so reporting never feeds back into another reconciliation.
//!
//! An override can match several pools. Within one generation a `Failure`
//! reported for one pool is only cleared by a success of that same pool, so
//! pools reconciling in turn do not flip the condition back and forth.

use crate::error::ControllerError;
use crate::reconciler::ReconcileReport;
use chrono::{DateTime, Utc};
use crds::{KubeletConfig, KubeletConfigCondition, KubeletConfigConditionType, KubeletConfigStatus};
use kube::api::{Patch, PatchParams};
use kube::Api;
use kubelet_render::{Override, RenderError};
use tracing::{debug, warn};

/// Success message; identical for every pool an override matches
pub const SUCCESS_MESSAGE: &str = "KubeletConfig applied";

/// Condition for one override after a reconciliation of `pool`.
///
/// `None` when the result says nothing about this override: a render failure
/// caused by a different override.
pub fn condition_for(
    ov: &Override,
    pool: &str,
    result: &Result<ReconcileReport, ControllerError>,
) -> Option<(KubeletConfigConditionType, String)> {
    match result {
        Ok(_) => Some((KubeletConfigConditionType::Success, SUCCESS_MESSAGE.to_string())),
        Err(ControllerError::Render(RenderError::RenderFailed { override_name, reason })) => {
            (override_name == &ov.name).then(|| (KubeletConfigConditionType::Failure, failure_message(pool, reason)))
        }
        Err(e) => Some((KubeletConfigConditionType::Failure, failure_message(pool, e))),
    }
}

fn failure_message(pool: &str, detail: impl std::fmt::Display) -> String {
    format!("pool {}: {}", pool, detail)
}

/// Whether `condition` is a failure reported by a pool other than `pool`
fn failed_on_other_pool(condition: &KubeletConfigCondition, pool: &str) -> bool {
    let own_prefix = format!("pool {}: ", pool);
    condition.condition_type == KubeletConfigConditionType::Failure
        && !condition.message.as_deref().is_some_and(|m| m.starts_with(&own_prefix))
}

/// Desired status after reconciling `pool`, or `None` if `current` should
/// be left alone.
///
/// `lastTransitionTime` only moves when the condition type changes.
pub fn desired_status(
    current: Option<&KubeletConfigStatus>,
    pool: &str,
    generation: Option<i64>,
    condition_type: KubeletConfigConditionType,
    message: String,
    now: DateTime<Utc>,
) -> Option<KubeletConfigStatus> {
    let existing = current.and_then(|s| s.conditions.first());

    if let (Some(status), Some(condition)) = (current, existing) {
        if status.observed_generation == generation {
            if condition.condition_type == condition_type && condition.message.as_deref() == Some(message.as_str()) {
                return None;
            }
            if condition_type == KubeletConfigConditionType::Success && failed_on_other_pool(condition, pool) {
                return None;
            }
        }
    }

    let last_transition_time = match existing {
        Some(condition) if condition.condition_type == condition_type => condition.last_transition_time,
        _ => Some(now),
    };

    Some(KubeletConfigStatus {
        observed_generation: generation,
        conditions: vec![KubeletConfigCondition {
            condition_type,
            status: "True".to_string(),
            message: Some(message),
            last_transition_time,
        }],
    })
}

/// Patches KubeletConfig status through the API server
#[derive(Clone)]
pub struct StatusReporter {
    api: Api<KubeletConfig>,
}

impl StatusReporter {
    pub fn new(api: Api<KubeletConfig>) -> Self {
        Self { api }
    }

    /// Records `result` on every override in `overrides`.
    ///
    /// Failures are logged; status is best effort.
    pub async fn report(
        &self,
        pool: &str,
        overrides: &[Override],
        result: &Result<ReconcileReport, ControllerError>,
    ) {
        for ov in overrides {
            let Some((condition_type, message)) = condition_for(ov, pool, result) else {
                continue;
            };
            if let Err(e) = self.patch(ov, pool, condition_type, message).await {
                warn!("Failed to update status of KubeletConfig {}: {}", ov.name, e);
            }
        }
    }

    async fn patch(
        &self,
        ov: &Override,
        pool: &str,
        condition_type: KubeletConfigConditionType,
        message: String,
    ) -> Result<(), ControllerError> {
        let current = self.api.get_status(&ov.name).await?;
        let Some(status) =
            desired_status(current.status.as_ref(), pool, ov.generation, condition_type, message, Utc::now())
        else {
            debug!("Status of KubeletConfig {} is current", ov.name);
            return Ok(());
        };

        let status_patch = serde_json::json!({ "status": status });
        let pp = PatchParams::default();
        self.api.patch_status(&ov.name, &pp, &Patch::Merge(&status_patch)).await?;
        debug!("Updated status of KubeletConfig {} to {:?}", ov.name, condition_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ReconcileOutcome;
    use chrono::TimeZone;
    use crds::LabelSelector;

    fn ov(name: &str) -> Override {
        let mut ov = Override::new(name, LabelSelector::default(), serde_json::json!({}));
        ov.generation = Some(2);
        ov
    }

    fn created() -> Result<ReconcileReport, ControllerError> {
        Ok(ReconcileReport {
            pool: "worker".to_string(),
            outcome: ReconcileOutcome::Created,
            matched_overrides: vec![ov("max-pods")],
        })
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_success_condition() {
        let (kind, message) = condition_for(&ov("max-pods"), "worker", &created()).unwrap();
        assert_eq!(kind, KubeletConfigConditionType::Success);
        assert_eq!(message, SUCCESS_MESSAGE);
    }

    #[test]
    fn test_render_failure_only_marks_offending_override() {
        let result = Err(ControllerError::Render(RenderError::RenderFailed {
            override_name: "bad".to_string(),
            reason: "clusterDNS is not allowed to be set".to_string(),
        }));

        let (kind, message) = condition_for(&ov("bad"), "worker", &result).unwrap();
        assert_eq!(kind, KubeletConfigConditionType::Failure);
        assert_eq!(message, "pool worker: clusterDNS is not allowed to be set");
        assert!(condition_for(&ov("good"), "worker", &result).is_none());
    }

    #[test]
    fn test_other_failures_mark_every_override() {
        let result = Err(ControllerError::ConflictRetriesExhausted {
            pool: "worker".to_string(),
            attempts: 5,
        });
        let (kind, _) = condition_for(&ov("any"), "worker", &result).unwrap();
        assert_eq!(kind, KubeletConfigConditionType::Failure);
    }

    #[test]
    fn test_unchanged_status_is_not_patched() {
        let status = desired_status(None, "worker", Some(2), KubeletConfigConditionType::Success, "ok".to_string(), at(1)).unwrap();
        assert_eq!(status.conditions[0].last_transition_time, Some(at(1)));

        let again = desired_status(Some(&status), "worker", Some(2), KubeletConfigConditionType::Success, "ok".to_string(), at(2));
        assert!(again.is_none());
    }

    #[test]
    fn test_transition_time_moves_only_on_type_change() {
        let success = desired_status(None, "worker", Some(1), KubeletConfigConditionType::Success, "ok".to_string(), at(1)).unwrap();

        let new_generation = desired_status(Some(&success), "worker", Some(2), KubeletConfigConditionType::Success, "ok".to_string(), at(2)).unwrap();
        assert_eq!(new_generation.observed_generation, Some(2));
        assert_eq!(new_generation.conditions[0].last_transition_time, Some(at(1)));

        let failure = desired_status(Some(&new_generation), "worker", Some(2), KubeletConfigConditionType::Failure, "boom".to_string(), at(3)).unwrap();
        assert_eq!(failure.conditions[0].last_transition_time, Some(at(3)));
    }

    #[test]
    fn test_success_on_other_pool_keeps_failure() {
        let failure = desired_status(
            None,
            "master",
            Some(2),
            KubeletConfigConditionType::Failure,
            "pool master: clusterDNS is not allowed to be set".to_string(),
            at(1),
        )
        .unwrap();

        let worker = desired_status(Some(&failure), "worker", Some(2), KubeletConfigConditionType::Success, SUCCESS_MESSAGE.to_string(), at(2));
        assert!(worker.is_none());

        let master = desired_status(Some(&failure), "master", Some(2), KubeletConfigConditionType::Success, SUCCESS_MESSAGE.to_string(), at(3)).unwrap();
        assert_eq!(master.conditions[0].condition_type, KubeletConfigConditionType::Success);
        assert_eq!(master.conditions[0].last_transition_time, Some(at(3)));

        let next_generation = desired_status(Some(&failure), "worker", Some(3), KubeletConfigConditionType::Success, SUCCESS_MESSAGE.to_string(), at(4)).unwrap();
        assert_eq!(next_generation.observed_generation, Some(3));
        assert_eq!(next_generation.conditions[0].condition_type, KubeletConfigConditionType::Success);
    }
}
