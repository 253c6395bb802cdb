//! Triggered alarm collection.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::Scanner;
use crate::client::{AlarmState, EntityKind, EntityRef, Session};
use crate::error::Result;
use crate::model::{Alarm, Issue, Severity};

/// Container kinds walked after the root folder.
const CONTAINER_KINDS: [EntityKind; 3] =
    [EntityKind::Datacenter, EntityKind::Cluster, EntityKind::Host];

fn to_alarm(state: AlarmState) -> Alarm {
    Alarm {
        severity: Severity::from_alarm_color(&state.overall_status),
        alarm_name: state.alarm_name,
        entity_type: state.entity.kind.to_string(),
        entity_name: state.entity.name,
        time: state.time,
        acknowledged: state.acknowledged.unwrap_or(false),
    }
}

/// Collect triggered alarms from the root folder and every datacenter,
/// cluster and host, in walk order. An entity whose alarm state cannot be
/// read is skipped.
async fn collect(session: &dyn Session) -> Result<Vec<Alarm>> {
    let root = session.root_folder().await?;
    let mut alarms: Vec<Alarm> = session
        .triggered_alarms(&root)
        .await?
        .into_iter()
        .map(to_alarm)
        .collect();

    for kind in CONTAINER_KINDS {
        let entities: Vec<EntityRef> = session.entities(kind).await?;
        debug!(kind = %kind, count = entities.len(), "walking entities");
        for entity in entities {
            match session.triggered_alarms(&entity).await {
                Ok(states) => alarms.extend(states.into_iter().map(to_alarm)),
                Err(e) => warn!(
                    entity = %entity.name,
                    kind = %kind,
                    error = %e,
                    "failed to read alarm state"
                ),
            }
        }
    }
    Ok(alarms)
}

/// Keep the first alarm per `(alarm_name, entity_name)` and order by
/// severity. The sort is stable, so equal severities keep walk order.
pub fn dedup_and_rank(alarms: Vec<Alarm>) -> Vec<Alarm> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Alarm> = alarms
        .into_iter()
        .filter(|a| seen.insert((a.alarm_name.clone(), a.entity_name.clone())))
        .collect();
    unique.sort_by_key(|a| a.severity.rank());
    unique
}

/// Every active alarm, acknowledged ones included.
pub async fn get_active_alarms(session: &dyn Session) -> Result<Vec<Alarm>> {
    Ok(dedup_and_rank(collect(session).await?))
}

/// Turns unacknowledged alarms into issues.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlarmScanner;

#[async_trait::async_trait]
impl Scanner for AlarmScanner {
    fn name(&self) -> &'static str {
        "alarm"
    }

    async fn scan(&self, session: &dyn Session) -> Result<Vec<Issue>> {
        // Acknowledged alarms are dropped before dedup, so an unacknowledged
        // duplicate of an acknowledged alarm still surfaces.
        let open: Vec<Alarm> = collect(session)
            .await?
            .into_iter()
            .filter(|a| !a.acknowledged)
            .collect();
        Ok(dedup_and_rank(open).iter().map(Alarm::to_issue).collect())
    }
}
