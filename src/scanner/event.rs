//! Event history scanning.

use chrono::{Duration, Utc};

use super::taxonomy::classify;
use super::Scanner;
use crate::client::{RawEvent, Session};
use crate::error::Result;
use crate::model::{EventRecord, Issue, Severity};

fn to_record(event: RawEvent) -> EventRecord {
    let entity = event
        .vm
        .or(event.host)
        .or(event.datastore)
        .unwrap_or_else(|| "N/A".to_string());
    EventRecord {
        severity: classify(&event.event_type),
        message: event
            .full_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| event.event_type.clone()),
        event_type: event.event_type,
        time: event.created_time,
        actor: event.user_name.unwrap_or_else(|| "N/A".to_string()),
        entity,
    }
}

/// Classify, keep events at least as severe as `threshold`, newest first.
pub fn classify_events(events: Vec<RawEvent>, threshold: Severity) -> Vec<EventRecord> {
    let mut records: Vec<EventRecord> = events
        .into_iter()
        .map(to_record)
        .filter(|r| r.severity.meets(threshold))
        .collect();
    records.sort_by(|a, b| b.time.cmp(&a.time));
    records
}

/// Events from the last `hours` hours at or above `severity`.
pub async fn get_recent_events(
    session: &dyn Session,
    hours: u32,
    severity: Severity,
) -> Result<Vec<EventRecord>> {
    let end = Utc::now();
    let begin = end - Duration::hours(i64::from(hours));
    let events = session.query_events(begin, end).await?;
    Ok(classify_events(events, severity))
}

#[derive(Debug, Clone, Copy)]
pub struct EventScanner {
    pub lookback_hours: u32,
    pub threshold: Severity,
}

impl EventScanner {
    pub fn new(lookback_hours: u32, threshold: Severity) -> Self {
        Self {
            lookback_hours,
            threshold,
        }
    }
}

#[async_trait::async_trait]
impl Scanner for EventScanner {
    fn name(&self) -> &'static str {
        "event"
    }

    async fn scan(&self, session: &dyn Session) -> Result<Vec<Issue>> {
        let records = get_recent_events(session, self.lookback_hours, self.threshold).await?;
        Ok(records.iter().map(EventRecord::to_issue).collect())
    }
}
