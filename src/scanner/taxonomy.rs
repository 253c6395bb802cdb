//! Static event classification tables.

use crate::model::Severity;

pub const CRITICAL_EVENTS: &[&str] = &[
    "VmFailedToPowerOnEvent",
    "HostConnectionLostEvent",
    "HostShutdownEvent",
    "VmDiskFailedEvent",
    "DasHostFailedEvent",
    "DatastoreRemovedOnHostEvent",
];

pub const WARNING_EVENTS: &[&str] = &[
    "VmFailoverFailed",
    "DrsVmMigratedEvent",
    "DrsSoftRuleViolationEvent",
    "VmFailedToRebootGuestEvent",
    "DVPortGroupReconfiguredEvent",
    "VmGuestShutdownEvent",
    "HostIpChangedEvent",
    "BadUsernameSessionEvent",
];

pub const INFO_EVENTS: &[&str] = &[
    "VmPoweredOnEvent",
    "VmPoweredOffEvent",
    "VmMigratedEvent",
    "VmReconfiguredEvent",
    "UserLoginSessionEvent",
    "UserLogoutSessionEvent",
    "VmCreatedEvent",
    "VmRemovedEvent",
    "VmClonedEvent",
];

/// Classify an event type. Anything outside the critical and warning tables
/// is info, listed or not.
pub fn classify(event_type: &str) -> Severity {
    if CRITICAL_EVENTS.contains(&event_type) {
        Severity::Critical
    } else if WARNING_EVENTS.contains(&event_type) {
        Severity::Warning
    } else {
        Severity::Info
    }
}
