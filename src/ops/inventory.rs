//! Read-only inventory listings.

use crate::client::{HostSummary, Session, VmSummary};
use crate::error::Result;

/// All VMs, sorted by name.
pub async fn list_vms(session: &dyn Session) -> Result<Vec<VmSummary>> {
    let mut vms = session.list_vms().await?;
    vms.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(vms)
}

/// All hosts, sorted by name.
pub async fn list_hosts(session: &dyn Session) -> Result<Vec<HostSummary>> {
    let mut hosts = session.list_hosts().await?;
    hosts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeSession;

    #[tokio::test]
    async fn test_hosts_sorted_by_name() {
        let session = FakeSession::new().with(|s| {
            for name in ["esx-03", "esx-01", "esx-02"] {
                s.hosts.push(HostSummary {
                    name: name.into(),
                    connection_state: "connected".into(),
                    power_state: "poweredOn".into(),
                    vm_count: Some(4),
                    has_diagnostics: true,
                });
            }
        });
        let names: Vec<String> = list_hosts(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["esx-01", "esx-02", "esx-03"]);
    }

    #[tokio::test]
    async fn test_vm_listing_propagates_unsupported() {
        let err = list_vms(&FakeSession::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Unsupported(_)));
    }
}
