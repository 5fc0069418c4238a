use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::error::EngineResult;
use crate::notifier::{Notifier, TemplateKind};

/// Who an approval notification was routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproverRouting {
    Manager(u64),
    Broadcast(Vec<u64>),
    Unrouted,
}

/// Sends notifications after a state transition has committed. Every directory
/// lookup and every delivery is bounded by `timeout`, and fan-outs run
/// concurrently, so a broadcast costs about two timeouts whatever its size.
/// Failures are logged and never returned to the caller.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn Directory>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self {
            notifier,
            directory,
            timeout,
        }
    }

    /// Returns whether delivery succeeded within the timeout.
    pub async fn send(&self, address: &str, kind: TemplateKind, payload: Value) -> bool {
        match tokio::time::timeout(self.timeout, self.notifier.notify(address, kind, payload)).await {
            Ok(Ok(())) => {
                debug!(address, template = %kind, "Notification delivered");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, address, template = %kind, "Notification failed");
                false
            }
            Err(_) => {
                warn!(address, template = %kind, timeout_ms = self.timeout.as_millis() as u64, "Notification timed out");
                false
            }
        }
    }

    /// Directory call bounded by the dispatch timeout; `None` on error or timeout.
    async fn lookup<T, F>(&self, what: &'static str, employee_id: u64, call: F) -> Option<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(error = %e, employee_id, lookup = what, "Directory lookup failed");
                None
            }
            Err(_) => {
                warn!(
                    employee_id,
                    lookup = what,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Directory lookup timed out"
                );
                None
            }
        }
    }

    async fn contact_of(&self, employee_id: u64) -> Option<String> {
        self.lookup("contact", employee_id, self.directory.contact_channel(employee_id))
            .await
            .flatten()
    }

    pub async fn notify_employee(&self, employee_id: u64, kind: TemplateKind, payload: Value) -> bool {
        match self.contact_of(employee_id).await {
            Some(address) => self.send(&address, kind, payload).await,
            None => {
                warn!(employee_id, template = %kind, "No contact channel, notification skipped");
                false
            }
        }
    }

    /// One notification per distinct employee. Returns how many were delivered.
    pub async fn notify_employees(&self, employee_ids: &BTreeSet<u64>, kind: TemplateKind, payload: &Value) -> usize {
        let sends: Vec<_> = employee_ids
            .iter()
            .map(|id| self.notify_employee(*id, kind, payload.clone()))
            .collect();

        futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    /// Manager first; HR/admin broadcast only when no manager or manager contact resolves.
    pub async fn route_to_approvers(&self, employee_id: u64, kind: TemplateKind, payload: Value) -> ApproverRouting {
        let manager = self
            .lookup("manager", employee_id, self.directory.manager_of(employee_id))
            .await
            .flatten();

        if let Some(manager_id) = manager {
            if let Some(address) = self.contact_of(manager_id).await {
                self.send(&address, kind, payload).await;
                return ApproverRouting::Manager(manager_id);
            }
            debug!(employee_id, manager_id, "Manager has no contact channel");
        }

        let approvers = self
            .lookup("approvers", employee_id, self.directory.approvers())
            .await
            .unwrap_or_default();

        let payload = &payload;
        let sends: Vec<_> = approvers
            .into_iter()
            .filter(|id| *id != employee_id)
            .map(|approver| async move {
                let address = self.contact_of(approver).await?;
                self.send(&address, kind, payload.clone()).await;
                Some(approver)
            })
            .collect();

        // join_all keeps input order
        let notified: Vec<u64> = futures::future::join_all(sends)
            .await
            .into_iter()
            .flatten()
            .collect();

        if notified.is_empty() {
            warn!(employee_id, template = %kind, "No approver could be notified");
            ApproverRouting::Unrouted
        } else {
            ApproverRouting::Broadcast(notified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MockDirectory;
    use crate::model::location::AuthorizedArea;
    use crate::notifier::{MockNotifier, NotifyError};
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use serde_json::json;

    fn dispatcher(notifier: impl Notifier + 'static, directory: MockDirectory) -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(notifier), Arc::new(directory), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_routes_to_manager_when_reachable() {
        let mut directory = MockDirectory::new();
        directory.expect_manager_of().with(eq(10)).returning(|_| Ok(Some(20)));
        directory
            .expect_contact_channel()
            .with(eq(20))
            .returning(|_| Ok(Some("mgr@company.com".into())));
        directory.expect_approvers().times(0);

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|addr, kind, _| addr == "mgr@company.com" && *kind == TemplateKind::AttendanceRequestSubmitted)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let routing = dispatcher(notifier, directory)
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;
        assert_eq!(routing, ApproverRouting::Manager(20));
    }

    #[tokio::test]
    async fn test_manager_delivery_failure_does_not_trigger_broadcast() {
        let mut directory = MockDirectory::new();
        directory.expect_manager_of().returning(|_| Ok(Some(20)));
        directory
            .expect_contact_channel()
            .returning(|_| Ok(Some("mgr@company.com".into())));
        directory.expect_approvers().times(0);

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _, _| Err(NotifyError::Delivery("smtp 550".into())));

        let routing = dispatcher(notifier, directory)
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;
        assert_eq!(routing, ApproverRouting::Manager(20));
    }

    #[tokio::test]
    async fn test_broadcasts_when_manager_has_no_contact() {
        let mut directory = MockDirectory::new();
        directory.expect_manager_of().returning(|_| Ok(Some(20)));
        directory.expect_contact_channel().returning(|id| match id {
            20 => Ok(None),
            30 => Ok(Some("hr@company.com".into())),
            31 => Ok(Some("admin@company.com".into())),
            _ => Ok(None),
        });
        directory.expect_approvers().returning(|| Ok(vec![30, 31, 32]));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(2).returning(|_, _, _| Ok(()));

        let routing = dispatcher(notifier, directory)
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;
        assert_eq!(routing, ApproverRouting::Broadcast(vec![30, 31]));
    }

    #[tokio::test]
    async fn test_broadcast_skips_requester_and_reports_unrouted() {
        let mut directory = MockDirectory::new();
        directory.expect_manager_of().returning(|_| Ok(None));
        directory.expect_approvers().returning(|| Ok(vec![10]));
        directory.expect_contact_channel().times(0);

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let routing = dispatcher(notifier, directory)
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;
        assert_eq!(routing, ApproverRouting::Unrouted);
    }

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn notify(&self, _: &str, _: TemplateKind, _: Value) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_delivery_is_bounded_by_timeout() {
        let d = dispatcher(SlowNotifier, MockDirectory::new());
        let started = std::time::Instant::now();
        let delivered = d.send("x@company.com", TemplateKind::ReimbursementFailed, json!({})).await;

        assert!(!delivered);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_broadcast_time_does_not_grow_with_approvers() {
        let mut directory = MockDirectory::new();
        directory.expect_manager_of().returning(|_| Ok(None));
        directory
            .expect_approvers()
            .returning(|| Ok((100..110).collect()));
        directory
            .expect_contact_channel()
            .returning(|id| Ok(Some(format!("approver{id}@company.com"))));

        let d = dispatcher(SlowNotifier, directory);
        let started = std::time::Instant::now();
        let routing = d
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;

        // ten 50ms timeouts in sequence would take 500ms
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(routing, ApproverRouting::Broadcast((100..110).collect()));
    }

    /// Directory that never answers in time.
    struct StalledDirectory;

    #[async_trait]
    impl Directory for StalledDirectory {
        async fn assigned_areas(&self, _: u64) -> EngineResult<Vec<AuthorizedArea>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }

        async fn manager_of(&self, _: u64) -> EngineResult<Option<u64>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(20))
        }

        async fn contact_channel(&self, _: u64) -> EngineResult<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("mgr@company.com".into()))
        }

        async fn approvers(&self) -> EngineResult<Vec<u64>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![30])
        }
    }

    #[tokio::test]
    async fn test_stalled_directory_is_bounded_by_timeout() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        let d = NotificationDispatcher::new(
            Arc::new(notifier),
            Arc::new(StalledDirectory),
            Duration::from_millis(50),
        );

        let started = std::time::Instant::now();
        let routing = d
            .route_to_approvers(10, TemplateKind::AttendanceRequestSubmitted, json!({}))
            .await;
        let delivered = d
            .notify_employee(10, TemplateKind::AttendanceRequestApproved, json!({}))
            .await;

        assert_eq!(routing, ApproverRouting::Unrouted);
        assert!(!delivered);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_notify_employees_counts_deliveries() {
        let mut directory = MockDirectory::new();
        directory.expect_contact_channel().returning(|id| match id {
            1 => Ok(Some("one@company.com".into())),
            2 => Ok(None),
            _ => Ok(Some("three@company.com".into())),
        });
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(2).returning(|_, _, _| Ok(()));

        let ids: BTreeSet<u64> = [1, 2, 3].into_iter().collect();
        let delivered = dispatcher(notifier, directory)
            .notify_employees(&ids, TemplateKind::ReimbursementCompleted, &json!({}))
            .await;
        assert_eq!(delivered, 2);
    }
}
