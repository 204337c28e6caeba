//! One synchronization round: pull, apply, push, then commit the checkpoint.

use tokio::sync::{watch, Mutex};

use super::apply::{apply_changes, ApplyStats};
use super::protocol::{MigrationSyncChanges, PullRequest, PushRequest, SyncChanges};
use super::remote::RemoteEndpoint;
use crate::db::{app_migrations, changes_since, LocalStore, StoreTxn, CURRENT_VERSION};
use crate::error::{Error, Result};
use crate::models::Collection;
use crate::state::SyncPhase;

/// Outcome of a successful round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries received from the server
    pub pulled: usize,
    /// What applying them changed locally
    pub applied: ApplyStats,
    /// Entries sent to the server
    pub pushed: usize,
    /// Tombstones removed after the server acknowledged them or never saw them
    pub purged: usize,
    /// Checkpoint stored at the end of the round
    pub checkpoint: i64,
}

/// Runs sync rounds between a [`LocalStore`] and a [`RemoteEndpoint`].
///
/// At most one round runs at a time. The checkpoint only moves once a round
/// has pulled, applied and pushed successfully, so any failed or abandoned
/// round can simply be retried.
pub struct SyncEngine<E> {
    store: LocalStore,
    remote: E,
    round: Mutex<()>,
    phase: watch::Sender<SyncPhase>,
}

impl<E: RemoteEndpoint> SyncEngine<E> {
    pub fn new(store: LocalStore, remote: E) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            store,
            remote,
            round: Mutex::new(()),
            phase,
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn remote(&self) -> &E {
        &self.remote
    }

    /// Phase updates of every round
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Run a round, waiting for any round already in flight to finish first
    pub async fn sync(&self) -> Result<SyncReport> {
        let _round = self.round.lock().await;
        self.run_round().await
    }

    /// Run a round, or fail with `SyncInProgress` if one is in flight
    pub async fn try_sync(&self) -> Result<SyncReport> {
        let _round = self.round.try_lock().map_err(|_| Error::SyncInProgress)?;
        self.run_round().await
    }

    async fn run_round(&self) -> Result<SyncReport> {
        let mut guard = PhaseGuard {
            phase: &self.phase,
            finished: false,
        };
        let result = self.round_phases().await;
        guard.finished = true;

        match &result {
            Ok(report) => {
                self.set_phase(SyncPhase::Done);
                tracing::info!(
                    "Sync round done: pulled {}, pushed {}, conflicts {}, checkpoint {}",
                    report.pulled,
                    report.pushed,
                    report.applied.conflicts,
                    report.checkpoint
                );
            }
            Err(error) => {
                self.set_phase(SyncPhase::Failed);
                tracing::warn!(kind = ?error.kind(), "Sync round failed: {error}");
            }
        }
        result
    }

    async fn round_phases(&self) -> Result<SyncReport> {
        self.set_phase(SyncPhase::Pulling);
        let request = self.store.read(pull_request).await?;
        let response = self.remote.pull(&request).await?;
        let pulled = response.changes.len();
        tracing::debug!(
            "Pulled {pulled} changes since {:?}, server time {}",
            request.last_pulled_at,
            response.timestamp
        );

        self.set_phase(SyncPhase::Applying);
        let applied = self
            .store
            .write(|txn| apply_changes(txn, &response.changes))
            .await?;

        self.set_phase(SyncPhase::Pushing);
        let push = PushRequest {
            last_pulled_at: response.timestamp,
            changes: self.store.read(|txn| txn.all_pending_changes()).await?,
        };
        let pushed = push.changes.len();
        if pushed == 0 {
            tracing::debug!("No local changes to push");
        } else {
            for collection in Collection::all() {
                let count = push.changes.len_of(collection);
                if count > 0 {
                    tracing::debug!("Pushing {count} {collection} changes");
                }
            }
            self.remote.push(&push).await?;
            tracing::debug!("Pushed {pushed} local changes");
        }

        let (checkpoint, purged) = self
            .store
            .write(|txn| finish_round(txn, &push.changes, response.timestamp))
            .await?;

        Ok(SyncReport {
            pulled,
            applied,
            pushed,
            purged,
            checkpoint,
        })
    }

    fn set_phase(&self, phase: SyncPhase) {
        tracing::debug!("Sync phase: {phase}");
        self.phase.send_replace(phase);
    }
}

/// Marks a round abandoned mid-flight as failed for subscribers
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<SyncPhase>,
    finished: bool,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.phase.send_replace(SyncPhase::Failed);
        }
    }
}

fn pull_request(txn: &StoreTxn<'_>) -> Result<PullRequest> {
    let last_pulled_at = txn.last_pulled_at()?;
    let migration = if last_pulled_at.is_some() {
        let from = txn.last_synced_schema_version()?.unwrap_or(1);
        MigrationSyncChanges::from_schema_changes(from, changes_since(from, app_migrations()))
    } else {
        None
    };

    Ok(PullRequest {
        last_pulled_at,
        schema_version: CURRENT_VERSION,
        migration,
    })
}

/// DONE: acknowledge the pushed rows and advance the checkpoint, atomically
fn finish_round(txn: &StoreTxn<'_>, pushed: &SyncChanges, timestamp: i64) -> Result<(i64, usize)> {
    txn.mark_pushed(&pushed.users)?;
    txn.mark_pushed(&pushed.customers_b2b)?;
    txn.mark_pushed(&pushed.customers_b2c)?;
    txn.mark_pushed(&pushed.work_approvals)?;

    let mut purged = pushed.users.deleted.len()
        + pushed.customers_b2b.deleted.len()
        + pushed.customers_b2c.deleted.len()
        + pushed.work_approvals.deleted.len();
    for collection in Collection::all() {
        purged += txn.purge_local_tombstones(collection)?;
    }

    let checkpoint = txn.advance_checkpoint(timestamp)?;
    txn.set_last_synced_schema_version(CURRENT_VERSION)?;
    tracing::info!("Checkpoint advanced to {checkpoint}");
    Ok((checkpoint, purged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::db::RowStatus;
    use crate::models::{CustomerB2B, CustomerB2C, RecordId};
    use crate::sync::protocol::{PullResponse, TableChanges};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    /// Scripted server: hands out queued pull responses and records pushes
    #[derive(Default)]
    struct FakeRemote {
        pulls: StdMutex<VecDeque<Result<PullResponse>>>,
        pull_requests: StdMutex<Vec<PullRequest>>,
        pushes: StdMutex<Vec<PushRequest>>,
        push_errors: StdMutex<VecDeque<Error>>,
        pull_delay: Option<Duration>,
        push_delay: Option<Duration>,
    }

    impl FakeRemote {
        fn respond(&self, changes: SyncChanges, timestamp: i64) {
            self.pulls
                .lock()
                .unwrap()
                .push_back(Ok(PullResponse { changes, timestamp }));
        }

        fn fail_next_push(&self, error: Error) {
            self.push_errors.lock().unwrap().push_back(error);
        }

        fn reject_next_push(&self) {
            self.fail_next_push(Error::Server {
                status: 500,
                message: "push rejected".into(),
            });
        }

        fn pushes(&self) -> Vec<PushRequest> {
            self.pushes.lock().unwrap().clone()
        }

        fn pull_requests(&self) -> Vec<PullRequest> {
            self.pull_requests.lock().unwrap().clone()
        }
    }

    impl RemoteEndpoint for Arc<FakeRemote> {
        async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
            if let Some(delay) = self.pull_delay {
                tokio::time::sleep(delay).await;
            }
            self.pull_requests.lock().unwrap().push(request.clone());
            let next = self.pulls.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Ok(PullResponse {
                    changes: SyncChanges::default(),
                    timestamp: 0,
                })
            })
        }

        async fn push(&self, request: &PushRequest) -> Result<()> {
            if let Some(delay) = self.push_delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self.push_errors.lock().unwrap().pop_front();
            if let Some(error) = failure {
                return Err(error);
            }
            self.pushes.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn engine_with(remote: FakeRemote) -> (SyncEngine<Arc<FakeRemote>>, Arc<FakeRemote>) {
        let remote = Arc::new(remote);
        let store = LocalStore::open_in_memory_with_time(ManualTime::new(100)).unwrap();
        (SyncEngine::new(store, remote.clone()), remote)
    }

    fn engine() -> (SyncEngine<Arc<FakeRemote>>, Arc<FakeRemote>) {
        engine_with(FakeRemote::default())
    }

    fn customer(id: &str, name: &str) -> CustomerB2C {
        CustomerB2C {
            id: id.into(),
            name: name.into(),
            ..CustomerB2C::default()
        }
    }

    fn remote_customer(id: &str, name: &str, created_at: i64, updated_at: i64) -> CustomerB2C {
        CustomerB2C {
            created_at,
            updated_at,
            ..customer(id, name)
        }
    }

    fn customers_b2c(created: Vec<CustomerB2C>, updated: Vec<CustomerB2C>) -> SyncChanges {
        SyncChanges {
            customers_b2c: TableChanges {
                created,
                updated,
                deleted: Vec::new(),
            },
            ..SyncChanges::default()
        }
    }

    async fn status_of(engine: &SyncEngine<Arc<FakeRemote>>, id: &str) -> Option<RowStatus> {
        let id = RecordId::from(id);
        engine
            .store()
            .read(|txn| txn.meta(Collection::CustomersB2C, &id))
            .await
            .unwrap()
            .map(|meta| meta.status)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_record_survives_empty_pull_and_is_pushed_next_round() {
        let (engine, remote) = engine();
        let created = engine.store().create(customer("x", "Ravi")).await.unwrap();
        assert_eq!(created.created_at, 100);

        remote.respond(SyncChanges::default(), 200);
        remote.reject_next_push();
        assert!(engine.sync().await.is_err());

        let record: CustomerB2C = engine.store().find(&"x".into()).await.unwrap();
        assert_eq!(record.created_at, 100);
        let dirty = engine
            .store()
            .changed_since::<CustomerB2C>(0)
            .await
            .unwrap();
        assert_eq!(dirty.created, vec![record.clone()]);

        remote.respond(SyncChanges::default(), 200);
        let report = engine.sync().await.unwrap();
        assert_eq!(report.checkpoint, 200);
        assert_eq!(report.pushed, 1);

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].last_pulled_at, 200);
        assert_eq!(pushes[0].changes.customers_b2c.created, vec![record]);
        assert_eq!(status_of(&engine, "x").await, Some(RowStatus::Synced));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_newer_version_wins() {
        let (engine, remote) = engine();
        engine
            .store()
            .write(|txn| {
                txn.put_row(&remote_customer("x", "Old", 50, 50), RowStatus::Synced)?;
                Ok(())
            })
            .await
            .unwrap();
        engine
            .store()
            .update::<CustomerB2C>(&"x".into(), |record| record.name = "Mine".into())
            .await
            .unwrap();

        remote.respond(
            customers_b2c(Vec::new(), vec![remote_customer("x", "New", 50, 300)]),
            400,
        );
        let report = engine.sync().await.unwrap();
        assert_eq!(report.applied.conflicts, 1);

        let record: CustomerB2C = engine.store().find(&"x".into()).await.unwrap();
        assert_eq!(record.name, "New");
        assert_eq!(record.updated_at, 300);
        assert!(remote.pushes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_push_keeps_checkpoint_and_retry_does_not_duplicate() {
        let (engine, remote) = engine();
        remote.respond(SyncChanges::default(), 100);
        engine.sync().await.unwrap();

        engine.store().create(customer("mine", "Local")).await.unwrap();
        let pulled = customers_b2c(vec![remote_customer("srv-1", "Meena", 150, 150)], Vec::new());

        remote.respond(pulled.clone(), 300);
        remote.reject_next_push();
        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Server { status: 500, .. }));
        assert_eq!(engine.phase(), SyncPhase::Failed);
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), Some(100));
        assert_eq!(status_of(&engine, "mine").await, Some(RowStatus::Created));

        remote.respond(pulled, 300);
        engine.sync().await.unwrap();

        let requests = remote.pull_requests();
        assert_eq!(requests[1].last_pulled_at, Some(100));
        assert_eq!(requests[2].last_pulled_at, Some(100));
        assert_eq!(engine.store().count(Collection::CustomersB2C).await.unwrap(), 2);
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), Some(300));
        assert_eq!(engine.phase(), SyncPhase::Done);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deleted_record_is_pushed_then_forgotten() {
        let (engine, remote) = engine();
        engine
            .store()
            .write(|txn| {
                txn.put_row(&remote_customer("y", "Gone soon", 10, 10), RowStatus::Synced)?;
                Ok(())
            })
            .await
            .unwrap();
        engine
            .store()
            .mark_deleted(Collection::CustomersB2C, &"y".into())
            .await
            .unwrap();
        assert!(engine.store().find::<CustomerB2C>(&"y".into()).await.is_err());

        remote.respond(SyncChanges::default(), 500);
        let report = engine.sync().await.unwrap();
        assert_eq!(report.purged, 1);

        let pushes = remote.pushes();
        assert_eq!(pushes[0].changes.customers_b2c.deleted, vec![RecordId::from("y")]);
        assert_eq!(status_of(&engine, "y").await, None);

        let since_zero = engine
            .store()
            .changed_since::<CustomerB2C>(0)
            .await
            .unwrap();
        assert!(since_zero.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_never_pushed_tombstone_is_dropped_without_push() {
        let (engine, remote) = engine();
        engine.store().create(customer("draft", "Draft")).await.unwrap();
        engine
            .store()
            .mark_deleted(Collection::CustomersB2C, &"draft".into())
            .await
            .unwrap();

        remote.respond(SyncChanges::default(), 50);
        let report = engine.sync().await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(report.purged, 1);
        assert!(remote.pushes().is_empty());
        assert_eq!(status_of(&engine, "draft").await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checkpoint_never_decreases() {
        let (engine, remote) = engine();
        let mut seen = Vec::new();
        for timestamp in [300, 200, 400] {
            remote.respond(SyncChanges::default(), timestamp);
            engine.sync().await.unwrap();
            seen.push(engine.store().last_pulled_at().await.unwrap().unwrap());
        }
        assert_eq!(seen, vec![300, 300, 400]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_failure_commits_nothing() {
        let (engine, remote) = engine();
        remote
            .pulls
            .lock()
            .unwrap()
            .push_back(Err(Error::Network("offline".into())));
        engine.store().create(customer("x", "Ravi")).await.unwrap();

        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Network(_)));
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), None);
        assert_eq!(status_of(&engine, "x").await, Some(RowStatus::Created));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invariant_violation_fails_round_without_applying() {
        let (engine, remote) = engine();
        engine.store().create(customer("dup", "Mine")).await.unwrap();

        remote.respond(
            customers_b2c(
                vec![
                    remote_customer("fresh", "Theirs", 5, 5),
                    remote_customer("dup", "Theirs", 5, 5),
                ],
                Vec::new(),
            ),
            900,
        );
        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::SyncConflictInvariant { .. }));
        assert_eq!(status_of(&engine, "fresh").await, None);
        assert!(remote.pushes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_edit_during_push_stays_dirty() {
        let (engine, remote) = engine();
        let created = engine
            .store()
            .create(CustomerB2B {
                id: "b1".into(),
                name: "Acme".into(),
                ..CustomerB2B::default()
            })
            .await
            .unwrap();

        let pushed = SyncChanges {
            customers_b2b: TableChanges {
                created: vec![created],
                ..TableChanges::default()
            },
            ..SyncChanges::default()
        };
        engine
            .store()
            .update::<CustomerB2B>(&"b1".into(), |record| record.team = Some("north".into()))
            .await
            .unwrap();
        engine
            .store()
            .write(|txn| finish_round(txn, &pushed, 1_000))
            .await
            .unwrap();

        assert!(engine
            .store()
            .has_unpushed_changes(Collection::CustomersB2B)
            .await
            .unwrap());
        assert_eq!(remote.pushes().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_context_after_first_sync() {
        let (engine, remote) = engine();
        remote.respond(SyncChanges::default(), 10);
        engine.sync().await.unwrap();
        remote.respond(SyncChanges::default(), 20);
        engine.sync().await.unwrap();

        let requests = remote.pull_requests();
        assert_eq!(requests[0].last_pulled_at, None);
        assert_eq!(requests[0].migration, None);
        assert_eq!(requests[0].schema_version, CURRENT_VERSION);
        assert_eq!(requests[1].last_pulled_at, Some(10));
        assert_eq!(requests[1].migration, None);

        engine
            .store()
            .write(|txn| txn.set_last_synced_schema_version(3))
            .await
            .unwrap();
        remote.respond(SyncChanges::default(), 30);
        engine.sync().await.unwrap();
        let migration = remote.pull_requests()[2].migration.clone().unwrap();
        assert_eq!(migration.from, 3);
        assert_eq!(migration.tables, vec!["customers_b2b", "customers_b2c"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_only_one_round_in_flight() {
        let (engine, remote) = engine_with(FakeRemote {
            pull_delay: Some(Duration::from_millis(200)),
            ..FakeRemote::default()
        });
        remote.respond(SyncChanges::default(), 10);
        remote.respond(SyncChanges::default(), 20);
        let engine = Arc::new(engine);
        let mut phases = engine.subscribe();

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync().await }
        });
        phases
            .wait_for(|phase| *phase == SyncPhase::Pulling)
            .await
            .unwrap();

        let rejected = engine.try_sync().await.unwrap_err();
        assert!(matches!(rejected, Error::SyncInProgress));

        let waited = engine.sync().await.unwrap();
        let first = running.await.unwrap().unwrap();
        assert_eq!(first.checkpoint, 10);
        assert_eq!(waited.checkpoint, 20);
        assert_eq!(remote.pull_requests().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejected_credentials_fail_round_without_checkpoint() {
        let (engine, remote) = engine();
        remote.respond(SyncChanges::default(), 100);
        engine.sync().await.unwrap();
        engine.store().create(customer("x", "Ravi")).await.unwrap();

        remote
            .pulls
            .lock()
            .unwrap()
            .push_back(Err(Error::Auth("token expired".into())));
        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
        assert_eq!(engine.phase(), SyncPhase::Failed);
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), Some(100));

        remote.respond(SyncChanges::default(), 300);
        remote.fail_next_push(Error::Auth("token expired".into()));
        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
        assert!(!error.is_retryable());
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), Some(100));
        assert_eq!(status_of(&engine, "x").await, Some(RowStatus::Created));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_round_abandoned_while_pulling_is_failed() {
        let (engine, remote) = engine_with(FakeRemote {
            pull_delay: Some(Duration::from_secs(5)),
            ..FakeRemote::default()
        });
        remote.respond(SyncChanges::default(), 100);

        let outcome = tokio::time::timeout(Duration::from_millis(50), engine.sync()).await;
        assert!(outcome.is_err());
        assert_eq!(engine.phase(), SyncPhase::Failed);
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), None);
        assert!(remote.pull_requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_round_abandoned_while_pushing_keeps_changes_dirty() {
        let (engine, remote) = engine_with(FakeRemote {
            push_delay: Some(Duration::from_secs(5)),
            ..FakeRemote::default()
        });
        engine.store().create(customer("x", "Ravi")).await.unwrap();
        remote.respond(SyncChanges::default(), 100);
        let engine = Arc::new(engine);
        let mut phases = engine.subscribe();

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync().await }
        });
        phases
            .wait_for(|phase| *phase == SyncPhase::Pushing)
            .await
            .unwrap();
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        assert_eq!(engine.phase(), SyncPhase::Failed);
        assert_eq!(engine.store().last_pulled_at().await.unwrap(), None);
        assert_eq!(status_of(&engine, "x").await, Some(RowStatus::Created));
        assert!(remote.pushes().is_empty());
        assert!(engine.round.try_lock().is_ok());
    }
}
