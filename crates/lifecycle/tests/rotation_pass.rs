//! Integration tests for the rotation pass
//!
//! These tests run full passes against the in-memory collaborators and
//! check the resulting key sets, secrets, audit records and notifications.

mod common;

use async_trait::async_trait;
use common::{Harness, ROTATION_TOPIC, day, trigger};
use keyward_lifecycle::memory::{DirectoryCall, InMemoryDirectory, Mutation};
use keyward_lifecycle::prelude::*;
use keyward_lifecycle::{DirectoryOperation, RotationOrchestrator};
use mockall::mock;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn id(raw: &str) -> KeyId {
    KeyId::from(raw)
}

fn who(raw: &str) -> IdentityName {
    IdentityName::from(raw)
}

fn rotated(report: &RotationReport, identity: &str) -> RotationRecord {
    match report.outcome(identity) {
        Some(IdentityOutcome::Rotated(record)) => record.clone(),
        other => panic!("expected {identity} to rotate, got {other:?}"),
    }
}

fn failure(report: &RotationReport, identity: &str) -> LifecycleError {
    match report.outcome(identity) {
        Some(IdentityOutcome::Failed { error, .. }) => error.clone(),
        other => panic!("expected {identity} to fail, got {other:?}"),
    }
}

#[tokio::test]
async fn single_active_key_is_replaced() {
    // GIVEN: alice holds one active key created on day 0
    let harness = Harness::new(
        InMemoryDirectory::new()
            .with_identity("alice", vec![AccessKey::active("A1", day(0))])
            .with_issue_time(day(10)),
    );

    // WHEN: a rotation pass runs on day 10
    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .expect("pass should run");

    // THEN: A1 is inactive and a new active key exists
    assert_eq!(report.status, PassStatus::Completed);
    let record = rotated(&report, "alice");
    assert_eq!(record.old_key_id, Some(id("A1")));
    assert_eq!(record.rotated_at, day(10));

    let keys = harness.directory.keys("alice").await;
    assert_eq!(
        keys,
        vec![
            AccessKey::inactive("A1", day(0)),
            AccessKey::active(record.new_key_id.clone(), day(10)),
        ]
    );

    // AND: the secret holds the new key, the ledger holds one record
    let secret = harness.secrets.get("alice-api-keys").await.expect("secret");
    assert_eq!(secret["AccessKeyId"], record.new_key_id.as_str());
    assert!(secret["SecretAccessKey"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(harness.audit.records().await, vec![record.clone()]);

    // AND: alice got exactly one success notification
    let notes = harness.notifications_for("alice");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].subject, "IAM key rotated for alice");
    assert_eq!(notes[0].target.as_str(), ROTATION_TOPIC);
    assert_eq!(notes[0].payload["oldKey"], "A1");
    assert_eq!(notes[0].payload["newKey"], record.new_key_id.as_str());
}

#[tokio::test]
async fn full_identity_frees_slot_from_oldest_inactive() {
    // GIVEN: bob holds active A1 and an older inactive A0
    let harness = Harness::new(InMemoryDirectory::new().with_identity(
        "bob",
        vec![
            AccessKey::inactive("A0", day(0)),
            AccessKey::active("A1", day(5)),
        ],
    ));

    // WHEN: a rotation pass runs
    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(20)))
        .await
        .unwrap();

    // THEN: deactivate, delete and create ran in that order
    let record = rotated(&report, "bob");
    assert_eq!(
        harness.directory.mutations(),
        vec![
            Mutation::Deactivated(who("bob"), id("A1")),
            Mutation::Deleted(who("bob"), id("A0")),
            Mutation::Created(who("bob"), record.new_key_id.clone()),
        ]
    );

    // AND: A0 is gone, A1 is retained as inactive, the new key is active
    let keys = harness.directory.keys("bob").await;
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.id != id("A0")));
    assert!(
        keys.iter()
            .any(|k| k.id == id("A1") && k.status == KeyStatus::Inactive)
    );
    assert!(
        keys.iter()
            .any(|k| k.id == record.new_key_id && k.status == KeyStatus::Active)
    );
}

#[tokio::test]
async fn identity_without_keys_gets_first_key() {
    let harness = Harness::new(InMemoryDirectory::new().with_identity("newcomer", Vec::new()));

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(1)))
        .await
        .unwrap();

    let record = rotated(&report, "newcomer");
    assert_eq!(record.old_key_id, None);
    assert_eq!(
        harness.directory.mutations(),
        vec![Mutation::Created(who("newcomer"), record.new_key_id.clone())]
    );
    assert_eq!(
        harness.notifications_for("newcomer")[0].payload["oldKey"],
        serde_json::Value::Null
    );
}

#[tokio::test]
async fn consecutive_rotations_keep_two_keys() {
    let harness = Harness::new(
        InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", day(0))]),
    );
    let lifecycle = harness.lifecycle();

    let first = rotated(
        &lifecycle.run_rotation_pass(&trigger(day(30))).await.unwrap(),
        "alice",
    );
    let second = rotated(
        &lifecycle.run_rotation_pass(&trigger(day(60))).await.unwrap(),
        "alice",
    );

    // The second pass deactivates the key issued by the first and drops A1.
    assert_eq!(second.old_key_id, Some(first.new_key_id.clone()));
    let keys = harness.directory.keys("alice").await;
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.id != id("A1")));
    assert_eq!(harness.audit.records().await, vec![first, second]);
    assert_eq!(harness.secrets.write_count("alice-api-keys"), 2);
}

#[tokio::test]
async fn secret_store_failure_is_isolated_per_identity() {
    // GIVEN: dave's secret cannot be written, eve's can
    let harness = Harness::new(
        InMemoryDirectory::new()
            .with_identity("dave", vec![AccessKey::active("D1", day(0))])
            .with_identity("eve", vec![AccessKey::active("E1", day(0))]),
    );
    harness
        .secrets
        .fail_next("dave-api-keys", PortError::Unavailable("throttled".into()));

    // WHEN: a rotation pass runs
    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .expect("isolated failures do not fail the pass");

    // THEN: dave failed with a secret store error, eve rotated
    assert_eq!(report.status, PassStatus::CompletedWithFailures);
    assert_eq!(failure(&report, "dave").kind(), "secret_store_failure");
    let eve = rotated(&report, "eve");

    // AND: dave's new key exists in the directory without a secret or record
    assert_eq!(harness.directory.keys("dave").await.len(), 2);
    assert!(harness.secrets.get("dave-api-keys").await.is_none());
    assert_eq!(harness.audit.records().await, vec![eve]);

    // AND: each identity got its own notification, plus one summary
    assert_eq!(
        harness.notifications_for("dave")[0].subject,
        "IAM key rotation failed for dave"
    );
    assert_eq!(
        harness.notifications_for("eve")[0].subject,
        "IAM key rotated for eve"
    );
    let subjects = harness.notifier.subjects();
    assert_eq!(
        subjects.last().map(String::as_str),
        Some("Key rotation completed with 1 failure(s)")
    );
}

#[tokio::test]
async fn failed_deactivation_stops_the_plan() {
    let harness = Harness::new(
        InMemoryDirectory::new()
            .with_identity("bob", vec![AccessKey::active("B1", day(0))])
            .with_identity("carol", vec![AccessKey::active("C1", day(0))]),
    );
    harness.directory.fail_next(
        DirectoryCall::Deactivate,
        Some("bob"),
        PortError::Rejected("access denied".into()),
    );

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert!(matches!(
        failure(&report, "bob"),
        LifecycleError::Directory {
            operation: DirectoryOperation::Deactivate,
            ..
        }
    ));
    // No later step ran for bob.
    assert_eq!(
        harness.directory.keys("bob").await,
        vec![AccessKey::active("B1", day(0))]
    );
    rotated(&report, "carol");
}

#[tokio::test]
async fn failed_deletion_never_reaches_create() {
    let harness = Harness::new(InMemoryDirectory::new().with_identity(
        "bob",
        vec![
            AccessKey::inactive("A0", day(0)),
            AccessKey::active("A1", day(5)),
        ],
    ));
    harness.directory.fail_next(
        DirectoryCall::Delete,
        None,
        PortError::Unavailable("timeout".into()),
    );

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert!(matches!(
        failure(&report, "bob"),
        LifecycleError::Directory {
            operation: DirectoryOperation::Delete,
            ..
        }
    ));
    assert_eq!(
        harness.directory.mutations(),
        vec![Mutation::Deactivated(who("bob"), id("A1"))]
    );
}

#[tokio::test]
async fn already_deleted_inactive_key_still_frees_the_slot() {
    // GIVEN: bob's inactive key disappears before the pass deletes it
    let harness = Harness::new(InMemoryDirectory::new().with_identity(
        "bob",
        vec![
            AccessKey::inactive("A0", day(0)),
            AccessKey::active("A1", day(5)),
        ],
    ));
    harness
        .directory
        .remove_before(DirectoryCall::Delete, "bob", "A0");

    // WHEN: the pass runs
    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    // THEN: the missing key is treated as deleted and bob still rotates
    assert_eq!(report.status, PassStatus::Completed);
    let record = rotated(&report, "bob");
    assert_eq!(record.old_key_id, Some(id("A1")));
    assert_eq!(
        harness.directory.mutations(),
        vec![
            Mutation::Deactivated(who("bob"), id("A1")),
            Mutation::Created(who("bob"), record.new_key_id.clone()),
        ]
    );
    let keys = harness.directory.keys("bob").await;
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.id != id("A0")));
}

#[tokio::test]
async fn vanished_active_key_fails_the_identity() {
    let harness = Harness::new(
        InMemoryDirectory::new()
            .with_identity("alice", vec![AccessKey::active("A1", day(0))])
            .with_identity("bob", vec![AccessKey::active("B1", day(0))]),
    );
    harness
        .directory
        .remove_before(DirectoryCall::Deactivate, "alice", "A1");

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert_eq!(
        failure(&report, "alice"),
        LifecycleError::Directory {
            identity: who("alice"),
            operation: DirectoryOperation::Deactivate,
            source: PortError::not_found("key", "A1"),
        }
    );
    // No key was issued in place of the vanished one.
    assert!(harness.directory.keys("alice").await.is_empty());
    assert_eq!(harness.secrets.write_count("alice-api-keys"), 0);
    rotated(&report, "bob");
}

#[tokio::test]
async fn key_listing_failure_is_isolated_per_identity() {
    let harness = Harness::new(
        InMemoryDirectory::new()
            .with_identity("alice", vec![AccessKey::active("A1", day(0))])
            .with_identity("bob", vec![AccessKey::active("B1", day(0))]),
    );
    harness.directory.fail_next(
        DirectoryCall::ListKeys,
        Some("alice"),
        PortError::Unavailable("throttled".into()),
    );

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert_eq!(report.status, PassStatus::CompletedWithFailures);
    let err = report
        .outcome("alice")
        .and_then(IdentityOutcome::error)
        .cloned()
        .unwrap();
    assert_eq!(err.identity(), Some(&who("alice")));
    assert!(matches!(
        err,
        LifecycleError::Directory {
            operation: DirectoryOperation::ListKeys,
            ..
        }
    ));
    assert_eq!(harness.directory.keys("alice").await.len(), 1);
    assert_eq!(rotated(&report, "bob").old_key_id, Some(id("B1")));
}

#[tokio::test]
async fn over_ceiling_identity_is_left_untouched() {
    // GIVEN: a pre-existing violation of the two-key ceiling
    let harness = Harness::new(InMemoryDirectory::new().with_identity(
        "legacy",
        vec![
            AccessKey::inactive("L0", day(0)),
            AccessKey::inactive("L1", day(1)),
            AccessKey::active("L2", day(2)),
        ],
    ));

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert_eq!(
        failure(&report, "legacy"),
        LifecycleError::SlotUnavailable {
            identity: who("legacy"),
            key_count: 3,
        }
    );
    assert!(harness.directory.mutations().is_empty());
}

#[tokio::test]
async fn audit_failure_fails_identity_after_secret_write() {
    let harness = Harness::new(
        InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", day(0))]),
    );
    harness
        .audit
        .fail_next(PortError::Unavailable("ledger offline".into()));

    let report = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert_eq!(failure(&report, "alice").kind(), "audit_failure");
    assert_eq!(harness.secrets.write_count("alice-api-keys"), 1);
    assert!(harness.audit.records().await.is_empty());
}

#[tokio::test]
async fn unreachable_directory_aborts_pass() {
    let harness = Harness::new(
        InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", day(0))]),
    );
    harness.directory.fail_next(
        DirectoryCall::ListIdentities,
        None,
        PortError::Unavailable("connection refused".into()),
    );

    let err = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::DirectoryUnavailable { .. }));
    let notes = harness.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].subject, "Key rotation failed");
    assert_eq!(notes[0].payload["event"]["source"], "test");
    assert!(harness.directory.mutations().is_empty());
}

#[tokio::test]
async fn failing_notifier_does_not_swallow_fatal_error() {
    let harness = Harness::new(InMemoryDirectory::new());
    harness.directory.fail_next(
        DirectoryCall::ListIdentities,
        None,
        PortError::Unavailable("connection refused".into()),
    );
    harness
        .notifier
        .fail_with(PortError::Unavailable("topic deleted".into()));

    let err = harness
        .lifecycle()
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LifecycleError::DirectoryUnavailable {
            source: PortError::Unavailable("connection refused".into()),
        }
    );
    assert!(harness.notifier.notifications().is_empty());
}

#[tokio::test]
async fn cancelled_pass_skips_remaining_identities() {
    let harness = Harness::new(
        InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", day(0))]),
    );
    let token = CancellationToken::new();
    token.cancel();

    let report = harness
        .lifecycle()
        .with_cancellation(token)
        .run_rotation_pass(&trigger(day(10)))
        .await
        .unwrap();

    assert_eq!(report.status, PassStatus::Cancelled);
    assert!(report.outcomes.is_empty());
    assert!(harness.directory.mutations().is_empty());
    let notes = harness.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].payload["cancelled"], true);
}

mock! {
    pub FlakyChannel {}

    #[async_trait]
    impl Notifier for FlakyChannel {
        async fn publish(&self, notification: &Notification) -> Result<(), PortError>;
    }
}

#[tokio::test]
async fn notifier_failure_does_not_mask_success() {
    // GIVEN: a notification channel that rejects everything
    let harness = Harness::new(
        InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", day(0))]),
    );
    let mut channel = MockFlakyChannel::new();
    channel
        .expect_publish()
        .times(2)
        .returning(|_| Err(PortError::Unavailable("topic deleted".into())));

    let collaborators = Collaborators {
        notifier: std::sync::Arc::new(channel),
        ..harness.collaborators()
    };

    // WHEN: the pass runs
    let report = RotationOrchestrator::new(collaborators, &common::config())
        .run(&trigger(day(10)))
        .await
        .expect("notification failures are not pass failures");

    // THEN: the rotation itself still committed
    let record = rotated(&report, "alice");
    assert_eq!(harness.audit.records().await, vec![record]);
}
