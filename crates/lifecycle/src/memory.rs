//! In-memory collaborators.
//!
//! Back the integration tests and the CLI's snapshot mode. Each adapter can
//! be told to fail its next call, which is how the failure paths of the
//! orchestrators are exercised.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PortError;
use crate::model::{
    AccessKey, IdentityName, IssuedKey, KeyId, KeyStatus, RotationRecord, SecretEntry,
};
use crate::policy::MAX_KEYS_PER_IDENTITY;
use crate::ports::{AuditLedger, DirectoryGateway, Notification, Notifier, SecretStore};

/// Every identity with its keys, as persisted by the CLI.
pub type DirectorySnapshot = BTreeMap<IdentityName, Vec<AccessKey>>;

/// Directory call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryCall {
    /// `list_identities`
    ListIdentities,
    /// `list_keys`
    ListKeys,
    /// `deactivate_key`
    Deactivate,
    /// `delete_key`
    Delete,
    /// `create_key`
    Create,
    /// `get_last_used`
    LastUsed,
}

/// Mutation applied to the directory, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A key was deactivated.
    Deactivated(IdentityName, KeyId),
    /// A key was deleted.
    Deleted(IdentityName, KeyId),
    /// A key was issued.
    Created(IdentityName, KeyId),
}

#[derive(Debug)]
struct InjectedFailure {
    call: DirectoryCall,
    identity: Option<IdentityName>,
    error: PortError,
}

#[derive(Debug)]
struct PendingRemoval {
    call: DirectoryCall,
    identity: IdentityName,
    key: KeyId,
}

/// Directory held in memory, enforcing the two-key ceiling.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    identities: RwLock<DirectorySnapshot>,
    failures: Mutex<Vec<InjectedFailure>>,
    removals: Mutex<Vec<PendingRemoval>>,
    mutations: Mutex<Vec<Mutation>>,
    issue_time: Option<DateTime<Utc>>,
}

impl InMemoryDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded from a snapshot.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            identities: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    /// Seed an identity with its keys.
    pub fn with_identity(
        mut self,
        identity: impl Into<IdentityName>,
        keys: Vec<AccessKey>,
    ) -> Self {
        self.identities.get_mut().insert(identity.into(), keys);
        self
    }

    /// Stamp issued keys with a fixed creation time instead of the wall clock.
    pub fn with_issue_time(mut self, at: DateTime<Utc>) -> Self {
        self.issue_time = Some(at);
        self
    }

    /// Make the next matching call fail with `error`.
    ///
    /// With `identity` set, only a call for that identity matches.
    pub fn fail_next(&self, call: DirectoryCall, identity: Option<&str>, error: PortError) {
        self.failures.lock().push(InjectedFailure {
            call,
            identity: identity.map(IdentityName::from),
            error,
        });
    }

    /// Remove `key` right before the next `call` for `identity`, as if
    /// another actor had deleted it in between.
    pub fn remove_before(&self, call: DirectoryCall, identity: &str, key: &str) {
        self.removals.lock().push(PendingRemoval {
            call,
            identity: IdentityName::from(identity),
            key: KeyId::from(key),
        });
    }

    /// Current keys of every identity.
    pub async fn snapshot(&self) -> DirectorySnapshot {
        self.identities.read().await.clone()
    }

    /// Current keys of one identity; empty if unknown.
    pub async fn keys(&self, identity: &str) -> Vec<AccessKey> {
        self.identities
            .read()
            .await
            .get(&IdentityName::from(identity))
            .cloned()
            .unwrap_or_default()
    }

    /// Record an authenticated use of a key.
    pub async fn record_use(&self, identity: &str, key: &str, at: DateTime<Utc>) {
        let mut identities = self.identities.write().await;
        if let Some(entry) = identities
            .get_mut(&IdentityName::from(identity))
            .and_then(|keys| keys.iter_mut().find(|k| k.id.as_str() == key))
        {
            entry.last_used = Some(at);
        }
    }

    /// Mutations applied so far, in call order.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().clone()
    }

    fn take_failure(
        &self,
        call: DirectoryCall,
        identity: Option<&IdentityName>,
    ) -> Result<(), PortError> {
        let mut failures = self.failures.lock();
        let position = failures.iter().position(|failure| {
            failure.call == call
                && failure
                    .identity
                    .as_ref()
                    .is_none_or(|wanted| Some(wanted) == identity)
        });
        match position {
            Some(index) => Err(failures.remove(index).error),
            None => Ok(()),
        }
    }

    async fn intercept(
        &self,
        call: DirectoryCall,
        identity: &IdentityName,
    ) -> Result<(), PortError> {
        self.take_failure(call, Some(identity))?;

        let due: Vec<KeyId> = {
            let mut removals = self.removals.lock();
            let mut due = Vec::new();
            removals.retain(|removal| {
                let matches = removal.call == call && &removal.identity == identity;
                if matches {
                    due.push(removal.key.clone());
                }
                !matches
            });
            due
        };
        if !due.is_empty() {
            let mut identities = self.identities.write().await;
            if let Some(keys) = identities.get_mut(identity) {
                keys.retain(|k| !due.contains(&k.id));
            }
        }
        Ok(())
    }

    fn missing_identity(identity: &IdentityName) -> PortError {
        PortError::not_found("identity", identity.as_str())
    }

    fn missing_key(key: &KeyId) -> PortError {
        PortError::not_found("key", key.as_str())
    }
}

#[async_trait]
impl DirectoryGateway for InMemoryDirectory {
    async fn list_identities(&self) -> Result<Vec<IdentityName>, PortError> {
        self.take_failure(DirectoryCall::ListIdentities, None)?;
        Ok(self.identities.read().await.keys().cloned().collect())
    }

    async fn list_keys(&self, identity: &IdentityName) -> Result<Vec<AccessKey>, PortError> {
        self.intercept(DirectoryCall::ListKeys, identity).await?;
        self.identities
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| Self::missing_identity(identity))
    }

    async fn deactivate_key(&self, identity: &IdentityName, key: &KeyId) -> Result<(), PortError> {
        self.intercept(DirectoryCall::Deactivate, identity).await?;
        let mut identities = self.identities.write().await;
        let keys = identities
            .get_mut(identity)
            .ok_or_else(|| Self::missing_identity(identity))?;
        let entry = keys
            .iter_mut()
            .find(|k| &k.id == key)
            .ok_or_else(|| Self::missing_key(key))?;
        entry.status = KeyStatus::Inactive;
        self.mutations
            .lock()
            .push(Mutation::Deactivated(identity.clone(), key.clone()));
        Ok(())
    }

    async fn delete_key(&self, identity: &IdentityName, key: &KeyId) -> Result<(), PortError> {
        self.intercept(DirectoryCall::Delete, identity).await?;
        let mut identities = self.identities.write().await;
        let keys = identities
            .get_mut(identity)
            .ok_or_else(|| Self::missing_identity(identity))?;
        let before = keys.len();
        keys.retain(|k| &k.id != key);
        if keys.len() == before {
            return Err(Self::missing_key(key));
        }
        self.mutations
            .lock()
            .push(Mutation::Deleted(identity.clone(), key.clone()));
        Ok(())
    }

    async fn create_key(&self, identity: &IdentityName) -> Result<IssuedKey, PortError> {
        self.intercept(DirectoryCall::Create, identity).await?;
        let mut identities = self.identities.write().await;
        let keys = identities
            .get_mut(identity)
            .ok_or_else(|| Self::missing_identity(identity))?;
        if keys.len() >= MAX_KEYS_PER_IDENTITY {
            return Err(PortError::Rejected(format!(
                "{identity} already holds {} access keys",
                keys.len()
            )));
        }

        let raw = Uuid::new_v4().simple().to_string().to_uppercase();
        let id = KeyId::new(format!("AKIA{}", &raw[..16]));
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let created_at = self.issue_time.unwrap_or_else(Utc::now);
        keys.push(AccessKey::active(id.clone(), created_at));
        self.mutations
            .lock()
            .push(Mutation::Created(identity.clone(), id.clone()));
        Ok(IssuedKey::new(id, secret))
    }

    async fn get_last_used(
        &self,
        identity: &IdentityName,
        key: &KeyId,
    ) -> Result<Option<DateTime<Utc>>, PortError> {
        self.intercept(DirectoryCall::LastUsed, identity).await?;
        let identities = self.identities.read().await;
        identities
            .get(identity)
            .ok_or_else(|| Self::missing_identity(identity))?
            .iter()
            .find(|k| &k.id == key)
            .map(|k| k.last_used)
            .ok_or_else(|| Self::missing_key(key))
    }
}

/// Secret store held in memory.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, serde_json::Value>>,
    writes: Mutex<HashMap<String, u32>>,
    failures: Mutex<HashMap<String, PortError>>,
}

impl InMemorySecretStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write of `name` fail with `error`.
    pub fn fail_next(&self, name: &str, error: PortError) {
        self.failures.lock().insert(name.to_owned(), error);
    }

    /// Stored document for `name`.
    pub async fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.secrets.read().await.get(name).cloned()
    }

    /// Names of all stored secrets.
    pub async fn names(&self) -> Vec<String> {
        self.secrets.read().await.keys().cloned().collect()
    }

    /// Successful writes of `name` so far.
    pub fn write_count(&self, name: &str) -> u32 {
        self.writes.lock().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn upsert(&self, entry: &SecretEntry) -> Result<(), PortError> {
        if let Some(error) = self.failures.lock().remove(entry.name()) {
            return Err(error);
        }
        self.secrets
            .write()
            .await
            .insert(entry.name().to_owned(), entry.to_document());
        *self.writes.lock().entry(entry.name().to_owned()).or_default() += 1;
        Ok(())
    }
}

/// Audit ledger held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditLedger {
    records: RwLock<Vec<RotationRecord>>,
    failure: Mutex<Option<PortError>>,
}

impl InMemoryAuditLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next append fail with `error`.
    pub fn fail_next(&self, error: PortError) {
        *self.failure.lock() = Some(error);
    }

    /// Every record appended so far.
    pub async fn records(&self) -> Vec<RotationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditLedger for InMemoryAuditLedger {
    async fn append(&self, record: &RotationRecord) -> Result<(), PortError> {
        if let Some(error) = self.failure.lock().take() {
            return Err(error);
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Notifier that keeps every published message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<Notification>>,
    failing: Mutex<Option<PortError>>,
}

impl RecordingNotifier {
    /// Notifier accepting every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message with `error` from now on.
    pub fn fail_with(&self, error: PortError) {
        *self.failing.lock() = Some(error);
    }

    /// Messages published so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.published.lock().clone()
    }

    /// Subjects of the messages published so far.
    pub fn subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|n| n.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), PortError> {
        if let Some(error) = self.failing.lock().clone() {
            return Err(error);
        }
        self.published.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_key_enforces_ceiling() {
        let directory = InMemoryDirectory::new().with_identity(
            "full",
            vec![AccessKey::active("A", t0()), AccessKey::inactive("B", t0())],
        );
        let err = directory
            .create_key(&IdentityName::from("full"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Rejected(_)));
    }

    #[tokio::test]
    async fn create_key_issues_active_key() {
        let directory = InMemoryDirectory::new()
            .with_identity("alice", Vec::new())
            .with_issue_time(t0());
        let issued = directory
            .create_key(&IdentityName::from("alice"))
            .await
            .unwrap();

        let keys = directory.keys("alice").await;
        assert_eq!(keys, vec![AccessKey::active(issued.id.clone(), t0())]);
        assert!(issued.id.as_str().starts_with("AKIA"));
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot_and_scoped() {
        let directory = InMemoryDirectory::new()
            .with_identity("a", Vec::new())
            .with_identity("b", Vec::new());
        directory.fail_next(
            DirectoryCall::ListKeys,
            Some("b"),
            PortError::Unavailable("flaky".into()),
        );

        assert!(directory.list_keys(&IdentityName::from("a")).await.is_ok());
        assert!(directory.list_keys(&IdentityName::from("b")).await.is_err());
        assert!(directory.list_keys(&IdentityName::from("b")).await.is_ok());
    }

    #[tokio::test]
    async fn pending_removal_fires_on_matching_call_only() {
        let directory = InMemoryDirectory::new().with_identity(
            "a",
            vec![AccessKey::inactive("K0", t0()), AccessKey::active("K1", t0())],
        );
        directory.remove_before(DirectoryCall::Delete, "a", "K0");

        let identity = IdentityName::from("a");
        assert_eq!(directory.list_keys(&identity).await.unwrap().len(), 2);

        let err = directory
            .delete_key(&identity, &KeyId::from("K0"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(directory.keys("a").await, vec![AccessKey::active("K1", t0())]);
        assert!(directory.mutations().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_found() {
        let directory = InMemoryDirectory::new().with_identity("a", Vec::new());
        let err = directory
            .delete_key(&IdentityName::from("a"), &KeyId::from("nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn secret_store_overwrites() {
        let store = InMemorySecretStore::new();
        let identity = IdentityName::from("alice");

        store
            .upsert(&SecretEntry::for_identity(&identity, IssuedKey::new("K1", "s1")))
            .await
            .unwrap();
        store
            .upsert(&SecretEntry::for_identity(&identity, IssuedKey::new("K2", "s2")))
            .await
            .unwrap();

        assert_eq!(store.write_count("alice-api-keys"), 2);
        assert_eq!(
            store.get("alice-api-keys").await.unwrap()["AccessKeyId"],
            serde_json::json!("K2")
        );
    }
}
