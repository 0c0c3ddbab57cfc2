//! Domain model: identities, access keys, and the records a pass produces.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Suffix appended to the identity name to derive its secret entry name.
pub const SECRET_NAME_SUFFIX: &str = "-api-keys";

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Name of an identity, unique within the directory.
    IdentityName
);

string_newtype!(
    /// Access key identifier, unique per identity.
    KeyId
);

/// Usability state of an access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStatus {
    /// Usable by clients.
    Active,
    /// Retained for a grace period, unusable.
    Inactive,
}

impl KeyStatus {
    /// Returns `true` for [`KeyStatus::Active`].
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// Snapshot of one access key as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    /// Key identifier.
    pub id: KeyId,
    /// Current status.
    pub status: KeyStatus,
    /// When the key was issued.
    pub created_at: DateTime<Utc>,
    /// Last authenticated use; `None` if never used.
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl AccessKey {
    /// Snapshot of a freshly issued, never used active key.
    pub fn active(id: impl Into<KeyId>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: KeyStatus::Active,
            created_at,
            last_used: None,
        }
    }

    /// Snapshot of a never used inactive key.
    pub fn inactive(id: impl Into<KeyId>, created_at: DateTime<Utc>) -> Self {
        Self {
            status: KeyStatus::Inactive,
            ..Self::active(id, created_at)
        }
    }

    /// Set the last-use timestamp.
    pub fn with_last_used(mut self, last_used: DateTime<Utc>) -> Self {
        self.last_used = Some(last_used);
        self
    }
}

/// Key material returned by the directory when a key is created.
///
/// `Debug` never prints the secret.
#[derive(Debug)]
pub struct IssuedKey {
    /// Identifier of the new key.
    pub id: KeyId,
    /// Secret half of the pair.
    pub secret: SecretString,
}

impl IssuedKey {
    /// Bundle an identifier with its secret.
    pub fn new(id: impl Into<KeyId>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

/// Immutable audit entry appended once per successful rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Rotated identity.
    pub identity: IdentityName,
    /// When the new key was issued.
    pub rotated_at: DateTime<Utc>,
    /// Key that was deactivated; `None` if the identity had no active key.
    pub old_key_id: Option<KeyId>,
    /// Key that was created.
    pub new_key_id: KeyId,
}

/// Credential pair persisted to the secret store.
#[derive(Debug)]
pub struct CredentialPair {
    /// Public key identifier.
    pub access_key_id: KeyId,
    /// Secret half of the pair.
    pub secret_access_key: SecretString,
}

/// Current credential material of one identity, stored under a stable name.
#[derive(Debug)]
pub struct SecretEntry {
    name: String,
    payload: CredentialPair,
}

impl SecretEntry {
    /// Build the entry for `identity`, taking ownership of the issued material.
    pub fn for_identity(identity: &IdentityName, key: IssuedKey) -> Self {
        Self {
            name: secret_name(identity),
            payload: CredentialPair {
                access_key_id: key.id,
                secret_access_key: key.secret,
            },
        }
    }

    /// Stable secret name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Credential pair carried by the entry.
    pub fn payload(&self) -> &CredentialPair {
        &self.payload
    }

    /// Render the stored document. Exposes the secret: only drivers call this.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "AccessKeyId": self.payload.access_key_id.as_str(),
            "SecretAccessKey": self.payload.secret_access_key.expose_secret(),
        })
    }
}

/// Secret name derived from an identity.
pub fn secret_name(identity: &IdentityName) -> String {
    format!("{identity}{SECRET_NAME_SUFFIX}")
}

/// What invoked a pass: the opaque trigger payload and the reference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Raw trigger payload, echoed in failure notifications.
    pub event: serde_json::Value,
    /// Reference time T for every decision in the pass.
    pub reference_time: DateTime<Utc>,
}

impl TriggerContext {
    /// Trigger evaluated at the current wall clock.
    pub fn new(event: serde_json::Value) -> Self {
        Self {
            event,
            reference_time: Utc::now(),
        }
    }

    /// Override the reference time.
    pub fn at(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }
}
