//! Rotation planning.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{AccessKey, KeyId};

/// Ceiling the directory enforces on keys held by one identity.
pub const MAX_KEYS_PER_IDENTITY: usize = 2;

/// One mutation of an identity's key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "key_id", rename_all = "snake_case")]
pub enum Action {
    /// Flip an active key to inactive.
    Deactivate(KeyId),
    /// Delete an inactive key to free a slot.
    DeleteOldestInactive(KeyId),
    /// Issue a new active key.
    CreateNew,
}

/// Ordered mutations for one identity in one pass.
///
/// Always `[Deactivate?, DeleteOldestInactive?, CreateNew]`. Plans are
/// transient: they are rebuilt from the live key set on every pass and never
/// stored or replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    actions: Vec<Action>,
}

impl ActionPlan {
    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Key the plan deactivates, if any. Becomes the record's old key.
    pub fn deactivation_target(&self) -> Option<&KeyId> {
        self.actions.iter().find_map(|action| match action {
            Action::Deactivate(id) => Some(id),
            _ => None,
        })
    }

    /// Key the plan deletes to free a slot, if any.
    pub fn deletion_target(&self) -> Option<&KeyId> {
        self.actions.iter().find_map(|action| match action {
            Action::DeleteOldestInactive(id) => Some(id),
            _ => None,
        })
    }
}

impl IntoIterator for ActionPlan {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

/// The identity holds more keys than a rotation can make room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotUnavailable {
    /// Keys observed on the identity.
    pub key_count: usize,
}

/// Creation time first, key id second: a total, deterministic order.
fn by_age(a: &&AccessKey, b: &&AccessKey) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Compute the rotation plan for one identity's key snapshot.
///
/// 1. The newest active key is deactivated. Additional active keys on an
///    already anomalous identity are left alone.
/// 2. With the deactivation applied to the snapshot, a full identity frees a
///    slot by deleting its oldest inactive key. Keys that were already
///    inactive are preferred; the key deactivated in step 1 is only chosen
///    when it is the sole inactive key.
/// 3. A new key is created.
///
/// Fails with [`SlotUnavailable`] when creating a key would still break the
/// two-key ceiling after step 2. A failed plan must not be partially applied.
pub fn plan_rotation(keys: &[AccessKey]) -> Result<ActionPlan, SlotUnavailable> {
    let mut actions = Vec::with_capacity(3);

    let deactivated = keys.iter().filter(|k| k.status.is_active()).max_by(by_age);
    if let Some(key) = deactivated {
        actions.push(Action::Deactivate(key.id.clone()));
    }

    let mut remaining = keys.len();
    if remaining >= MAX_KEYS_PER_IDENTITY {
        let victim = keys
            .iter()
            .filter(|k| !k.status.is_active())
            .min_by(by_age)
            .or(deactivated);

        match victim {
            Some(key) => {
                actions.push(Action::DeleteOldestInactive(key.id.clone()));
                remaining -= 1;
            }
            None => {
                return Err(SlotUnavailable {
                    key_count: keys.len(),
                });
            }
        }
    }

    if remaining >= MAX_KEYS_PER_IDENTITY {
        return Err(SlotUnavailable {
            key_count: keys.len(),
        });
    }

    actions.push(Action::CreateNew);
    Ok(ActionPlan { actions })
}
