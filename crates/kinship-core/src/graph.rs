use crate::error::{KinshipError, Result};
use crate::user::{NewUser, User};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// How `create_user` derives the id of a new user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Counter that only grows; ids are never handed out twice.
    #[default]
    Monotonic,
    /// `population + 1`. After a delete this can repeat the id of a live
    /// user, and the new record replaces it.
    PopulationSize,
}

impl FromStr for IdPolicy {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monotonic" => Ok(IdPolicy::Monotonic),
            "population" | "population_size" => Ok(IdPolicy::PopulationSize),
            other => Err(KinshipError::Validation(format!(
                "unknown id policy '{other}'"
            ))),
        }
    }
}

#[derive(Default)]
struct Registry {
    users: HashMap<String, User>,
    issued: u64,
}

/// In-memory friendship graph. Every operation runs under one exclusive
/// lock, so friend lists on both sides of an edge always change together.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct UserGraph {
    inner: Arc<Mutex<Registry>>,
    policy: IdPolicy,
}

impl UserGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: IdPolicy) -> Self {
        Self {
            inner: Arc::default(),
            policy,
        }
    }

    pub fn policy(&self) -> IdPolicy {
        self.policy
    }

    /// Insert a user and return the id assigned to it. A friend list given
    /// at creation is stored as-is.
    pub fn create_user(&self, input: NewUser) -> String {
        let mut reg = self.inner.lock();
        let id = match self.policy {
            IdPolicy::Monotonic => {
                reg.issued += 1;
                reg.issued
            }
            IdPolicy::PopulationSize => reg.users.len() as u64 + 1,
        }
        .to_string();
        if reg.users.contains_key(&id) {
            tracing::warn!(%id, "id reused, replacing existing user");
        }
        let user = User {
            id: id.clone(),
            name: input.name,
            age: input.age,
            friends: input.friends.unwrap_or_default(),
        };
        reg.users.insert(id.clone(), user);
        tracing::debug!(%id, "user created");
        id
    }

    /// Record a friendship on both sides and return both names.
    ///
    /// Both ids are checked before either list is touched. Repeating a call
    /// appends again; linking a user to itself appends its id twice.
    pub fn make_friends(&self, source_id: &str, target_id: &str) -> Result<(String, String)> {
        let mut reg = self.inner.lock();
        if !reg.users.contains_key(source_id) || !reg.users.contains_key(target_id) {
            return Err(KinshipError::NotFound("one of the users".into()));
        }
        let source_name = {
            let source = reg
                .users
                .get_mut(source_id)
                .ok_or_else(|| missing(source_id))?;
            source.friends.push(target_id.to_string());
            source.name.clone()
        };
        let target = reg
            .users
            .get_mut(target_id)
            .ok_or_else(|| missing(target_id))?;
        target.friends.push(source_id.to_string());
        let target_name = target.name.clone();
        tracing::debug!(source = source_id, target = target_id, "friendship added");
        Ok((source_name, target_name))
    }

    /// Remove a user and return its name. The first occurrence of its id is
    /// dropped from every remaining friend list before the lock is released.
    pub fn delete_user(&self, id: &str) -> Result<String> {
        let mut reg = self.inner.lock();
        let user = reg.users.remove(id).ok_or_else(|| missing(id))?;
        let mut purged = 0usize;
        for other in reg.users.values_mut() {
            if let Some(pos) = other.friends.iter().position(|f| f == id) {
                other.friends.remove(pos);
                purged += 1;
            }
        }
        tracing::debug!(%id, purged, "user deleted");
        Ok(user.name)
    }

    /// Friend ids in insertion order, duplicates included.
    pub fn friends(&self, id: &str) -> Result<Vec<String>> {
        let reg = self.inner.lock();
        reg.users
            .get(id)
            .map(|u| u.friends.clone())
            .ok_or_else(|| missing(id))
    }

    pub fn update_age(&self, id: &str, age: impl Into<String>) -> Result<()> {
        let mut reg = self.inner.lock();
        let user = reg.users.get_mut(id).ok_or_else(|| missing(id))?;
        user.age = age.into();
        tracing::debug!(%id, age = %user.age, "age updated");
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        let reg = self.inner.lock();
        reg.users.get(id).cloned().ok_or_else(|| missing(id))
    }

    /// Snapshot of every user ordered by numeric id.
    pub fn users(&self) -> Vec<User> {
        let reg = self.inner.lock();
        let mut out: Vec<User> = reg.users.values().cloned().collect();
        out.sort_by_key(|u| (u.id.parse::<u64>().ok(), u.id.clone()));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn missing(id: &str) -> KinshipError {
    KinshipError::NotFound(format!("user {id}"))
}
