//! In-memory index of users, models and archives.
//!
//! All three maps and their id counters sit behind one reader/writer lock.
//! Reads take the read lock; every mutation, counter bumps included, holds
//! the write lock for its whole critical section. Callers must never hold a
//! guard across blob or relational I/O, so no method here is async.

use crate::error::{Result, VaultError};
use crate::models::{Archive, Model, ModelDraft, ModelView, Role, User};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Which existing entries make a discovered file count as already indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceScope {
    /// Any model with the same file name, whatever its directory.
    AnyDirectory,
    /// A model with the same file name inside this archive.
    Archive(u64),
}

struct IndexState {
    users: HashMap<u64, User>,
    models: HashMap<u64, Model>,
    archives: HashMap<u64, Archive>,
    next_user_id: u64,
    next_model_id: u64,
    next_archive_id: u64,
}

impl Default for IndexState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            models: HashMap::new(),
            archives: HashMap::new(),
            next_user_id: 1,
            next_model_id: 1,
            next_archive_id: 1,
        }
    }
}

impl IndexState {
    /// Assign an id to a new model, adopting `external_id` when it does not
    /// move the counter backwards.
    fn assign_model_id(&mut self, external_id: Option<u64>) -> u64 {
        let assigned = match external_id {
            Some(id) if id >= self.next_model_id => id,
            _ => self.next_model_id,
        };
        self.next_model_id = self.next_model_id.max(assigned + 1);
        assigned
    }

    fn archive_named(&self, name: &str) -> Option<&Archive> {
        self.archives.values().find(|a| a.name == name)
    }
}

/// Authoritative-for-serving view of the registry.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic inside a critical section never leaves the maps half-updated,
    // so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================
    // Users
    // ========================================

    /// Register an account. Emails are unique.
    pub fn insert_user(&self, email: &str, credential_hash: String, role: Role) -> Result<User> {
        let mut state = self.write();

        if state.users.values().any(|u| u.email == email) {
            return Err(VaultError::Conflict {
                message: format!("Email already exists: {}", email),
            });
        }

        let now = Utc::now();
        let user = User {
            id: state.next_user_id,
            email: email.to_string(),
            credential_hash,
            role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        state.next_user_id += 1;

        debug!("Registered user {} ({})", user.id, user.role);
        Ok(user)
    }

    pub fn user(&self, id: u64) -> Option<User> {
        self.read().users.get(&id).cloned()
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.read().users.values().find(|u| u.email == email).cloned()
    }

    // ========================================
    // Models
    // ========================================

    /// Insert a model, reconciling its id with an externally generated one.
    ///
    /// The counter only ever moves forward: afterwards it is at least
    /// `assigned + 1`.
    pub fn insert_model(&self, draft: ModelDraft, external_id: Option<u64>) -> Model {
        let mut state = self.write();
        let id = state.assign_model_id(external_id);
        let model = draft.into_model(id);
        state.models.insert(id, model.clone());
        model
    }

    /// Insert a model discovered on disk unless its file is already indexed.
    ///
    /// The presence check and the insert happen under one write lock.
    pub fn insert_model_unless_present(
        &self,
        draft: ModelDraft,
        scope: PresenceScope,
    ) -> Option<Model> {
        let mut state = self.write();

        let present = state.models.values().any(|m| {
            m.file_name == draft.file_name
                && match scope {
                    PresenceScope::AnyDirectory => true,
                    PresenceScope::Archive(id) => m.archive_id == Some(id),
                }
        });
        if present {
            return None;
        }

        let id = state.assign_model_id(None);
        let model = draft.into_model(id);
        state.models.insert(id, model.clone());
        Some(model)
    }

    pub fn model(&self, id: u64) -> Option<Model> {
        self.read().models.get(&id).cloned()
    }

    pub fn remove_model(&self, id: u64) -> Option<Model> {
        self.write().models.remove(&id)
    }

    /// Models joined with uploader emails, optionally confined to one archive,
    /// ordered by id.
    pub fn list_models(&self, archive_id: Option<u64>) -> Vec<ModelView> {
        let state = self.read();

        let mut views: Vec<ModelView> = state
            .models
            .values()
            .filter(|m| archive_id.is_none() || m.archive_id == archive_id)
            .map(|m| {
                let email = m
                    .uploaded_by
                    .and_then(|uid| state.users.get(&uid))
                    .map(|u| u.email.clone());
                ModelView::new(m, email)
            })
            .collect();

        views.sort_by_key(|v| v.id);
        views
    }

    pub fn model_count(&self) -> usize {
        self.read().models.len()
    }

    /// Id the next model will receive absent an adopted external id.
    pub fn next_model_id(&self) -> u64 {
        self.read().next_model_id
    }

    // ========================================
    // Archives
    // ========================================

    /// Register a new archive. Names and tokens must both be unused.
    pub fn insert_archive(&self, name: &str, token: String) -> Result<Archive> {
        let mut state = self.write();

        if state.archive_named(name).is_some() {
            return Err(VaultError::Conflict {
                message: format!("Archive already exists: {}", name),
            });
        }
        if state.archives.values().any(|a| a.token == token) {
            return Err(VaultError::Conflict {
                message: "Archive token collision".to_string(),
            });
        }

        let archive = Archive {
            id: state.next_archive_id,
            name: name.to_string(),
            token,
            created_at: Utc::now(),
        };
        state.archives.insert(archive.id, archive.clone());
        state.next_archive_id += 1;

        debug!("Registered archive {} ({})", archive.id, archive.name);
        Ok(archive)
    }

    pub fn archive(&self, id: u64) -> Option<Archive> {
        self.read().archives.get(&id).cloned()
    }

    pub fn archive_by_name(&self, name: &str) -> Option<Archive> {
        self.read().archive_named(name).cloned()
    }

    /// Find the archive holding `token`.
    ///
    /// Every archive is compared in constant time so the scan does not leak
    /// how much of a token matched.
    pub fn archive_by_token(&self, token: &str) -> Option<Archive> {
        let state = self.read();
        let mut found = None;
        for archive in state.archives.values() {
            if constant_time_eq(archive.token.as_bytes(), token.as_bytes()) {
                found = Some(archive.clone());
            }
        }
        found
    }

    /// Every archive with the number of models it holds, ordered by id.
    pub fn list_archives(&self) -> Vec<(Archive, usize)> {
        let state = self.read();

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for model in state.models.values() {
            if let Some(aid) = model.archive_id {
                *counts.entry(aid).or_default() += 1;
            }
        }

        let mut archives: Vec<(Archive, usize)> = state
            .archives
            .values()
            .map(|a| (a.clone(), counts.get(&a.id).copied().unwrap_or(0)))
            .collect();
        archives.sort_by_key(|(a, _)| a.id);
        archives
    }

    /// Remove every model that belongs to `archive_id`, returning them.
    pub fn remove_archive_models(&self, archive_id: u64) -> Vec<Model> {
        let mut state = self.write();
        let ids: Vec<u64> = state
            .models
            .values()
            .filter(|m| m.archive_id == Some(archive_id))
            .map(|m| m.id)
            .collect();

        let mut removed: Vec<Model> = ids
            .into_iter()
            .filter_map(|id| state.models.remove(&id))
            .collect();
        removed.sort_by_key(|m| m.id);
        removed
    }

    /// Remove an archive entry together with any models still pointing at it.
    pub fn remove_archive(&self, archive_id: u64) -> Option<(Archive, Vec<Model>)> {
        let mut state = self.write();
        let archive = state.archives.remove(&archive_id)?;

        let stragglers: Vec<u64> = state
            .models
            .values()
            .filter(|m| m.archive_id == Some(archive_id))
            .map(|m| m.id)
            .collect();
        let removed = stragglers
            .into_iter()
            .filter_map(|id| state.models.remove(&id))
            .collect();

        Some((archive, removed))
    }

    pub fn archive_count(&self) -> usize {
        self.read().archives.len()
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn draft(file_name: &str, archive_id: Option<u64>) -> ModelDraft {
        ModelDraft {
            name: file_name.to_string(),
            description: String::new(),
            file_name: file_name.to_string(),
            file_url: format!("/uploads/{}", file_name),
            file_size: 1,
            archive_id,
            uploaded_by: Some(1),
        }
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let index = MemoryIndex::new();
        let admin = index
            .insert_user("admin@test.com", "h".into(), Role::Admin)
            .unwrap();
        assert_eq!(admin.id, 1);

        let err = index
            .insert_user("admin@test.com", "h2".into(), Role::User)
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));

        let user = index
            .insert_user("user@test.com", "h".into(), Role::User)
            .unwrap();
        assert_eq!(user.id, 2);
    }

    #[test]
    fn test_model_id_adoption() {
        let index = MemoryIndex::new();

        // No external id: counter drives assignment
        assert_eq!(index.insert_model(draft("a.glb", None), None).id, 1);

        // External id ahead of the counter is adopted and the counter jumps
        assert_eq!(index.insert_model(draft("b.glb", None), Some(10)).id, 10);
        assert_eq!(index.next_model_id(), 11);

        // External id behind the counter is ignored
        assert_eq!(index.insert_model(draft("c.glb", None), Some(3)).id, 11);
        assert_eq!(index.next_model_id(), 12);
    }

    #[test]
    fn test_insert_unless_present_scopes() {
        let index = MemoryIndex::new();
        index.insert_model(draft("x.glb", Some(1)), None);

        // Same file name in a different archive is a different model
        assert!(index
            .insert_model_unless_present(draft("x.glb", Some(2)), PresenceScope::Archive(2))
            .is_some());
        // Same archive: already present
        assert!(index
            .insert_model_unless_present(draft("x.glb", Some(1)), PresenceScope::Archive(1))
            .is_none());
        // Unscoped matching ignores the directory
        assert!(index
            .insert_model_unless_present(draft("x.glb", None), PresenceScope::AnyDirectory)
            .is_none());
        assert_eq!(index.model_count(), 2);
    }

    #[test]
    fn test_list_models_filter_and_uploader_join() {
        let index = MemoryIndex::new();
        index
            .insert_user("admin@test.com", "h".into(), Role::Admin)
            .unwrap();

        index.insert_model(draft("a.glb", None), None);
        let mut orphan = draft("b.glb", Some(7));
        orphan.uploaded_by = Some(99);
        index.insert_model(orphan, None);

        let all = index.list_models(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].uploaded_by.as_deref(), Some("admin@test.com"));
        assert_eq!(all[1].uploaded_by, None);

        let scoped = index.list_models(Some(7));
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].file_name, "b.glb");
    }

    #[test]
    fn test_archive_uniqueness_and_token_lookup() {
        let index = MemoryIndex::new();
        let a = index.insert_archive("Lab_A", "tok-a".into()).unwrap();

        assert!(index.insert_archive("Lab_A", "tok-b".into()).is_err());
        assert!(index.insert_archive("Lab_B", "tok-a".into()).is_err());

        assert_eq!(index.archive_by_token("tok-a").map(|x| x.id), Some(a.id));
        assert!(index.archive_by_token("tok-").is_none());
        assert!(index.archive_by_token("").is_none());
    }

    #[test]
    fn test_remove_archive_cascades() {
        let index = MemoryIndex::new();
        let a = index.insert_archive("Lab_A", "t".into()).unwrap();
        index.insert_model(draft("1.glb", Some(a.id)), None);
        index.insert_model(draft("2.glb", Some(a.id)), None);
        index.insert_model(draft("3.glb", None), None);

        assert_eq!(index.list_archives()[0].1, 2);

        let removed = index.remove_archive_models(a.id);
        assert_eq!(removed.len(), 2);

        // A model that slipped in afterwards is swept with the archive
        index.insert_model(draft("late.glb", Some(a.id)), None);
        let (archive, stragglers) = index.remove_archive(a.id).unwrap();
        assert_eq!(archive.name, "Lab_A");
        assert_eq!(stragglers.len(), 1);

        assert_eq!(index.model_count(), 1);
        assert_eq!(index.archive_count(), 0);
        assert!(index.remove_archive(a.id).is_none());
    }

    #[test]
    fn test_concurrent_inserts_get_unique_ids() {
        let index = Arc::new(MemoryIndex::new());
        let handles: Vec<_> = (0..16)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            index
                                .insert_model(draft(&format!("{}-{}.glb", t, i), None), None)
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(index.next_model_id(), 401);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
