//! Group symmetric-key lifecycle.
//!
//! A group owns one symmetric key at a time, identified by `key_version`.
//! Every member holds a [`GroupKeyGrant`]: the current key wrapped under
//! their public encryption key. Rotation generates a new key, bumps the
//! version, and issues fresh grants to every remaining member; superseded
//! grants stay stored so old messages remain readable, and the read path
//! filters by the exact version a message was encrypted under.
//!
//! Group state is shared across requests, so every mutation is a
//! read-modify-write guarded by a compare-and-swap on `key_version`
//! ([`Storage::update_group`]) with a bounded retry loop. Two concurrent
//! rotations can never both advance from the same version.

use rand::rngs::OsRng;
use sealgram_crypto::{SymmetricKey, keywrap};
use std::collections::BTreeSet;
use x25519_dalek::StaticSecret;

use crate::{
    config::CoreConfig,
    directory::{AuthContext, UserDirectory},
    error::CoreError,
    record::{Group, GroupId, GroupKeyGrant, UserId},
    storage::{Storage, StorageError},
    time::now_ms,
};

/// Owns the lifecycle of group symmetric keys: creation, per-member
/// wrapped-key distribution, versioned rotation, and removal with forced
/// rotation.
#[derive(Clone)]
pub struct GroupKeyManager<S, D> {
    storage: S,
    directory: D,
    retry_limit: u32,
}

impl<S: Storage, D: UserDirectory> GroupKeyManager<S, D> {
    /// Create a manager over the given collaborators.
    pub fn new(storage: S, directory: D, config: &CoreConfig) -> Self {
        Self { storage, directory, retry_limit: config.mutation_retry_limit }
    }

    /// Create a group with the caller as sole member and admin.
    ///
    /// Generates a fresh symmetric key at version 1 and issues the admin's
    /// grant.
    pub fn create_group(&self, actor: &AuthContext, name: &str) -> Result<Group, CoreError> {
        let admin_public = self.directory.public_keys(&actor.user_id)?;

        let mut rng = OsRng;
        let group_id = GroupId::random(&mut rng);
        let key = SymmetricKey::generate(&mut rng);
        let now = now_ms();

        let group = Group {
            id: group_id.clone(),
            name: name.to_owned(),
            admin_id: actor.user_id.clone(),
            members: BTreeSet::from([actor.user_id.clone()]),
            key_version: 1,
            created_at_ms: now,
            last_activity_ms: now,
        };
        self.storage.create_group(&group)?;

        let wrapped = keywrap::wrap_key(&key, &admin_public.encryption, &mut rng);
        self.storage.put_grant(&GroupKeyGrant {
            group_id: group_id.clone(),
            user_id: actor.user_id.clone(),
            key_version: 1,
            wrapped_key: wrapped.into_bytes(),
            granted_at_ms: now,
        })?;

        tracing::info!(group_id = %group_id, admin = %actor.user_id, "group created");

        Ok(group)
    }

    /// Add a member, sharing the current key with them.
    ///
    /// Admin-only. The current key is recovered through the admin's own
    /// grant (requiring the admin's private key) and re-wrapped for the new
    /// member at the current version; membership changes do not rotate.
    pub fn add_member(
        &self,
        actor: &AuthContext,
        group_id: &GroupId,
        new_member: &UserId,
    ) -> Result<(), CoreError> {
        let mut rng = OsRng;

        for _ in 0..=self.retry_limit {
            let group = self.load(group_id)?;
            require_admin(&group, actor, "add_member")?;
            if group.is_member(new_member) {
                return Err(CoreError::AlreadyMember {
                    group_id: group_id.to_string(),
                    user_id: new_member.to_string(),
                });
            }

            let member_public = self.directory.public_keys(new_member)?;
            let actor_keys = self.directory.private_keys(&actor.user_id)?;
            let key = self.key_for_version(
                group_id,
                &actor.user_id,
                group.key_version,
                actor_keys.encryption_secret(),
            )?;

            let now = now_ms();
            let wrapped = keywrap::wrap_key(&key, &member_public.encryption, &mut rng);
            self.storage.put_grant(&GroupKeyGrant {
                group_id: group_id.clone(),
                user_id: new_member.clone(),
                key_version: group.key_version,
                wrapped_key: wrapped.into_bytes(),
                granted_at_ms: now,
            })?;

            let mut updated = group.clone();
            updated.members.insert(new_member.clone());
            updated.last_activity_ms = now;

            match self.storage.update_group(&updated, group.key_version) {
                Ok(()) => {
                    tracing::info!(
                        group_id = %group_id,
                        user = %new_member,
                        key_version = group.key_version,
                        "member added"
                    );
                    return Ok(());
                },
                Err(StorageError::VersionConflict { .. }) => {
                    tracing::debug!(group_id = %group_id, "add_member conflicted, retrying");
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(CoreError::MutationConflict {
            group_id: group_id.to_string(),
            attempts: self.retry_limit + 1,
        })
    }

    /// Remove a member and unconditionally rotate the key.
    ///
    /// Admin-only; the admin cannot be removed. Removal without rotation
    /// would leave the removed member's cached key valid for future
    /// messages, so both happen as one atomic unit under a single
    /// compare-and-swap.
    pub fn remove_member(
        &self,
        actor: &AuthContext,
        group_id: &GroupId,
        member: &UserId,
    ) -> Result<(), CoreError> {
        for _ in 0..=self.retry_limit {
            let group = self.load(group_id)?;
            require_admin(&group, actor, "remove_member")?;
            if !group.is_member(member) {
                return Err(CoreError::NotAMember {
                    group_id: group_id.to_string(),
                    user_id: member.to_string(),
                });
            }
            if member == &group.admin_id {
                return Err(CoreError::CannotRemoveAdmin { group_id: group_id.to_string() });
            }

            let mut updated = group.clone();
            updated.members.remove(member);

            match self.rotate_once(updated, group.key_version) {
                Ok(new_version) => {
                    tracing::info!(
                        group_id = %group_id,
                        user = %member,
                        key_version = new_version,
                        "member removed, key rotated"
                    );
                    return Ok(());
                },
                Err(CoreError::Storage(StorageError::VersionConflict { .. })) => {
                    tracing::debug!(group_id = %group_id, "remove_member conflicted, retrying");
                },
                Err(err) => return Err(err),
            }
        }

        Err(CoreError::MutationConflict {
            group_id: group_id.to_string(),
            attempts: self.retry_limit + 1,
        })
    }

    /// Rotate the group key: new symmetric key, `key_version + 1`, fresh
    /// grants for every current member.
    ///
    /// Admin-only. Returns the new key version.
    pub fn rotate_key(&self, actor: &AuthContext, group_id: &GroupId) -> Result<u32, CoreError> {
        for _ in 0..=self.retry_limit {
            let group = self.load(group_id)?;
            require_admin(&group, actor, "rotate_key")?;

            match self.rotate_once(group.clone(), group.key_version) {
                Ok(new_version) => {
                    tracing::info!(group_id = %group_id, key_version = new_version, "key rotated");
                    return Ok(new_version);
                },
                Err(CoreError::Storage(StorageError::VersionConflict { .. })) => {
                    tracing::debug!(group_id = %group_id, "rotate_key conflicted, retrying");
                },
                Err(err) => return Err(err),
            }
        }

        Err(CoreError::MutationConflict {
            group_id: group_id.to_string(),
            attempts: self.retry_limit + 1,
        })
    }

    /// One rotation attempt over a group snapshot.
    ///
    /// Grants for the new version are written for every member *before* the
    /// version is advanced in storage: a partial failure leaves the old
    /// version current and nobody locked out of a key they never received.
    /// The final compare-and-swap publishes the new version (and any
    /// membership change carried in `group`) atomically.
    fn rotate_once(&self, mut group: Group, expected_version: u32) -> Result<u32, CoreError> {
        let mut rng = OsRng;
        let key = SymmetricKey::generate(&mut rng);
        let new_version = expected_version + 1;
        let now = now_ms();

        for member in &group.members {
            let member_public = self.directory.public_keys(member)?;
            let wrapped = keywrap::wrap_key(&key, &member_public.encryption, &mut rng);
            self.storage.put_grant(&GroupKeyGrant {
                group_id: group.id.clone(),
                user_id: member.clone(),
                key_version: new_version,
                wrapped_key: wrapped.into_bytes(),
                granted_at_ms: now,
            })?;
        }

        group.key_version = new_version;
        group.last_activity_ms = now;
        self.storage.update_group(&group, expected_version)?;

        Ok(new_version)
    }

    /// Recover the group key from the caller's most recent grant.
    ///
    /// Fails with `NotAMember` if the user holds no grant at all.
    pub fn key_for_user(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        user_secret: &StaticSecret,
    ) -> Result<(SymmetricKey, u32), CoreError> {
        let grants = self.storage.grants_for_user(group_id, user_id)?;
        let grant = grants.first().ok_or_else(|| CoreError::NotAMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        })?;

        let key = unwrap_grant(grant, user_secret)?;
        tracing::debug!(
            group_id = %group_id,
            user = %user_id,
            key_version = grant.key_version,
            "resolved group key"
        );
        Ok((key, grant.key_version))
    }

    /// Recover the group key of one specific generation.
    ///
    /// Fails with `KeyVersionUnavailable` when the user holds grants but
    /// none for this generation (rotated away before they joined, or after
    /// they were removed), and `NotAMember` when they hold none at all.
    pub fn key_for_version(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        version: u32,
        user_secret: &StaticSecret,
    ) -> Result<SymmetricKey, CoreError> {
        let grants = self.storage.grants_for_user(group_id, user_id)?;
        if grants.is_empty() {
            return Err(CoreError::NotAMember {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let grant = grants
            .iter()
            .find(|g| g.key_version == version)
            .ok_or(CoreError::KeyVersionUnavailable { required: version })?;

        unwrap_grant(grant, user_secret)
    }

    /// Group metadata, visible to members only.
    pub fn group_info(&self, actor: &AuthContext, group_id: &GroupId) -> Result<Group, CoreError> {
        let group = self.load(group_id)?;
        if !group.is_member(&actor.user_id) {
            return Err(CoreError::NotAMember {
                group_id: group_id.to_string(),
                user_id: actor.user_id.to_string(),
            });
        }
        Ok(group)
    }

    /// All groups the caller is currently a member of, oldest first.
    pub fn list_groups(&self, actor: &AuthContext) -> Result<Vec<Group>, CoreError> {
        let mut groups: Vec<Group> = self
            .storage
            .list_groups()?
            .into_iter()
            .filter(|g| g.is_member(&actor.user_id))
            .collect();
        groups.sort_by_key(|g| (g.created_at_ms, g.id.clone()));
        Ok(groups)
    }

    fn load(&self, group_id: &GroupId) -> Result<Group, CoreError> {
        self.storage
            .load_group(group_id)?
            .ok_or_else(|| CoreError::NotFound { kind: "group", id: group_id.to_string() })
    }
}

fn require_admin(group: &Group, actor: &AuthContext, action: &'static str) -> Result<(), CoreError> {
    if actor.user_id == group.admin_id {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied { action })
    }
}

fn unwrap_grant(grant: &GroupKeyGrant, user_secret: &StaticSecret) -> Result<SymmetricKey, CoreError> {
    let wrapped = keywrap::WrappedKey::from_bytes(grant.wrapped_key.clone())
        .map_err(|_| CoreError::KeyUnwrapFailure)?;
    Ok(keywrap::unwrap_key(&wrapped, user_secret)?)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;
    use crate::{directory::InMemoryDirectory, storage::MemoryStorage};

    struct Fixture {
        manager: GroupKeyManager<MemoryStorage, InMemoryDirectory>,
        storage: MemoryStorage,
        directory: InMemoryDirectory,
    }

    fn fixture(users: &[&str]) -> Fixture {
        let storage = MemoryStorage::new();
        let directory = InMemoryDirectory::new();
        for user in users {
            directory.register(UserId::from(*user), &mut OsRng).unwrap();
        }
        let manager =
            GroupKeyManager::new(storage.clone(), directory.clone(), &CoreConfig::default());
        Fixture { manager, storage, directory }
    }

    fn ctx(user: &str) -> AuthContext {
        AuthContext::new(UserId::from(user))
    }

    fn user_secret(directory: &InMemoryDirectory, user: &str) -> StaticSecret {
        directory.private_keys(&UserId::from(user)).unwrap().encryption_secret().clone()
    }

    #[test]
    fn create_group_starts_at_version_one() {
        let f = fixture(&["alice"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        assert_eq!(group.key_version, 1);
        assert!(group.is_member(&UserId::from("alice")));
        assert_eq!(group.admin_id, UserId::from("alice"));
        assert_eq!(f.storage.grant_count(), 1);
    }

    #[test]
    fn admin_can_recover_key_from_own_grant() {
        let f = fixture(&["alice"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        let secret = user_secret(&f.directory, "alice");
        let (_, version) = f.manager.key_for_user(&group.id, &UserId::from("alice"), &secret).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn added_member_shares_the_existing_key() {
        let f = fixture(&["alice", "bob"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        let alice_key = f
            .manager
            .key_for_user(&group.id, &UserId::from("alice"), &user_secret(&f.directory, "alice"))
            .unwrap();
        let bob_key = f
            .manager
            .key_for_user(&group.id, &UserId::from("bob"), &user_secret(&f.directory, "bob"))
            .unwrap();

        assert_eq!(alice_key.0.as_bytes(), bob_key.0.as_bytes());
        assert_eq!(bob_key.1, 1, "membership change must not bump the version");

        let reloaded = f.storage.load_group(&group.id).unwrap().unwrap();
        assert_eq!(reloaded.key_version, 1);
        assert!(reloaded.is_member(&UserId::from("bob")));
    }

    #[test]
    fn only_admin_may_mutate() {
        let f = fixture(&["alice", "bob", "carol"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        let denied = f.manager.add_member(&ctx("bob"), &group.id, &UserId::from("carol"));
        assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));

        let denied = f.manager.rotate_key(&ctx("bob"), &group.id);
        assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));

        let denied = f.manager.remove_member(&ctx("bob"), &group.id, &UserId::from("alice"));
        assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));
    }

    #[test]
    fn duplicate_add_rejected() {
        let f = fixture(&["alice", "bob"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        let result = f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob"));
        assert!(matches!(result, Err(CoreError::AlreadyMember { .. })));
    }

    #[test]
    fn admin_cannot_be_removed() {
        let f = fixture(&["alice"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        let result = f.manager.remove_member(&ctx("alice"), &group.id, &UserId::from("alice"));
        assert!(matches!(result, Err(CoreError::CannotRemoveAdmin { .. })));
    }

    #[test]
    fn rotation_bumps_version_and_changes_key() {
        let f = fixture(&["alice", "bob"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        let secret = user_secret(&f.directory, "alice");
        let (old_key, _) = f.manager.key_for_user(&group.id, &UserId::from("alice"), &secret).unwrap();

        let new_version = f.manager.rotate_key(&ctx("alice"), &group.id).unwrap();
        assert_eq!(new_version, 2);

        let (new_key, version) =
            f.manager.key_for_user(&group.id, &UserId::from("alice"), &secret).unwrap();
        assert_eq!(version, 2);
        assert_ne!(old_key.as_bytes(), new_key.as_bytes());
    }

    #[test]
    fn rotation_grants_every_member_exactly_once() {
        let f = fixture(&["alice", "bob", "carol"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("carol")).unwrap();

        f.manager.rotate_key(&ctx("alice"), &group.id).unwrap();

        for user in ["alice", "bob", "carol"] {
            let grants =
                f.storage.grants_for_user(&group.id, &UserId::from(user)).unwrap();
            let at_v2: Vec<_> = grants.iter().filter(|g| g.key_version == 2).collect();
            assert_eq!(at_v2.len(), 1, "{user} must hold exactly one grant at version 2");
        }
    }

    #[test]
    fn removed_member_keeps_old_grant_but_not_new() {
        let f = fixture(&["alice", "bob"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        f.manager.add_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        f.manager.remove_member(&ctx("alice"), &group.id, &UserId::from("bob")).unwrap();

        let reloaded = f.storage.load_group(&group.id).unwrap().unwrap();
        assert_eq!(reloaded.key_version, 2, "removal must force a rotation");
        assert!(!reloaded.is_member(&UserId::from("bob")));

        let bob_secret = user_secret(&f.directory, "bob");
        // Old generation still resolves (pre-removal history stays readable).
        f.manager.key_for_version(&group.id, &UserId::from("bob"), 1, &bob_secret).unwrap();

        // The rotated generation does not.
        let result = f.manager.key_for_version(&group.id, &UserId::from("bob"), 2, &bob_secret);
        assert!(matches!(result, Err(CoreError::KeyVersionUnavailable { required: 2 })));
    }

    #[test]
    fn stranger_gets_not_a_member() {
        let f = fixture(&["alice", "mallory"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        let mallory_secret = user_secret(&f.directory, "mallory");
        let result = f.manager.key_for_user(&group.id, &UserId::from("mallory"), &mallory_secret);
        assert!(matches!(result, Err(CoreError::NotAMember { .. })));

        let result = f.manager.group_info(&ctx("mallory"), &group.id);
        assert!(matches!(result, Err(CoreError::NotAMember { .. })));
    }

    #[test]
    fn unknown_group_is_not_found() {
        let f = fixture(&["alice"]);
        let result = f.manager.rotate_key(&ctx("alice"), &GroupId::from("missing"));
        assert!(matches!(result, Err(CoreError::NotFound { kind: "group", .. })));
    }

    #[test]
    fn list_groups_filters_by_membership() {
        let f = fixture(&["alice", "bob"]);
        let first = f.manager.create_group(&ctx("alice"), "ops").unwrap();
        let _second = f.manager.create_group(&ctx("bob"), "private").unwrap();
        f.manager.add_member(&ctx("alice"), &first.id, &UserId::from("bob")).unwrap();

        let alice_groups = f.manager.list_groups(&ctx("alice")).unwrap();
        assert_eq!(alice_groups.len(), 1);
        assert_eq!(alice_groups[0].id, first.id);

        let bob_groups = f.manager.list_groups(&ctx("bob")).unwrap();
        assert_eq!(bob_groups.len(), 2);
    }

    #[test]
    fn wrong_private_key_cannot_unwrap_grant() {
        let f = fixture(&["alice", "bob"]);
        let group = f.manager.create_group(&ctx("alice"), "ops").unwrap();

        let bob_secret = user_secret(&f.directory, "bob");
        let result = f.manager.key_for_version(&group.id, &UserId::from("alice"), 1, &bob_secret);
        assert!(matches!(result, Err(CoreError::KeyUnwrapFailure)));
    }
}
