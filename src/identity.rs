//! Identity and hierarchy store: roles, users, profiles, permission sets
//! and permission set groups, with referential-integrity checks and the
//! cascades each delete carries.

use tracing::debug;

use crate::db::Store;
use crate::error::{err, invalid, missing, Result};
use crate::model::{
    PermissionSet, PermissionSetGroup, Principal, Profile, Role, ShareTarget, User,
};
use crate::perms::purge_principal_state;
use crate::sharing::drop_rules_targeting;
use crate::tx::Tx;

fn push_unique(v: &mut Vec<u64>, id: u64) {
    if !v.contains(&id) {
        v.push(id);
    }
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid(format!("{} name is required", what)));
    }
    Ok(name.to_string())
}

fn role_exists(tx: &Tx, id: u64) -> Result<()> {
    tx.dbs
        .roles
        .get(&tx.txn, &id)
        .map_err(err)?
        .map(|_| ())
        .ok_or_else(|| missing("role", id))
}

impl Store {
    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub fn create_role(&self, name: &str, parent_id: Option<u64>) -> Result<Role> {
        let name = require_name(name, "role")?;
        self.transact(|tx| {
            if let Some(p) = parent_id {
                role_exists(tx, p)?;
            }
            let id = tx.alloc_id()?;
            let role = Role {
                id,
                name: name.clone(),
                parent_id,
            };
            tx.dbs.roles.put(&mut tx.txn, &id, &role).map_err(err)?;
            Ok(role)
        })
    }

    /// Replace a role's name and parent. Re-parenting is cycle-checked.
    pub fn update_role(&self, id: u64, name: &str, parent_id: Option<u64>) -> Result<Role> {
        let name = require_name(name, "role")?;
        self.transact(|tx| {
            role_exists(tx, id)?;
            if let Some(p) = parent_id {
                role_exists(tx, p)?;
            }
            tx.check_role_cycle(id, parent_id)?;
            let role = Role {
                id,
                name: name.clone(),
                parent_id,
            };
            tx.dbs.roles.put(&mut tx.txn, &id, &role).map_err(err)?;
            Ok(role)
        })
    }

    /// Delete a role. Children are re-parented to the deleted role's parent
    /// and users referencing it become roleless.
    pub fn delete_role(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            let Some(role) = tx.dbs.roles.get(&tx.txn, &id).map_err(err)? else {
                return Err(missing("role", id));
            };
            let mut children = Vec::new();
            for item in tx.dbs.roles.iter(&tx.txn).map_err(err)? {
                let (_, r) = item.map_err(err)?;
                if r.parent_id == Some(id) {
                    children.push(r);
                }
            }
            for mut child in children {
                child.parent_id = role.parent_id;
                tx.dbs
                    .roles
                    .put(&mut tx.txn, &child.id, &child)
                    .map_err(err)?;
            }
            let mut orphaned = Vec::new();
            for item in tx.dbs.users.iter(&tx.txn).map_err(err)? {
                let (_, u) = item.map_err(err)?;
                if u.role_id == Some(id) {
                    orphaned.push(u);
                }
            }
            for mut user in orphaned {
                user.role_id = None;
                tx.dbs
                    .users
                    .put(&mut tx.txn, &user.id, &user)
                    .map_err(err)?;
            }
            let dropped = drop_rules_targeting(tx, ShareTarget::Role(id))?;
            tx.dbs.roles.delete(&mut tx.txn, &id).map_err(err)?;
            debug!(role = id, rules = dropped, "role deleted");
            Ok(())
        })
    }

    pub fn get_role(&self, id: u64) -> Result<Role> {
        self.read(|d, tx| d.roles.get(tx, &id).map_err(err)?.ok_or_else(|| missing("role", id)))
    }

    /// All roles as parent-pointer rows, ordered by id. Callers rebuild the
    /// forest however their UI wants it.
    pub fn role_tree(&self) -> Result<Vec<Role>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.roles.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        role_id: Option<u64>,
        profile_id: Option<u64>,
    ) -> Result<User> {
        let name = require_name(name, "user")?;
        let email = require_name(email, "user email")?;
        self.transact(|tx| {
            if let Some(r) = role_id {
                role_exists(tx, r)?;
            }
            if let Some(p) = profile_id {
                if tx.dbs.profiles.get(&tx.txn, &p).map_err(err)?.is_none() {
                    return Err(missing("profile", p));
                }
            }
            let id = tx.alloc_id()?;
            let user = User {
                id,
                name: name.clone(),
                email: email.clone(),
                role_id,
                profile_id,
                permission_set_ids: Vec::new(),
                permission_set_group_ids: Vec::new(),
            };
            tx.dbs.users.put(&mut tx.txn, &id, &user).map_err(err)?;
            Ok(user)
        })
    }

    /// Replace a user's scalar fields. Permission set assignments are
    /// managed through the assign/unassign operations and survive the edit.
    pub fn update_user(
        &self,
        id: u64,
        name: &str,
        email: &str,
        role_id: Option<u64>,
        profile_id: Option<u64>,
    ) -> Result<User> {
        let name = require_name(name, "user")?;
        let email = require_name(email, "user email")?;
        self.transact(|tx| {
            let Some(mut user) = tx.dbs.users.get(&tx.txn, &id).map_err(err)? else {
                return Err(missing("user", id));
            };
            if let Some(r) = role_id {
                role_exists(tx, r)?;
            }
            if let Some(p) = profile_id {
                if tx.dbs.profiles.get(&tx.txn, &p).map_err(err)?.is_none() {
                    return Err(missing("profile", p));
                }
            }
            user.name = name.clone();
            user.email = email.clone();
            user.role_id = role_id;
            user.profile_id = profile_id;
            tx.dbs.users.put(&mut tx.txn, &id, &user).map_err(err)?;
            Ok(user)
        })
    }

    pub fn delete_user(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            if tx.dbs.users.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("user", id));
            }
            drop_rules_targeting(tx, ShareTarget::User(id))?;
            tx.dbs.users.delete(&mut tx.txn, &id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: u64) -> Result<User> {
        self.read(|d, tx| d.users.get(tx, &id).map_err(err)?.ok_or_else(|| missing("user", id)))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.users.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }

    pub fn assign_permission_set(&self, user_id: u64, set_id: u64) -> Result<User> {
        self.edit_user_sets(
            user_id,
            |user| push_unique(&mut user.permission_set_ids, set_id),
            move |tx| {
                if tx.dbs.perm_sets.get(&tx.txn, &set_id).map_err(err)?.is_none() {
                    return Err(missing("permission set", set_id));
                }
                Ok(())
            },
        )
    }

    pub fn unassign_permission_set(&self, user_id: u64, set_id: u64) -> Result<User> {
        self.edit_user_sets(
            user_id,
            |user| user.permission_set_ids.retain(|s| *s != set_id),
            |_| Ok(()),
        )
    }

    pub fn assign_permission_set_group(&self, user_id: u64, group_id: u64) -> Result<User> {
        self.edit_user_sets(
            user_id,
            |user| push_unique(&mut user.permission_set_group_ids, group_id),
            move |tx| {
                if tx
                    .dbs
                    .perm_set_groups
                    .get(&tx.txn, &group_id)
                    .map_err(err)?
                    .is_none()
                {
                    return Err(missing("permission set group", group_id));
                }
                Ok(())
            },
        )
    }

    pub fn unassign_permission_set_group(&self, user_id: u64, group_id: u64) -> Result<User> {
        self.edit_user_sets(
            user_id,
            |user| user.permission_set_group_ids.retain(|g| *g != group_id),
            |_| Ok(()),
        )
    }

    fn edit_user_sets(
        &self,
        user_id: u64,
        apply: impl FnOnce(&mut User),
        check: impl FnOnce(&Tx) -> Result<()>,
    ) -> Result<User> {
        self.transact(|tx| {
            let Some(mut user) = tx.dbs.users.get(&tx.txn, &user_id).map_err(err)? else {
                return Err(missing("user", user_id));
            };
            check(tx)?;
            apply(&mut user);
            tx.dbs.users.put(&mut tx.txn, &user_id, &user).map_err(err)?;
            Ok(user)
        })
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn create_profile(&self, name: &str, description: &str) -> Result<Profile> {
        let name = require_name(name, "profile")?;
        self.transact(|tx| {
            let id = tx.alloc_id()?;
            let profile = Profile {
                id,
                name: name.clone(),
                description: description.to_string(),
            };
            tx.dbs.profiles.put(&mut tx.txn, &id, &profile).map_err(err)?;
            Ok(profile)
        })
    }

    pub fn update_profile(&self, id: u64, name: &str, description: &str) -> Result<Profile> {
        let name = require_name(name, "profile")?;
        self.transact(|tx| {
            if tx.dbs.profiles.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("profile", id));
            }
            let profile = Profile {
                id,
                name: name.clone(),
                description: description.to_string(),
            };
            tx.dbs.profiles.put(&mut tx.txn, &id, &profile).map_err(err)?;
            Ok(profile)
        })
    }

    /// Delete a profile: users assigned to it become profileless and its
    /// permission rows and layout assignments go with it.
    pub fn delete_profile(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            if tx.dbs.profiles.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("profile", id));
            }
            let mut holders = Vec::new();
            for item in tx.dbs.users.iter(&tx.txn).map_err(err)? {
                let (_, u) = item.map_err(err)?;
                if u.profile_id == Some(id) {
                    holders.push(u);
                }
            }
            for mut user in holders {
                user.profile_id = None;
                tx.dbs.users.put(&mut tx.txn, &user.id, &user).map_err(err)?;
            }
            purge_principal_state(tx, Principal::Profile(id))?;
            tx.dbs.profiles.delete(&mut tx.txn, &id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: u64) -> Result<Profile> {
        self.read(|d, tx| {
            d.profiles
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("profile", id))
        })
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.profiles.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Permission sets
    // ------------------------------------------------------------------

    pub fn create_permission_set(&self, name: &str, description: &str) -> Result<PermissionSet> {
        let name = require_name(name, "permission set")?;
        self.transact(|tx| {
            let id = tx.alloc_id()?;
            let set = PermissionSet {
                id,
                name: name.clone(),
                description: description.to_string(),
            };
            tx.dbs.perm_sets.put(&mut tx.txn, &id, &set).map_err(err)?;
            Ok(set)
        })
    }

    pub fn update_permission_set(
        &self,
        id: u64,
        name: &str,
        description: &str,
    ) -> Result<PermissionSet> {
        let name = require_name(name, "permission set")?;
        self.transact(|tx| {
            if tx.dbs.perm_sets.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("permission set", id));
            }
            let set = PermissionSet {
                id,
                name: name.clone(),
                description: description.to_string(),
            };
            tx.dbs.perm_sets.put(&mut tx.txn, &id, &set).map_err(err)?;
            Ok(set)
        })
    }

    /// Delete a permission set: unassigned from every user and group, its
    /// permission rows dropped, and sharing rules targeting it removed.
    pub fn delete_permission_set(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            if tx.dbs.perm_sets.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("permission set", id));
            }
            let mut holders = Vec::new();
            for item in tx.dbs.users.iter(&tx.txn).map_err(err)? {
                let (_, u) = item.map_err(err)?;
                if u.permission_set_ids.contains(&id) {
                    holders.push(u);
                }
            }
            for mut user in holders {
                user.permission_set_ids.retain(|s| *s != id);
                tx.dbs.users.put(&mut tx.txn, &user.id, &user).map_err(err)?;
            }
            let mut groups = Vec::new();
            for item in tx.dbs.perm_set_groups.iter(&tx.txn).map_err(err)? {
                let (_, g) = item.map_err(err)?;
                if g.permission_set_ids.contains(&id) {
                    groups.push(g);
                }
            }
            for mut group in groups {
                group.permission_set_ids.retain(|s| *s != id);
                tx.dbs
                    .perm_set_groups
                    .put(&mut tx.txn, &group.id, &group)
                    .map_err(err)?;
            }
            purge_principal_state(tx, Principal::PermissionSet(id))?;
            drop_rules_targeting(tx, ShareTarget::Group(id))?;
            tx.dbs.perm_sets.delete(&mut tx.txn, &id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_permission_set(&self, id: u64) -> Result<PermissionSet> {
        self.read(|d, tx| {
            d.perm_sets
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("permission set", id))
        })
    }

    pub fn list_permission_sets(&self) -> Result<Vec<PermissionSet>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.perm_sets.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Permission set groups
    // ------------------------------------------------------------------

    pub fn create_permission_set_group(
        &self,
        name: &str,
        description: &str,
        member_ids: &[u64],
    ) -> Result<PermissionSetGroup> {
        let name = require_name(name, "permission set group")?;
        self.transact(|tx| {
            let members = checked_members(tx, member_ids)?;
            let id = tx.alloc_id()?;
            let group = PermissionSetGroup {
                id,
                name: name.clone(),
                description: description.to_string(),
                permission_set_ids: members,
            };
            tx.dbs
                .perm_set_groups
                .put(&mut tx.txn, &id, &group)
                .map_err(err)?;
            Ok(group)
        })
    }

    pub fn update_permission_set_group(
        &self,
        id: u64,
        name: &str,
        description: &str,
        member_ids: &[u64],
    ) -> Result<PermissionSetGroup> {
        let name = require_name(name, "permission set group")?;
        self.transact(|tx| {
            if tx
                .dbs
                .perm_set_groups
                .get(&tx.txn, &id)
                .map_err(err)?
                .is_none()
            {
                return Err(missing("permission set group", id));
            }
            let members = checked_members(tx, member_ids)?;
            let group = PermissionSetGroup {
                id,
                name: name.clone(),
                description: description.to_string(),
                permission_set_ids: members,
            };
            tx.dbs
                .perm_set_groups
                .put(&mut tx.txn, &id, &group)
                .map_err(err)?;
            Ok(group)
        })
    }

    pub fn delete_permission_set_group(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            if tx
                .dbs
                .perm_set_groups
                .get(&tx.txn, &id)
                .map_err(err)?
                .is_none()
            {
                return Err(missing("permission set group", id));
            }
            let mut holders = Vec::new();
            for item in tx.dbs.users.iter(&tx.txn).map_err(err)? {
                let (_, u) = item.map_err(err)?;
                if u.permission_set_group_ids.contains(&id) {
                    holders.push(u);
                }
            }
            for mut user in holders {
                user.permission_set_group_ids.retain(|g| *g != id);
                tx.dbs.users.put(&mut tx.txn, &user.id, &user).map_err(err)?;
            }
            drop_rules_targeting(tx, ShareTarget::Group(id))?;
            tx.dbs
                .perm_set_groups
                .delete(&mut tx.txn, &id)
                .map_err(err)?;
            Ok(())
        })
    }

    pub fn get_permission_set_group(&self, id: u64) -> Result<PermissionSetGroup> {
        self.read(|d, tx| {
            d.perm_set_groups
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("permission set group", id))
        })
    }

    pub fn list_permission_set_groups(&self) -> Result<Vec<PermissionSetGroup>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.perm_set_groups.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }
}

/// Validate group members exist; dedup preserving order
fn checked_members(tx: &Tx, member_ids: &[u64]) -> Result<Vec<u64>> {
    let mut members = Vec::new();
    for &m in member_ids {
        if tx.dbs.perm_sets.get(&tx.txn, &m).map_err(err)?.is_none() {
            return Err(missing("permission set", m));
        }
        push_unique(&mut members, m);
    }
    Ok(members)
}
