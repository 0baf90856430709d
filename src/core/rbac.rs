// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Users, roles and privileges
//!
//! Passwords are stored as blake3 digests. Every user implicitly holds the
//! `public` role; `admin` passes every check.

use crate::core::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const ROOT_USER: &str = "root";
pub const ADMIN_ROLE: &str = "admin";
pub const PUBLIC_ROLE: &str = "public";
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Global,
    Collection,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Privilege {
    All,
    CreateCollection,
    DropCollection,
    DescribeCollection,
    ShowCollections,
    RenameCollection,
    Load,
    Release,
    GetLoadState,
    GetLoadingProgress,
    Insert,
    Upsert,
    Delete,
    Search,
    Query,
    Flush,
    Import,
    CreateIndex,
    DropIndex,
    IndexDetail,
    CreatePartition,
    DropPartition,
    ShowPartitions,
    HasPartition,
    CreateAlias,
    DropAlias,
    DescribeAlias,
    ListAliases,
    CreateOwnership,
    DropOwnership,
    SelectOwnership,
    ManageOwnership,
    UpdateUser,
    SelectUser,
}

impl Privilege {
    /// Object type a privilege is granted on.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Privilege::CreateCollection
            | Privilege::DropCollection
            | Privilege::ShowCollections
            | Privilege::RenameCollection
            | Privilege::CreateOwnership
            | Privilege::DropOwnership
            | Privilege::SelectOwnership
            | Privilege::ManageOwnership
            | Privilege::CreateAlias
            | Privilege::DropAlias
            | Privilege::DescribeAlias
            | Privilege::ListAliases
            | Privilege::All => ObjectType::Global,
            Privilege::UpdateUser | Privilege::SelectUser => ObjectType::User,
            _ => ObjectType::Collection,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Privilege {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let quoted = format!("\"{}\"", if s == WILDCARD { "All" } else { s });
        serde_json::from_str(&quoted)
            .map_err(|_| DbError::Validation(format!("unknown privilege '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub object_type: ObjectType,
    pub object_name: String,
    pub privilege: Privilege,
}

impl Grant {
    fn covers(&self, object_type: ObjectType, object_name: &str, privilege: Privilege) -> bool {
        (self.object_type == object_type || self.privilege == Privilege::All)
            && (self.object_name == WILDCARD || self.object_name == object_name)
            && (self.privilege == privilege || self.privilege == Privilege::All)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescription {
    pub user_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescription {
    pub role_name: String,
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone)]
struct User {
    password_digest: [u8; 32],
    roles: BTreeSet<String>,
}

fn digest(password: &str) -> [u8; 32] {
    *blake3::hash(password.as_bytes()).as_bytes()
}

#[derive(Debug, Clone)]
pub struct RbacStore {
    users: BTreeMap<String, User>,
    roles: BTreeMap<String, BTreeSet<Grant>>,
}

impl RbacStore {
    pub fn new(root_password: &str) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            ADMIN_ROLE.to_string(),
            BTreeSet::from([Grant {
                object_type: ObjectType::Global,
                object_name: WILDCARD.to_string(),
                privilege: Privilege::All,
            }]),
        );
        let public: BTreeSet<Grant> = [
            Privilege::DescribeCollection,
            Privilege::IndexDetail,
            Privilege::GetLoadState,
            Privilege::GetLoadingProgress,
            Privilege::ShowPartitions,
            Privilege::HasPartition,
            Privilege::ShowCollections,
            Privilege::DescribeAlias,
            Privilege::ListAliases,
            Privilege::SelectUser,
        ]
        .into_iter()
        .map(|privilege| Grant {
            object_type: privilege.object_type(),
            object_name: WILDCARD.to_string(),
            privilege,
        })
        .collect();
        roles.insert(PUBLIC_ROLE.to_string(), public);

        let mut users = BTreeMap::new();
        users.insert(
            ROOT_USER.to_string(),
            User {
                password_digest: digest(root_password),
                roles: BTreeSet::from([ADMIN_ROLE.to_string()]),
            },
        );
        Self { users, roles }
    }

    fn user(&self, name: &str) -> DbResult<&User> {
        self.users
            .get(name)
            .ok_or_else(|| DbError::NotFound(format!("user '{}' does not exist", name)))
    }

    fn user_mut(&mut self, name: &str) -> DbResult<&mut User> {
        self.users
            .get_mut(name)
            .ok_or_else(|| DbError::NotFound(format!("user '{}' does not exist", name)))
    }

    fn role_mut(&mut self, name: &str) -> DbResult<&mut BTreeSet<Grant>> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| DbError::NotFound(format!("role '{}' does not exist", name)))
    }

    pub fn authenticate(&self, user: &str, password: &str) -> DbResult<()> {
        match self.users.get(user) {
            Some(u) if u.password_digest == digest(password) => Ok(()),
            _ => Err(DbError::PermissionDenied(format!(
                "invalid credentials for user '{}'",
                user
            ))),
        }
    }

    pub fn create_user(&mut self, name: &str, password: &str) -> DbResult<()> {
        if name.is_empty() || password.is_empty() {
            return Err(DbError::Validation(
                "user name and password must not be empty".to_string(),
            ));
        }
        if self.users.contains_key(name) {
            return Err(DbError::AlreadyExists(format!("user '{}' already exists", name)));
        }
        self.users.insert(
            name.to_string(),
            User {
                password_digest: digest(password),
                roles: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn drop_user(&mut self, name: &str) -> DbResult<()> {
        if name == ROOT_USER {
            return Err(DbError::Validation("the root user cannot be dropped".to_string()));
        }
        self.user(name)?;
        self.users.remove(name);
        Ok(())
    }

    pub fn update_password(&mut self, name: &str, old: &str, new: &str) -> DbResult<()> {
        if new.is_empty() {
            return Err(DbError::Validation("password must not be empty".to_string()));
        }
        self.authenticate(name, old)?;
        self.user_mut(name)?.password_digest = digest(new);
        Ok(())
    }

    pub fn list_users(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    pub fn describe_user(&self, name: &str) -> DbResult<UserDescription> {
        let user = self.user(name)?;
        Ok(UserDescription {
            user_name: name.to_string(),
            roles: user.roles.iter().cloned().collect(),
        })
    }

    pub fn create_role(&mut self, name: &str) -> DbResult<()> {
        if name.is_empty() {
            return Err(DbError::Validation("role name must not be empty".to_string()));
        }
        if self.roles.contains_key(name) {
            return Err(DbError::AlreadyExists(format!("role '{}' already exists", name)));
        }
        self.roles.insert(name.to_string(), BTreeSet::new());
        Ok(())
    }

    pub fn drop_role(&mut self, name: &str) -> DbResult<()> {
        if name == ADMIN_ROLE || name == PUBLIC_ROLE {
            return Err(DbError::Validation(format!(
                "built-in role '{}' cannot be dropped",
                name
            )));
        }
        self.role_mut(name)?;
        self.roles.remove(name);
        for user in self.users.values_mut() {
            user.roles.remove(name);
        }
        Ok(())
    }

    pub fn list_roles(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }

    pub fn describe_role(&self, name: &str) -> DbResult<RoleDescription> {
        let grants = self
            .roles
            .get(name)
            .ok_or_else(|| DbError::NotFound(format!("role '{}' does not exist", name)))?;
        Ok(RoleDescription {
            role_name: name.to_string(),
            grants: grants.iter().cloned().collect(),
        })
    }

    pub fn grant_role(&mut self, user: &str, role: &str) -> DbResult<()> {
        if !self.roles.contains_key(role) {
            return Err(DbError::NotFound(format!("role '{}' does not exist", role)));
        }
        self.user_mut(user)?.roles.insert(role.to_string());
        Ok(())
    }

    pub fn revoke_role(&mut self, user: &str, role: &str) -> DbResult<()> {
        if user == ROOT_USER && role == ADMIN_ROLE {
            return Err(DbError::Validation("root cannot lose the admin role".to_string()));
        }
        self.user_mut(user)?.roles.remove(role);
        Ok(())
    }

    pub fn grant_privilege(&mut self, role: &str, grant: Grant) -> DbResult<()> {
        self.role_mut(role)?.insert(grant);
        Ok(())
    }

    pub fn revoke_privilege(&mut self, role: &str, grant: &Grant) -> DbResult<()> {
        self.role_mut(role)?.remove(grant);
        Ok(())
    }

    /// Check that `user` may perform `privilege` on the named object.
    pub fn check(
        &self,
        user: &str,
        object_type: ObjectType,
        object_name: &str,
        privilege: Privilege,
    ) -> DbResult<()> {
        let account = self.user(user).map_err(|_| {
            DbError::PermissionDenied(format!("user '{}' does not exist", user))
        })?;
        let allowed = account
            .roles
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(PUBLIC_ROLE))
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .any(|grant| grant.covers(object_type, object_name, privilege));
        if allowed {
            Ok(())
        } else {
            Err(DbError::PermissionDenied(format!(
                "user '{}' lacks {} on {:?} '{}'",
                user, privilege, object_type, object_name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(object_name: &str, privilege: Privilege) -> Grant {
        Grant {
            object_type: privilege.object_type(),
            object_name: object_name.to_string(),
            privilege,
        }
    }

    #[test]
    fn test_root_is_admin() {
        let store = RbacStore::new("Milvus");
        store.authenticate(ROOT_USER, "Milvus").unwrap();
        assert!(store.authenticate(ROOT_USER, "wrong").is_err());
        store
            .check(ROOT_USER, ObjectType::Collection, "anything", Privilege::Insert)
            .unwrap();
    }

    #[test]
    fn test_role_grants_flow_to_users() {
        let mut store = RbacStore::new("Milvus");
        store.create_user("alice", "P@ssw0rd").unwrap();
        store.create_role("reader").unwrap();
        store.grant_privilege("reader", grant("books", Privilege::Search)).unwrap();

        assert!(matches!(
            store.check("alice", ObjectType::Collection, "books", Privilege::Search),
            Err(DbError::PermissionDenied(_))
        ));
        store.grant_role("alice", "reader").unwrap();
        store.check("alice", ObjectType::Collection, "books", Privilege::Search).unwrap();
        assert!(store
            .check("alice", ObjectType::Collection, "films", Privilege::Search)
            .is_err());

        // public privileges apply to everyone
        store
            .check("alice", ObjectType::Collection, "films", Privilege::DescribeCollection)
            .unwrap();

        store.revoke_privilege("reader", &grant("books", Privilege::Search)).unwrap();
        assert!(store
            .check("alice", ObjectType::Collection, "books", Privilege::Search)
            .is_err());
    }

    #[test]
    fn test_builtins_cannot_be_dropped() {
        let mut store = RbacStore::new("Milvus");
        assert!(store.drop_role(ADMIN_ROLE).is_err());
        assert!(store.drop_role(PUBLIC_ROLE).is_err());
        assert!(store.drop_user(ROOT_USER).is_err());
    }

    #[test]
    fn test_update_password_checks_old() {
        let mut store = RbacStore::new("Milvus");
        store.create_user("bob", "old").unwrap();
        assert!(store.update_password("bob", "wrong", "new").is_err());
        store.update_password("bob", "old", "new").unwrap();
        store.authenticate("bob", "new").unwrap();
    }

    #[test]
    fn test_privilege_from_str() {
        assert_eq!("Search".parse::<Privilege>().unwrap(), Privilege::Search);
        assert_eq!("*".parse::<Privilege>().unwrap(), Privilege::All);
        assert!("Fly".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_dropping_role_removes_it_from_users() {
        let mut store = RbacStore::new("Milvus");
        store.create_user("carol", "pw").unwrap();
        store.create_role("writer").unwrap();
        store.grant_role("carol", "writer").unwrap();
        store.drop_role("writer").unwrap();
        assert!(store.describe_user("carol").unwrap().roles.is_empty());
    }
}
