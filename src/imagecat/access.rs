//! # Access Collaborators
//!
//! The engine treats permission evaluation as an opaque collaborator: it asks
//! [`Permissions`] yes/no questions about a [`Container`] and a [`Caller`] and
//! never looks behind the answers. [`Identity`] supplies the caller.
//!
//! [`Acl`] is the default collaborator: an in-memory snapshot of project and
//! storage memberships, built by hand in tests or loaded from the catalog's
//! membership tables with [`Acl::load`].

use crate::error::Result;
use crate::model::{Caller, Container, Id};
use crate::store::{Executor, Params};
use std::collections::{BTreeMap, BTreeSet};

pub trait Permissions {
    fn can_read(&self, container: Container, caller: &Caller) -> bool;

    fn can_write(&self, container: Container, caller: &Caller) -> bool;

    /// Whether the project redacts image names at all.
    fn is_blind_mode_active(&self, project: Id, caller: &Caller) -> bool;

    fn is_manager(&self, project: Id, caller: &Caller) -> bool;

    /// Projects the caller can read, used to scope per-user listings.
    fn readable_projects(&self, caller: &Caller) -> Vec<Id>;

    /// Storages the caller can read, used to scope root image listings.
    fn readable_storages(&self, caller: &Caller) -> Vec<Id>;
}

pub trait Identity {
    fn current_caller(&self) -> Caller;
}

/// A fixed identity: every operation runs as this caller.
impl Identity for Caller {
    fn current_caller(&self) -> Caller {
        *self
    }
}

#[derive(Debug, Clone, Default)]
struct ProjectAcl {
    blind_mode: bool,
    read_only: bool,
    members: BTreeSet<Id>,
    managers: BTreeSet<Id>,
}

#[derive(Debug, Clone, Default)]
struct StorageAcl {
    owner: Id,
    readers: BTreeSet<Id>,
    writers: BTreeSet<Id>,
}

/// Membership-based permissions.
///
/// Admins read and write everything and manage every project. Project
/// managers can write; members can write unless the project is read-only.
/// Storage owners and writers can write; readers can only read.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    projects: BTreeMap<Id, ProjectAcl>,
    storages: BTreeMap<Id, StorageAcl>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Id, blind_mode: bool) -> Self {
        self.projects.entry(project).or_default().blind_mode = blind_mode;
        self
    }

    pub fn with_read_only(mut self, project: Id) -> Self {
        self.projects.entry(project).or_default().read_only = true;
        self
    }

    pub fn with_member(mut self, project: Id, user: Id) -> Self {
        self.projects.entry(project).or_default().members.insert(user);
        self
    }

    pub fn with_manager(mut self, project: Id, user: Id) -> Self {
        let acl = self.projects.entry(project).or_default();
        acl.members.insert(user);
        acl.managers.insert(user);
        self
    }

    pub fn with_storage(mut self, storage: Id, owner: Id) -> Self {
        self.storages.entry(storage).or_default().owner = owner;
        self
    }

    pub fn with_storage_reader(mut self, storage: Id, user: Id) -> Self {
        self.storages.entry(storage).or_default().readers.insert(user);
        self
    }

    pub fn with_storage_writer(mut self, storage: Id, user: Id) -> Self {
        self.storages.entry(storage).or_default().writers.insert(user);
        self
    }

    /// Snapshot the membership tables of a catalog.
    pub fn load<E: Executor>(exec: &E) -> Result<Self> {
        let none = Params::new();
        let mut acl = Acl::new();

        for row in exec.query("SELECT id, blind_mode, read_only FROM project", &none)? {
            let entry = acl.projects.entry(row.i64("id")?).or_default();
            entry.blind_mode = row.bool("blind_mode")?;
            entry.read_only = row.bool("read_only")?;
        }
        for row in exec.query("SELECT project_id, user_id, manager FROM project_member", &none)? {
            let entry = acl.projects.entry(row.i64("project_id")?).or_default();
            let user = row.i64("user_id")?;
            entry.members.insert(user);
            if row.bool("manager")? {
                entry.managers.insert(user);
            }
        }
        for row in exec.query("SELECT id, user_id FROM storage", &none)? {
            acl.storages.entry(row.i64("id")?).or_default().owner = row.i64("user_id")?;
        }
        for row in exec.query("SELECT storage_id, user_id, can_write FROM storage_member", &none)? {
            let entry = acl.storages.entry(row.i64("storage_id")?).or_default();
            let user = row.i64("user_id")?;
            if row.bool("can_write")? {
                entry.writers.insert(user);
            } else {
                entry.readers.insert(user);
            }
        }
        Ok(acl)
    }
}

impl Permissions for Acl {
    fn can_read(&self, container: Container, caller: &Caller) -> bool {
        if caller.is_admin() {
            return true;
        }
        match container {
            Container::Project(id) => self
                .projects
                .get(&id)
                .is_some_and(|p| p.members.contains(&caller.id)),
            Container::Storage(id) => self.storages.get(&id).is_some_and(|s| {
                s.owner == caller.id
                    || s.readers.contains(&caller.id)
                    || s.writers.contains(&caller.id)
            }),
        }
    }

    fn can_write(&self, container: Container, caller: &Caller) -> bool {
        if caller.is_admin() {
            return true;
        }
        match container {
            Container::Project(id) => self.projects.get(&id).is_some_and(|p| {
                p.managers.contains(&caller.id) || (!p.read_only && p.members.contains(&caller.id))
            }),
            Container::Storage(id) => self
                .storages
                .get(&id)
                .is_some_and(|s| s.owner == caller.id || s.writers.contains(&caller.id)),
        }
    }

    fn is_blind_mode_active(&self, project: Id, _caller: &Caller) -> bool {
        self.projects.get(&project).is_some_and(|p| p.blind_mode)
    }

    fn is_manager(&self, project: Id, caller: &Caller) -> bool {
        caller.is_admin()
            || self
                .projects
                .get(&project)
                .is_some_and(|p| p.managers.contains(&caller.id))
    }

    fn readable_projects(&self, caller: &Caller) -> Vec<Id> {
        self.projects
            .keys()
            .copied()
            .filter(|id| self.can_read(Container::Project(*id), caller))
            .collect()
    }

    fn readable_storages(&self, caller: &Caller) -> Vec<Id> {
        self.storages
            .keys()
            .copied()
            .filter(|id| self.can_read(Container::Storage(*id), caller))
            .collect()
    }
}
