//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer and the single
//! entry point for every catalog operation, whichever client drives it.
//!
//! ## Role and Responsibilities
//!
//! The facade:
//! - **Resolves the caller** through the [`Identity`] collaborator
//! - **Demarcates transactions**: every mutation runs inside one
//!   [`Store::transaction`], so a guard check and the writes depending on it,
//!   or a root update and its propagation, commit or roll back together
//! - **Dispatches** to the command functions and returns their
//!   `Result<CmdResult<T>>` untouched
//!
//! Listings and reference lookups are read-only and run outside a
//! transaction.
//!
//! ## What the API Does NOT Do
//!
//! - **Business logic**: that belongs in `commands/*.rs`
//! - **I/O**: no stdout, stderr or formatting
//!
//! ## Generic Over Its Collaborators
//!
//! `Catalog<S, P, I>` is generic over the store, the permission collaborator
//! and the identity source. The CLI uses `SqliteStore`, an [`Acl`] loaded from
//! the database and a fixed [`Caller`]; tests do the same in memory.
//!
//! [`Acl`]: crate::access::Acl

use crate::access::{Identity, Permissions};
use crate::commands::{self, CmdResult, Ctx};
use crate::config::CatalogConfig;
use crate::error::Result;
use crate::model::{Caller, Id, Plane, PlaneInstance, ProjectInstance};
use crate::query::{ListRequest, Page};
use crate::reference::Axes;
use crate::store::Store;

/// The catalog engine over one store.
pub struct Catalog<S: Store, P: Permissions, I: Identity> {
    store: S,
    permissions: P,
    identity: I,
    config: CatalogConfig,
}

impl<S: Store, P: Permissions, I: Identity> Catalog<S, P, I> {
    pub fn new(store: S, permissions: P, identity: I, config: CatalogConfig) -> Self {
        Self {
            store,
            permissions,
            identity,
            config,
        }
    }

    fn ctx(&self) -> Ctx<'_, P> {
        Ctx::new(&self.permissions, self.identity.current_caller(), &self.config)
    }

    pub fn caller(&self) -> Caller {
        self.identity.current_caller()
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Swap the permission snapshot, e.g. after membership changes.
    pub fn set_permissions(&mut self, permissions: P) {
        self.permissions = permissions;
    }

    // --- listings ---

    pub fn list_project_instances(&self, project: Id, request: &ListRequest) -> Result<CmdResult<Page>> {
        commands::list::instances_in_project(&self.store, &self.ctx(), project, request)
    }

    pub fn list_user_instances(&self, request: &ListRequest) -> Result<CmdResult<Page>> {
        commands::list::instances_of_user(&self.store, &self.ctx(), request)
    }

    pub fn list_root_images(
        &self,
        request: &ListRequest,
        project: Option<Id>,
    ) -> Result<CmdResult<Page>> {
        commands::list::root_images(&self.store, &self.ctx(), request, project)
    }

    pub fn list_project_instances_light(&self, project: Id) -> Result<CmdResult<Vec<LightInstance>>> {
        commands::list::light_instances_in_project(&self.store, &self.ctx(), project)
    }

    pub fn list_user_instances_light(&self) -> Result<CmdResult<Vec<LightInstance>>> {
        commands::list::light_instances_of_user(&self.store, &self.ctx())
    }

    pub fn instance_bounds(&self, project: Id) -> Result<CmdResult<InstanceBounds>> {
        commands::bounds::instance_bounds(&self.store, &self.ctx(), project)
    }

    pub fn next_instance(&self, instance: Id) -> Result<CmdResult<Option<ProjectInstance>>> {
        commands::navigate::step_instance(&self.store, &self.ctx(), instance, Step::Next)
    }

    pub fn previous_instance(&self, instance: Id) -> Result<CmdResult<Option<ProjectInstance>>> {
        commands::navigate::step_instance(&self.store, &self.ctx(), instance, Step::Previous)
    }

    // --- reference planes ---

    pub fn get_reference_slice(&self, instance: Id) -> Result<CmdResult<PlaneInstance>> {
        commands::reference::get_reference_slice(&self.store, &self.ctx(), instance)
    }

    pub fn get_reference_plane(&self, image: Id) -> Result<CmdResult<Plane>> {
        commands::reference::get_reference_plane(&self.store, &self.ctx(), image)
    }

    pub fn axis_coordinates(&self, image: Id) -> Result<CmdResult<Axes>> {
        commands::reference::axis_coordinates(&self.store, &self.ctx(), image)
    }

    // --- mutations ---

    pub fn update_root_image(
        &self,
        image: Id,
        update: commands::update::RootImageUpdate,
    ) -> Result<CmdResult<commands::update::RootImageUpdated>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::update::update_root_image(tx, &ctx, image, update))
    }

    pub fn update_instance(
        &self,
        instance: Id,
        update: commands::update::InstanceUpdate,
    ) -> Result<CmdResult<ProjectInstance>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::update::update_instance(tx, &ctx, instance, update))
    }

    pub fn delete_root_image(&self, image: Id) -> Result<CmdResult<commands::delete::DeletionReport>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::delete::delete_root_image(tx, &ctx, image))
    }

    pub fn delete_plane(&self, plane: Id) -> Result<CmdResult<commands::delete::DeletionReport>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::delete::delete_plane(tx, &ctx, plane))
    }

    pub fn delete_instance(&self, instance: Id) -> Result<CmdResult<ProjectInstance>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::delete::delete_instance(tx, &ctx, instance))
    }

    pub fn purge_instance(&self, instance: Id) -> Result<CmdResult<commands::delete::DeletionReport>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::delete::purge_instance(tx, &ctx, instance))
    }

    pub fn attach_image(&self, project: Id, image: Id) -> Result<CmdResult<commands::attach::Attached>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::attach::attach_image(tx, &ctx, project, image))
    }

    pub fn start_review(&self, instance: Id) -> Result<CmdResult<ProjectInstance>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::review::start_review(tx, &ctx, instance))
    }

    pub fn stop_review(&self, instance: Id, cancel: bool) -> Result<CmdResult<ProjectInstance>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::review::stop_review(tx, &ctx, instance, cancel))
    }

    pub fn ingest_image(
        &self,
        new: commands::ingest::NewRootImage,
    ) -> Result<CmdResult<commands::ingest::Ingested>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::ingest::ingest_image(tx, &ctx, new))
    }

    pub fn add_plane(&self, image: Id, spec: commands::ingest::PlaneSpec) -> Result<CmdResult<Plane>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::ingest::add_plane(tx, &ctx, image, spec))
    }

    // --- containers ---

    pub fn create_storage(&self, name: &str) -> Result<CmdResult<Id>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::setup::create_storage(tx, &ctx, name))
    }

    pub fn create_project(&self, name: &str, blind_mode: bool) -> Result<CmdResult<Id>> {
        let ctx = self.ctx();
        self.store
            .transaction(|tx| commands::setup::create_project(tx, &ctx, name, blind_mode))
    }

    pub fn add_project_member(&self, project: Id, user: Id, manager: bool) -> Result<CmdResult<()>> {
        let ctx = self.ctx();
        self.store.transaction(|tx| {
            commands::setup::add_project_member(tx, &ctx, project, user, manager)
        })
    }

    pub fn add_storage_member(&self, storage: Id, user: Id, can_write: bool) -> Result<CmdResult<()>> {
        let ctx = self.ctx();
        self.store.transaction(|tx| {
            commands::setup::add_storage_member(tx, &ctx, storage, user, can_write)
        })
    }
}

pub use crate::commands::attach::{AttachOutcome, Attached};
pub use crate::commands::bounds::{Bound, InstanceBounds};
pub use crate::commands::delete::DeletionReport;
pub use crate::commands::ingest::{Ingested, NewRootImage, PlaneSpec};
pub use crate::commands::list::LightInstance;
pub use crate::commands::navigate::Step;
pub use crate::commands::update::{InstanceUpdate, RootImageUpdate, RootImageUpdated};
pub use crate::commands::{CmdMessage, MessageLevel};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::error::CatalogError;
    use crate::query::Operator;
    use crate::store::sqlite::SqliteStore;
    use crate::test_utils::*;

    fn catalog(store: SqliteStore, caller: Caller) -> Catalog<SqliteStore, Acl, Caller> {
        let acl = Acl::load(&store).unwrap();
        Catalog::new(store, acl, caller, CatalogConfig::default())
    }

    #[test]
    fn listings_run_as_the_identity() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let project = seed_project(&store, "P1", false);
        seed_member(&store, project, 2, false);
        seed_instance(&store, project, image, 2);

        let member = catalog(store, Caller::user(2));
        let page = member
            .list_project_instances(project, &ListRequest::new())
            .unwrap()
            .into_data();
        assert_eq!(page.total(), 1);
        let page = member
            .list_user_instances(&ListRequest::new().filter("name", Operator::Like, "a."))
            .unwrap()
            .into_data();
        assert_eq!(page.total(), 1);
    }

    #[test]
    fn browsing_helpers_respect_blind_mode() {
        let store = test_store();
        let project = seed_project(&store, "Blind", true);
        seed_member(&store, project, 2, false);
        for name in ["a.tif", "b.tif"] {
            let image = seed_root_image(&store, None, name);
            seed_instance(&store, project, image, 2);
        }

        let member = catalog(store, Caller::user(2));
        let light = member.list_project_instances_light(project).unwrap().into_data();
        assert_eq!(light.len(), 2);
        let newest = light.iter().map(|i| i.id).max().unwrap();
        let bounds = member.instance_bounds(project).unwrap().into_data();
        assert!(!serde_json::to_string(&(light, bounds)).unwrap().contains(".tif"));

        let mine = member.list_user_instances_light().unwrap().into_data();
        assert!(mine.iter().all(|i| i.instance_filename.is_none()));

        let older = member.next_instance(newest).unwrap().into_data().unwrap();
        assert_ne!(older.id, newest);
        assert_eq!(older.instance_filename, older.blinded_name);
        let back = member.previous_instance(older.id).unwrap().into_data().unwrap();
        assert_eq!(back.id, newest);
    }

    #[test]
    fn failed_mutations_leave_no_trace() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let project = seed_project(&store, "P1", false);
        seed_instance(&store, project, image, 1);

        let admin = catalog(store, Caller::admin(9));
        let err = admin.delete_root_image(image).unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { .. }));
        assert_eq!(count(admin.store(), "root_image"), 1);

        let instance = admin
            .list_project_instances(project, &ListRequest::new())
            .unwrap()
            .into_data()
            .collection[0]["id"]
            .as_i64()
            .unwrap();
        admin.delete_instance(instance).unwrap();
        let report = admin.delete_root_image(image).unwrap().into_data();
        assert_eq!(report.root_images, 1);
    }

    #[test]
    fn mutations_dispatch_through_transactions() {
        let store = test_store();
        let admin = catalog(store, Caller::admin(9));

        let storage = admin.create_storage("scanner").unwrap().into_data();
        let project = admin.create_project("P1", false).unwrap().into_data();
        let new = NewRootImage {
            channels: 3,
            ..NewRootImage::new(storage, "c.tif")
        };
        let image = admin.ingest_image(new).unwrap().into_data().image.id;
        let attached = admin.attach_image(project, image).unwrap().into_data();
        assert_eq!(attached.outcome, AttachOutcome::Created);
        assert_eq!(attached.plane_instances, 3);

        let slice = admin.get_reference_slice(attached.instance.id).unwrap().into_data();
        assert_eq!(slice.coordinate.channel, 1);

        let update = RootImageUpdate {
            magnification: Some(Some(20)),
            ..Default::default()
        };
        let updated = admin.update_root_image(image, update).unwrap().into_data();
        assert_eq!(updated.propagation.magnification, 1);
    }
}
