//! Stepping between the live instances of a project.
//!
//! Instances are walked in the default listing order, newest first: `next`
//! is the closest older instance, `previous` the closest newer one. Ties on
//! the creation time are broken by id.

use super::helpers::{readable_instance, visible_instance};
use super::{CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::Result;
use crate::model::{Id, InstanceState, ProjectInstance};
use crate::store::{bind, Executor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Previous,
}

impl Step {
    fn sql(&self) -> &'static str {
        match self {
            Step::Next => {
                "SELECT * FROM project_instance \
                 WHERE project_id = :project AND state <> :deleted \
                 AND (created < :created OR (created = :created AND id < :id)) \
                 ORDER BY created DESC, id DESC LIMIT 1"
            }
            Step::Previous => {
                "SELECT * FROM project_instance \
                 WHERE project_id = :project AND state <> :deleted \
                 AND (created > :created OR (created = :created AND id > :id)) \
                 ORDER BY created ASC, id ASC LIMIT 1"
            }
        }
    }
}

/// The neighbour of a readable instance, if there is one.
pub fn step_instance<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
    step: Step,
) -> Result<CmdResult<Option<ProjectInstance>>> {
    let current = readable_instance(exec, ctx, id)?;
    let row = exec.query_opt(
        step.sql(),
        &bind([
            ("project", current.project_id.into()),
            ("deleted", InstanceState::Deleted.as_str().into()),
            ("created", current.created.into()),
            ("id", id.into()),
        ]),
    )?;
    let neighbour = row
        .as_ref()
        .map(ProjectInstance::from_row)
        .transpose()?
        .map(|instance| visible_instance(ctx, instance));
    Ok(CmdResult::new(neighbour))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::config::CatalogConfig;
    use crate::error::CatalogError;
    use crate::model::Caller;
    use crate::test_utils::*;

    fn set_created(store: &crate::store::sqlite::SqliteStore, instance: Id, created: i64) {
        store
            .execute(
                "UPDATE project_instance SET created = :created WHERE id = :id",
                &bind([("created", created.into()), ("id", instance.into())]),
            )
            .unwrap();
    }

    /// Four instances created at 100, 200, 200, 300; the third is deleted.
    fn project(blind: bool) -> (crate::store::sqlite::SqliteStore, Vec<Id>) {
        let store = test_store();
        let project = seed_project(&store, "P1", blind);
        seed_member(&store, project, 2, false);
        let mut instances = Vec::new();
        for (name, created) in [("a.svs", 100), ("b.svs", 200), ("c.svs", 200), ("d.svs", 300)] {
            let image = seed_root_image(&store, None, name);
            let instance = seed_instance(&store, project, image, 2);
            seed_instance_name(&store, instance, name);
            set_created(&store, instance, created);
            instances.push(instance);
        }
        (store, instances)
    }

    fn step(store: &crate::store::sqlite::SqliteStore, id: Id, step: Step) -> Option<Id> {
        let acl = Acl::load(store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(2), &config);
        step_instance(store, &ctx, id, step)
            .unwrap()
            .into_data()
            .map(|instance| instance.id)
    }

    #[test]
    fn walks_newest_to_oldest() {
        let (store, ids) = project(false);
        assert_eq!(step(&store, ids[3], Step::Next), Some(ids[2]));
        assert_eq!(step(&store, ids[2], Step::Next), Some(ids[1]));
        assert_eq!(step(&store, ids[1], Step::Next), Some(ids[0]));
        assert_eq!(step(&store, ids[0], Step::Next), None);

        assert_eq!(step(&store, ids[0], Step::Previous), Some(ids[1]));
        assert_eq!(step(&store, ids[1], Step::Previous), Some(ids[2]));
        assert_eq!(step(&store, ids[3], Step::Previous), None);
    }

    #[test]
    fn deleted_instances_are_skipped() {
        let (store, ids) = project(false);
        mark_deleted(&store, ids[2]);
        assert_eq!(step(&store, ids[3], Step::Next), Some(ids[1]));
        assert_eq!(step(&store, ids[1], Step::Previous), Some(ids[3]));
    }

    #[test]
    fn blind_neighbours_are_redacted() {
        let (store, ids) = project(true);
        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(2), &config);

        let next = step_instance(&store, &ctx, ids[3], Step::Next)
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(next.blinded_name, next.instance_filename);
        assert!(!serde_json::to_string(&next).unwrap().contains(".svs"));

        let stranger = Ctx::new(&acl, Caller::user(3), &config);
        let err = step_instance(&store, &stranger, ids[3], Step::Next).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }
}
