//! Containers and memberships: storages, projects and who belongs to them.
//!
//! The [`Acl`](crate::access::Acl) snapshot does not see rows created here
//! until it is loaded again.

use super::helpers::readable_project;
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, Container, Id};
use crate::store::{bind, Executor};
use tracing::info;

/// A storage owned by the caller.
pub fn create_storage<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    name: &str,
) -> Result<CmdResult<Id>> {
    let name = non_blank(name, "storage")?;
    let id = exec.insert(
        "INSERT INTO storage (name, user_id) VALUES (:name, :owner) RETURNING id",
        &bind([("name", name.into()), ("owner", ctx.caller.id.into())]),
    )?;
    info!(storage = id, owner = ctx.caller.id, "storage created");
    Ok(CmdResult::new(id).with_message(CmdMessage::success(format!(
        "Created storage {} ({})",
        id, name
    ))))
}

/// A project managed by the caller.
pub fn create_project<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    name: &str,
    blind_mode: bool,
) -> Result<CmdResult<Id>> {
    let name = non_blank(name, "project")?;
    let id = exec.insert(
        "INSERT INTO project (name, blind_mode, created) VALUES (:name, :blind, :now) RETURNING id",
        &bind([
            ("name", name.into()),
            ("blind", blind_mode.into()),
            ("now", now_millis().into()),
        ]),
    )?;
    insert_project_member(exec, id, ctx.caller.id, true)?;
    info!(project = id, blind_mode, "project created");
    Ok(CmdResult::new(id).with_message(CmdMessage::success(format!(
        "Created project {} ({})",
        id, name
    ))))
}

/// Add or update a project member. Only managers can.
pub fn add_project_member<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
    user: Id,
    manager: bool,
) -> Result<CmdResult<()>> {
    readable_project(exec, ctx, project)?;
    if !ctx.permissions.is_manager(project, &ctx.caller) {
        return Err(CatalogError::Forbidden(format!(
            "user {} does not manage project {}",
            ctx.caller.id, project
        )));
    }
    insert_project_member(exec, project, user, manager)?;
    info!(project, user, manager, "project member added");
    Ok(CmdResult::new(()).with_message(CmdMessage::success(format!(
        "User {} joined project {}",
        user, project
    ))))
}

/// Add or update a storage member. Requires write access to the storage.
pub fn add_storage_member<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    storage: Id,
    user: Id,
    can_write: bool,
) -> Result<CmdResult<()>> {
    let exists = exec.query_opt(
        "SELECT id FROM storage WHERE id = :id",
        &bind([("id", storage.into())]),
    )?;
    if exists.is_none() {
        return Err(CatalogError::not_found("storage", storage));
    }
    ctx.check_read(Container::Storage(storage), "storage", storage)?;
    ctx.check_write(Container::Storage(storage))?;
    exec.execute(
        "INSERT INTO storage_member (storage_id, user_id, can_write) VALUES (:storage, :user, :write) \
         ON CONFLICT (storage_id, user_id) DO UPDATE SET can_write = excluded.can_write",
        &bind([
            ("storage", storage.into()),
            ("user", user.into()),
            ("write", can_write.into()),
        ]),
    )?;
    info!(storage, user, can_write, "storage member added");
    Ok(CmdResult::new(()).with_message(CmdMessage::success(format!(
        "User {} joined storage {}",
        user, storage
    ))))
}

fn insert_project_member<E: Executor>(exec: &E, project: Id, user: Id, manager: bool) -> Result<()> {
    exec.execute(
        "INSERT INTO project_member (project_id, user_id, manager) VALUES (:project, :user, :manager) \
         ON CONFLICT (project_id, user_id) DO UPDATE SET manager = excluded.manager",
        &bind([
            ("project", project.into()),
            ("user", user.into()),
            ("manager", manager.into()),
        ]),
    )?;
    Ok(())
}

fn non_blank<'a>(name: &'a str, kind: &str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        Err(CatalogError::InvalidArgument(format!("{} name cannot be blank", kind)))
    } else {
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::config::CatalogConfig;
    use crate::model::Caller;
    use crate::store::SqlValue;
    use crate::test_utils::*;

    #[test]
    fn creators_manage_their_projects() {
        let store = test_store();
        let config = CatalogConfig::default();
        let acl = Acl::new();
        let ctx = Ctx::new(&acl, Caller::user(4), &config);
        let project = create_project(&store, &ctx, "Kidney", true).unwrap().into_data();

        let acl = Acl::load(&store).unwrap();
        assert!(acl.is_manager(project, &Caller::user(4)));
        assert!(acl.is_blind_mode_active(project, &Caller::user(4)));

        let manager = Ctx::new(&acl, Caller::user(4), &config);
        add_project_member(&store, &manager, project, 5, false).unwrap();
        let acl = Acl::load(&store).unwrap();
        assert!(acl.can_read(Container::Project(project), &Caller::user(5)));

        let member = Ctx::new(&acl, Caller::user(5), &config);
        let err = add_project_member(&store, &member, project, 6, false).unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));
    }

    #[test]
    fn storage_owners_add_members() {
        let store = test_store();
        let config = CatalogConfig::default();
        let acl = Acl::new();
        let ctx = Ctx::new(&acl, Caller::user(1), &config);
        let storage = create_storage(&store, &ctx, "scanner").unwrap().into_data();
        assert_eq!(cell(&store, "storage", "user_id", storage), SqlValue::Integer(1));

        let acl = Acl::load(&store).unwrap();
        let owner = Ctx::new(&acl, Caller::user(1), &config);
        add_storage_member(&store, &owner, storage, 2, false).unwrap();
        add_storage_member(&store, &owner, storage, 2, true).unwrap();
        assert_eq!(count(&store, "storage_member"), 1);

        let acl = Acl::load(&store).unwrap();
        assert!(acl.can_write(Container::Storage(storage), &Caller::user(2)));
    }

    #[test]
    fn blank_names_are_rejected() {
        let store = test_store();
        let config = CatalogConfig::default();
        let acl = Acl::new();
        let ctx = Ctx::new(&acl, Caller::user(1), &config);
        let err = create_project(&store, &ctx, "  ", false).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }
}
