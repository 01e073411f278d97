//! Shared lookups: entities by id with their access checks, and the
//! dependents of a root image that propagation and deletion both walk.

use super::Ctx;
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{Container, Id, InstanceState, Plane, Project, ProjectInstance, RootImage};
use crate::query::expr::ParamSink;
use crate::query::Visibility;
use crate::store::{bind, Executor, Params, SqlValue};
use std::collections::BTreeMap;

/// `(:prefix0, :prefix1, ...)` with the ids bound under those names.
pub fn id_list(prefix: &'static str, ids: &[Id]) -> (String, Params) {
    let mut sink = ParamSink::new(prefix);
    let placeholders: Vec<String> = ids.iter().map(|id| sink.push(SqlValue::Integer(*id))).collect();
    (format!("({})", placeholders.join(", ")), sink.into_params())
}

pub fn fetch_project<E: Executor>(exec: &E, id: Id) -> Result<Project> {
    let row = exec
        .query_opt(
            "SELECT id, name, blind_mode, read_only FROM project WHERE id = :id",
            &bind([("id", id.into())]),
        )?
        .ok_or_else(|| CatalogError::not_found("project", id))?;
    Project::from_row(&row)
}

/// A project the caller can read.
pub fn readable_project<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<Project> {
    let project = fetch_project(exec, id)?;
    ctx.check_read(Container::Project(id), "project", id)?;
    Ok(project)
}

pub fn fetch_root_image<E: Executor>(exec: &E, id: Id) -> Result<RootImage> {
    let row = exec
        .query_opt("SELECT * FROM root_image WHERE id = :id", &bind([("id", id.into())]))?
        .ok_or_else(|| CatalogError::not_found("root image", id))?;
    RootImage::from_row(&row)
}

/// The storage holding a root image's file, if it has one.
pub fn root_image_storage<E: Executor>(exec: &E, image: &RootImage) -> Result<Option<Id>> {
    let Some(stored_file) = image.stored_file_id else {
        return Ok(None);
    };
    let row = exec.query_opt(
        "SELECT storage_id FROM stored_file WHERE id = :id",
        &bind([("id", stored_file.into())]),
    )?;
    row.map(|r| r.i64("storage_id")).transpose()
}

/// A root image is readable through its storage, or through any project that
/// holds a live instance of it.
pub fn readable_root_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<RootImage> {
    let image = fetch_root_image(exec, id)?;
    if ctx.caller.is_admin() {
        return Ok(image);
    }
    if let Some(storage) = root_image_storage(exec, &image)? {
        if ctx.can_read(Container::Storage(storage)) {
            return Ok(image);
        }
    }
    let readable = instances_of_root(exec, id, true)?
        .iter()
        .any(|instance| ctx.can_read(instance.container()));
    if readable {
        Ok(image)
    } else {
        Err(CatalogError::not_found("root image", id))
    }
}

/// A root image the caller can modify: through a writable storage, or as its
/// uploader.
pub fn writable_root_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<RootImage> {
    let image = readable_root_image(exec, ctx, id)?;
    if ctx.caller.is_admin() || image.user_id == Some(ctx.caller.id) {
        return Ok(image);
    }
    match root_image_storage(exec, &image)? {
        Some(storage) => {
            ctx.check_write(Container::Storage(storage))?;
            Ok(image)
        }
        None => Err(CatalogError::Forbidden(format!(
            "user {} cannot modify root image {}",
            ctx.caller.id, id
        ))),
    }
}

pub fn fetch_instance<E: Executor>(exec: &E, id: Id) -> Result<ProjectInstance> {
    let row = exec
        .query_opt(
            "SELECT * FROM project_instance WHERE id = :id",
            &bind([("id", id.into())]),
        )?
        .ok_or_else(|| CatalogError::not_found("project instance", id))?;
    ProjectInstance::from_row(&row)
}

/// A live instance the caller can read. Deleted instances are not found.
pub fn readable_instance<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<ProjectInstance> {
    let instance = fetch_instance(exec, id)?;
    if !instance.state.is_live() {
        return Err(CatalogError::not_found("project instance", id));
    }
    ctx.check_read(instance.container(), "project instance", id)?;
    Ok(instance)
}

/// An instance as the caller may see it: blind projects hide the real name
/// from non-managers.
pub fn visible_instance<P: Permissions>(
    ctx: &Ctx<'_, P>,
    instance: ProjectInstance,
) -> ProjectInstance {
    Visibility::of(ctx.permissions, instance.project_id, &ctx.caller).apply(instance)
}

pub fn fetch_plane<E: Executor>(exec: &E, id: Id) -> Result<Plane> {
    let row = exec
        .query_opt("SELECT * FROM plane WHERE id = :id", &bind([("id", id.into())]))?
        .ok_or_else(|| CatalogError::not_found("plane", id))?;
    Plane::from_row(&row)
}

pub fn planes_of<E: Executor>(exec: &E, image: Id) -> Result<Vec<Plane>> {
    exec.query(
        "SELECT * FROM plane WHERE root_image_id = :image ORDER BY channel, z_stack, time",
        &bind([("image", image.into())]),
    )?
    .iter()
    .map(Plane::from_row)
    .collect()
}

/// Instances bound to a root image, oldest first. `live_only` skips
/// deleted ones.
pub fn instances_of_root<E: Executor>(
    exec: &E,
    image: Id,
    live_only: bool,
) -> Result<Vec<ProjectInstance>> {
    let mut sql = String::from("SELECT * FROM project_instance WHERE base_image_id = :image");
    let mut params = bind([("image", image.into())]);
    if live_only {
        sql.push_str(" AND state <> :deleted");
        params.insert("deleted".to_string(), InstanceState::Deleted.as_str().into());
    }
    sql.push_str(" ORDER BY id");
    exec.query(&sql, &params)?
        .iter()
        .map(ProjectInstance::from_row)
        .collect()
}

/// Project names by id.
pub fn project_names<E: Executor>(exec: &E, ids: &[Id]) -> Result<BTreeMap<Id, String>> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    let (list, params) = id_list("project", ids);
    exec.query(&format!("SELECT id, name FROM project WHERE id IN {}", list), &params)?
        .iter()
        .map(|row| Ok((row.i64("id")?, row.text("name")?)))
        .collect()
}

/// The name an instance displays: its override, else the root filename.
pub fn display_name(instance: &ProjectInstance, image: &RootImage) -> String {
    instance
        .instance_filename
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&image.original_filename)
        .to_string()
}
