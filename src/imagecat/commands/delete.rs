//! Usage-guarded deletion.
//!
//! Removing a root image or a plane runs in two phases. The guard collects
//! every live instance still using the entity and refuses with
//! [`CatalogError::Conflict`] naming them. Otherwise the dependents are removed
//! leaves first, so foreign keys hold at every step. The API facade runs both
//! phases in one immediate transaction.
//!
//! Instances themselves are soft-deleted; [`purge_instance`] hard-deletes one
//! that is already in the deleted state.

use super::helpers::{
    display_name, fetch_instance, fetch_plane, instances_of_root, project_names,
    readable_instance, visible_instance, writable_root_image,
};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, AttachmentDomain, Id, InstanceState, ProjectInstance};
use crate::store::{bind, Executor, Params};
use serde::Serialize;
use tracing::info;

/// Rows removed by a deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub root_images: usize,
    pub planes: usize,
    pub instances: usize,
    pub plane_instances: usize,
    pub tag_links: usize,
    pub companion_files: usize,
    pub attached_files: usize,
    pub nested_instances: usize,
}

/// Conflict naming the projects of `instances` (first seen first) and the
/// distinct `names`.
fn conflict<E: Executor>(
    exec: &E,
    instances: &[ProjectInstance],
    names: Vec<String>,
) -> Result<CatalogError> {
    let mut project_ids: Vec<Id> = Vec::new();
    for instance in instances {
        if !project_ids.contains(&instance.project_id) {
            project_ids.push(instance.project_id);
        }
    }
    let lookup = project_names(exec, &project_ids)?;
    let projects = project_ids
        .iter()
        .map(|id| lookup.get(id).cloned().unwrap_or_else(|| id.to_string()))
        .collect();

    let mut distinct: Vec<String> = Vec::new();
    for name in names {
        if !distinct.contains(&name) {
            distinct.push(name);
        }
    }
    Ok(CatalogError::Conflict {
        projects,
        names: distinct,
    })
}

fn attached<E: Executor>(exec: &E, domain: AttachmentDomain, ids_sql: &str, params: &Params) -> Result<usize> {
    let mut params = params.clone();
    params.insert("domain".to_string(), domain.as_str().into());
    exec.execute(
        &format!(
            "DELETE FROM attached_file WHERE domain_kind = :domain AND domain_id IN ({})",
            ids_sql
        ),
        &params,
    )
}

/// Remove a root image and everything hanging off it, unless a live
/// instance still uses it.
pub fn delete_root_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<CmdResult<DeletionReport>> {
    let image = writable_root_image(exec, ctx, id)?;

    let live = instances_of_root(exec, id, true)?;
    if !live.is_empty() {
        let names = live.iter().map(|i| display_name(i, &image)).collect();
        return Err(conflict(exec, &live, names)?);
    }

    let params = bind([("image", id.into())]);
    let instances = "SELECT id FROM project_instance WHERE base_image_id = :image";
    let planes = "SELECT id FROM plane WHERE root_image_id = :image";
    let mut report = DeletionReport::default();

    report.plane_instances = exec.execute(
        &format!(
            "DELETE FROM plane_instance WHERE instance_id IN ({}) OR plane_id IN ({})",
            instances, planes
        ),
        &params,
    )?;
    report.tag_links = exec.execute(
        &format!("DELETE FROM tag_link WHERE instance_id IN ({})", instances),
        &params,
    )?;
    report.attached_files += attached(exec, AttachmentDomain::ProjectInstance, instances, &params)?;
    report.nested_instances = exec.execute(
        &format!(
            "DELETE FROM nested_instance WHERE parent_id IN ({}) OR base_image_id = :image",
            instances
        ),
        &params,
    )?;
    report.instances = exec.execute(
        "DELETE FROM project_instance WHERE base_image_id = :image",
        &params,
    )?;
    report.attached_files += attached(exec, AttachmentDomain::Plane, planes, &params)?;
    report.planes = exec.execute("DELETE FROM plane WHERE root_image_id = :image", &params)?;
    report.companion_files = exec.execute(
        "DELETE FROM companion_file WHERE root_image_id = :image",
        &params,
    )?;
    report.attached_files += exec.execute(
        "DELETE FROM attached_file WHERE domain_kind = :domain AND domain_id = :image",
        &bind([
            ("domain", AttachmentDomain::RootImage.as_str().into()),
            ("image", id.into()),
        ]),
    )?;
    report.root_images = exec.execute("DELETE FROM root_image WHERE id = :image", &params)?;

    info!(image = id, ?report, "root image deleted");
    Ok(CmdResult::new(report).with_message(CmdMessage::success(format!(
        "Deleted root image {} ({})",
        id, image.original_filename
    ))))
}

/// Remove a plane unless a live instance still binds it.
pub fn delete_plane<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<CmdResult<DeletionReport>> {
    let plane = fetch_plane(exec, id)?;
    let image = writable_root_image(exec, ctx, plane.root_image_id)?;

    let users = exec
        .query(
            "SELECT ii.* FROM plane_instance pi JOIN project_instance ii ON ii.id = pi.instance_id \
             WHERE pi.plane_id = :plane AND ii.state <> :deleted ORDER BY ii.id",
            &bind([
                ("plane", id.into()),
                ("deleted", InstanceState::Deleted.as_str().into()),
            ]),
        )?
        .iter()
        .map(ProjectInstance::from_row)
        .collect::<Result<Vec<_>>>()?;
    if !users.is_empty() {
        return Err(conflict(exec, &users, vec![image.original_filename])?);
    }

    let params = bind([("plane", id.into())]);
    let mut report = DeletionReport::default();
    report.plane_instances = exec.execute("DELETE FROM plane_instance WHERE plane_id = :plane", &params)?;
    report.attached_files = attached(exec, AttachmentDomain::Plane, ":plane", &params)?;
    report.planes = exec.execute("DELETE FROM plane WHERE id = :plane", &params)?;

    info!(plane = id, coordinate = %plane.coordinate, "plane deleted");
    Ok(CmdResult::new(report).with_message(CmdMessage::success(format!(
        "Deleted plane {} of root image {}",
        plane.coordinate, plane.root_image_id
    ))))
}

/// Soft-delete a live instance. Attaching the same image again restores it.
pub fn delete_instance<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<CmdResult<ProjectInstance>> {
    let instance = readable_instance(exec, ctx, id)?;
    ctx.check_write(instance.container())?;

    exec.execute(
        "UPDATE project_instance SET state = :state, deleted = :now WHERE id = :id",
        &bind([
            ("state", InstanceState::Deleted.as_str().into()),
            ("now", now_millis().into()),
            ("id", id.into()),
        ]),
    )?;
    info!(instance = id, project = instance.project_id, "instance deleted");
    Ok(CmdResult::new(visible_instance(ctx, fetch_instance(exec, id)?))
        .with_message(CmdMessage::success(format!("Deleted instance {}", id))))
}

/// Hard-delete an instance that is already soft-deleted.
pub fn purge_instance<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
) -> Result<CmdResult<DeletionReport>> {
    let instance = fetch_instance(exec, id)?;
    ctx.check_read(instance.container(), "project instance", id)?;
    ctx.check_write(instance.container())?;
    if instance.state.is_live() {
        return Err(CatalogError::InvalidArgument(format!(
            "instance {} is {}; delete it before purging",
            id,
            instance.state.as_str()
        )));
    }

    let params = bind([("instance", id.into())]);
    let mut report = DeletionReport::default();
    report.plane_instances = exec.execute(
        "DELETE FROM plane_instance WHERE instance_id = :instance",
        &params,
    )?;
    report.tag_links = exec.execute("DELETE FROM tag_link WHERE instance_id = :instance", &params)?;
    report.attached_files = attached(exec, AttachmentDomain::ProjectInstance, ":instance", &params)?;
    report.nested_instances = exec.execute(
        "DELETE FROM nested_instance WHERE parent_id = :instance",
        &params,
    )?;
    report.instances = exec.execute("DELETE FROM project_instance WHERE id = :instance", &params)?;

    info!(instance = id, "instance purged");
    Ok(CmdResult::new(report).with_message(CmdMessage::success(format!("Purged instance {}", id))))
}
