//! Binding root images into projects.
//!
//! A project holds at most one live instance per root image:
//!
//! ```text
//! (none)  --attach--> Active
//! Deleted --attach--> Restored
//! Active | Restored --attach--> AlreadyExists
//! ```
//!
//! Restoring revives the old row, keeping its name, counters and calibration.

use super::helpers::{
    fetch_instance, planes_of, readable_project, readable_root_image, visible_instance,
};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, Container, Id, InstanceState, ProjectInstance, RootImage};
use crate::query::Visibility;
use crate::store::{bind, Executor};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachOutcome {
    Created,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attached {
    pub instance: ProjectInstance,
    pub outcome: AttachOutcome,
    /// Plane instances the instance has after attaching.
    pub plane_instances: usize,
}

pub fn attach_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
    image: Id,
) -> Result<CmdResult<Attached>> {
    let target = readable_project(exec, ctx, project)?;
    ctx.check_write(Container::Project(project))?;
    let root = readable_root_image(exec, ctx, image)?;

    let existing = exec
        .query(
            "SELECT * FROM project_instance WHERE project_id = :project AND base_image_id = :image \
             ORDER BY id DESC",
            &bind([("project", project.into()), ("image", image.into())]),
        )?
        .iter()
        .map(ProjectInstance::from_row)
        .collect::<Result<Vec<_>>>()?;

    if let Some(live) = existing.iter().find(|i| i.state.is_live()) {
        return Err(CatalogError::AlreadyExists(format!(
            "root image {} is already in project '{}' as instance {}",
            image, target.name, live.id
        )));
    }

    let (id, outcome) = match existing.first() {
        Some(deleted) => (restore(exec, deleted.id)?, AttachOutcome::Restored),
        None => (create(exec, ctx, project, &root)?, AttachOutcome::Created),
    };
    let plane_instances = bind_planes(exec, id, project, image)?;
    let instance = visible_instance(ctx, fetch_instance(exec, id)?);
    info!(instance = id, project, image, ?outcome, "image attached");

    let verb = match outcome {
        AttachOutcome::Created => "Attached",
        AttachOutcome::Restored => "Restored",
    };
    let shown = match Visibility::of(ctx.permissions, project, &ctx.caller) {
        Visibility::Redacted => format!("image {}", root.id),
        _ => root.original_filename.clone(),
    };
    Ok(CmdResult::new(Attached {
        instance,
        outcome,
        plane_instances,
    })
    .with_message(CmdMessage::success(format!(
        "{} {} in project '{}'",
        verb, shown, target.name
    ))))
}

fn create<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
    root: &RootImage,
) -> Result<Id> {
    exec.insert(
        "INSERT INTO project_instance \
         (base_image_id, project_id, user_id, magnification, physical_size_x, physical_size_y, \
          physical_size_z, fps, state, created) \
         VALUES (:image, :project, :user, :mag, :psx, :psy, :psz, :fps, :state, :now) RETURNING id",
        &bind([
            ("image", root.id.into()),
            ("project", project.into()),
            ("user", ctx.caller.id.into()),
            ("mag", root.magnification.into()),
            ("psx", root.physical_size_x.into()),
            ("psy", root.physical_size_y.into()),
            ("psz", root.physical_size_z.into()),
            ("fps", root.fps.into()),
            ("state", InstanceState::Active.as_str().into()),
            ("now", now_millis().into()),
        ]),
    )
}

fn restore<E: Executor>(exec: &E, id: Id) -> Result<Id> {
    exec.execute(
        "UPDATE project_instance SET state = :state, deleted = NULL, updated = :now WHERE id = :id",
        &bind([
            ("state", InstanceState::Restored.as_str().into()),
            ("now", now_millis().into()),
            ("id", id.into()),
        ]),
    )?;
    Ok(id)
}

/// One plane instance per plane of the image; existing ones are kept.
fn bind_planes<E: Executor>(exec: &E, instance: Id, project: Id, image: Id) -> Result<usize> {
    for plane in planes_of(exec, image)? {
        exec.execute(
            "INSERT OR IGNORE INTO plane_instance (plane_id, instance_id, project_id) \
             VALUES (:plane, :instance, :project)",
            &bind([
                ("plane", plane.id.into()),
                ("instance", instance.into()),
                ("project", project.into()),
            ]),
        )?;
    }
    let row = exec.query_opt(
        "SELECT COUNT(*) AS n FROM plane_instance WHERE instance_id = :instance",
        &bind([("instance", instance.into())]),
    )?;
    let n = row.map(|r| r.i64("n")).transpose()?.unwrap_or(0);
    Ok(usize::try_from(n).unwrap_or(0))
}
