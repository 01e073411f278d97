//! Edits of root images and instances.
//!
//! Update structs use `Option<Option<T>>`: `None` leaves the column alone,
//! `Some(None)` clears it.

use super::helpers::{
    fetch_instance, fetch_root_image, readable_instance, visible_instance, writable_root_image,
};
use super::propagate::{on_root_image_updated, PropagationReport};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, CalibrationSource, Id, ProjectInstance, RootImage};
use crate::store::{Executor, Params, SqlValue};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootImageUpdate {
    pub magnification: Option<Option<i32>>,
    pub physical_size_x: Option<Option<f64>>,
    pub physical_size_y: Option<Option<f64>>,
    pub physical_size_z: Option<Option<f64>>,
    pub fps: Option<Option<f64>>,
    pub colorspace: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceUpdate {
    pub instance_filename: Option<Option<String>>,
    pub magnification: Option<Option<i32>>,
    pub physical_size_x: Option<Option<f64>>,
    pub physical_size_y: Option<Option<f64>>,
    pub physical_size_z: Option<Option<f64>>,
    pub fps: Option<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootImageUpdated {
    pub image: RootImage,
    pub propagation: PropagationReport,
}

/// Collects `column = :column` assignments. Columns are fixed names.
#[derive(Default)]
struct Assignments {
    columns: Vec<&'static str>,
    params: Params,
}

impl Assignments {
    fn set<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<Option<T>>) {
        if let Some(value) = value {
            self.columns.push(column);
            self.params.insert(column.to_string(), value.into());
        }
    }

    fn set_value(&mut self, column: &'static str, value: SqlValue) {
        self.columns.push(column);
        self.params.insert(column.to_string(), value);
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn apply<E: Executor>(mut self, exec: &E, table: &str, id: Id) -> Result<usize> {
        self.set_value("updated", now_millis().into());
        self.params.insert("id".to_string(), id.into());
        let set = self
            .columns
            .iter()
            .map(|column| format!("{} = :{}", column, column))
            .collect::<Vec<_>>()
            .join(", ");
        exec.execute(
            &format!("UPDATE {} SET {} WHERE id = :id", table, set),
            &self.params,
        )
    }
}

/// Update a root image and propagate calibration changes to its instances.
pub fn update_root_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
    update: RootImageUpdate,
) -> Result<CmdResult<RootImageUpdated>> {
    let old = writable_root_image(exec, ctx, id)?;

    let mut assignments = Assignments::default();
    assignments.set("magnification", update.magnification);
    assignments.set("physical_size_x", update.physical_size_x);
    assignments.set("physical_size_y", update.physical_size_y);
    assignments.set("physical_size_z", update.physical_size_z);
    assignments.set("fps", update.fps);
    assignments.set("colorspace", update.colorspace);
    if assignments.is_empty() {
        return Ok(CmdResult::new(RootImageUpdated {
            image: old,
            propagation: PropagationReport::default(),
        })
        .with_message(CmdMessage::info("Nothing to update")));
    }
    assignments.apply(exec, "root_image", id)?;

    let new = fetch_root_image(exec, id)?;
    let propagation = on_root_image_updated(exec, ctx.config.calibration_mode, &old, &new)?;
    info!(image = id, "root image updated");

    let mut result = CmdResult::new(RootImageUpdated {
        image: new,
        propagation,
    });
    result.add_message(CmdMessage::success(format!("Updated root image {}", id)));
    if propagation.total() > 0 {
        result.add_message(CmdMessage::info(format!(
            "Propagated to {} instance value(s)",
            propagation.total()
        )));
    }
    Ok(result)
}

/// Update an instance. Writing a calibration value marks it overridden, so
/// later root edits leave it alone under explicit-source propagation.
pub fn update_instance<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    id: Id,
    update: InstanceUpdate,
) -> Result<CmdResult<ProjectInstance>> {
    let instance = readable_instance(exec, ctx, id)?;
    ctx.check_write(instance.container())?;

    if let Some(Some(name)) = &update.instance_filename {
        if name.trim().is_empty() {
            return Err(CatalogError::InvalidArgument(
                "instance filename cannot be blank".to_string(),
            ));
        }
    }

    let overridden = SqlValue::from(CalibrationSource::Overridden.as_str());
    let mut assignments = Assignments::default();
    if update.magnification.is_some() {
        assignments.set_value("magnification_source", overridden.clone());
    }
    if update.physical_size_x.is_some() {
        assignments.set_value("physical_size_x_source", overridden);
    }
    assignments.set("instance_filename", update.instance_filename);
    assignments.set("magnification", update.magnification);
    assignments.set("physical_size_x", update.physical_size_x);
    assignments.set("physical_size_y", update.physical_size_y);
    assignments.set("physical_size_z", update.physical_size_z);
    assignments.set("fps", update.fps);
    if assignments.is_empty() {
        return Ok(CmdResult::new(visible_instance(ctx, instance))
            .with_message(CmdMessage::info("Nothing to update")));
    }
    assignments.apply(exec, "project_instance", id)?;
    info!(instance = id, "instance updated");

    Ok(CmdResult::new(visible_instance(ctx, fetch_instance(exec, id)?))
        .with_message(CmdMessage::success(format!("Updated instance {}", id))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::config::{CalibrationMode, CatalogConfig};
    use crate::model::Caller;
    use crate::test_utils::*;

    #[test]
    fn root_update_propagates_inside_the_same_call() {
        let store = test_store();
        let storage = seed_storage(&store, 1);
        let image = seed_root_image(&store, Some(storage), "a.tif");
        seed_root_calibration(&store, image, Some(40), Some(0.5));
        let p1 = seed_project(&store, "P1", false);
        let p2 = seed_project(&store, "P2", false);
        let tracking = seed_instance(&store, p1, image, 1);
        let diverged = seed_instance(&store, p2, image, 1);
        seed_instance_calibration(&store, diverged, Some(100), Some(0.5));

        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(1), &config);
        let update = RootImageUpdate {
            magnification: Some(None),
            ..Default::default()
        };
        let result = update_root_image(&store, &ctx, image, update).unwrap();
        assert_eq!(result.data.image.magnification, None);
        assert_eq!(result.data.propagation.magnification, 1);
        assert_eq!(result.data.propagation.physical_size_x, 0);

        assert_eq!(cell(&store, "project_instance", "magnification", tracking), SqlValue::Null);
        assert_eq!(
            cell(&store, "project_instance", "magnification", diverged),
            SqlValue::Integer(100)
        );
        assert_eq!(
            cell(&store, "project_instance", "physical_size_x", tracking),
            SqlValue::Real(0.5)
        );
    }

    #[test]
    fn root_update_requires_write_access() {
        let store = test_store();
        let storage = seed_storage(&store, 1);
        seed_storage_member(&store, storage, 2, false);
        let image = seed_root_image(&store, Some(storage), "a.tif");
        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig::default();

        let reader = Ctx::new(&acl, Caller::user(2), &config);
        let update = RootImageUpdate {
            magnification: Some(Some(20)),
            ..Default::default()
        };
        let err = update_root_image(&store, &reader, image, update.clone()).unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let stranger = Ctx::new(&acl, Caller::user(3), &config);
        let err = update_root_image(&store, &stranger, image, update).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn instance_writes_mark_overrides() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        seed_root_calibration(&store, image, Some(40), None);
        let project = seed_project(&store, "P1", false);
        seed_member(&store, project, 2, false);
        let instance = seed_instance(&store, project, image, 2);

        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig {
            calibration_mode: CalibrationMode::ExplicitSource,
            ..CatalogConfig::default()
        };
        let member = Ctx::new(&acl, Caller::user(2), &config);
        let update = InstanceUpdate {
            magnification: Some(Some(40)),
            instance_filename: Some(Some("renamed.tif".into())),
            ..Default::default()
        };
        let updated = update_instance(&store, &member, instance, update).unwrap().into_data();
        assert_eq!(updated.magnification_source, CalibrationSource::Overridden);
        assert_eq!(updated.physical_size_x_source, CalibrationSource::Inherited);
        assert_eq!(updated.instance_filename.as_deref(), Some("renamed.tif"));

        let admin = Ctx::new(&acl, Caller::admin(9), &config);
        let update = RootImageUpdate {
            magnification: Some(Some(20)),
            ..Default::default()
        };
        let result = update_root_image(&store, &admin, image, update).unwrap();
        assert_eq!(result.data.propagation.magnification, 0);
        assert_eq!(
            cell(&store, "project_instance", "magnification", instance),
            SqlValue::Integer(40)
        );
    }

    #[test]
    fn read_only_projects_reject_instance_edits() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let project = seed_project(&store, "P1", false);
        seed_member(&store, project, 2, false);
        let instance = seed_instance(&store, project, image, 2);
        let acl = Acl::load(&store).unwrap().with_read_only(project);
        let config = CatalogConfig::default();

        let member = Ctx::new(&acl, Caller::user(2), &config);
        let update = InstanceUpdate {
            fps: Some(Some(25.0)),
            ..Default::default()
        };
        let err = update_instance(&store, &member, instance, update).unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));
    }

    #[test]
    fn empty_updates_change_nothing() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let acl = Acl::new();
        let config = CatalogConfig::default();
        let admin = Ctx::new(&acl, Caller::admin(9), &config);
        let result = update_root_image(&store, &admin, image, RootImageUpdate::default()).unwrap();
        assert_eq!(result.data.image.updated, None);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn blind_renames_come_back_redacted() {
        let store = test_store();
        let image = seed_root_image(&store, None, "patient-smith.svs");
        let project = seed_project(&store, "Blind", true);
        seed_member(&store, project, 2, false);
        seed_member(&store, project, 3, true);
        let instance = seed_instance(&store, project, image, 2);
        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig::default();

        let member = Ctx::new(&acl, Caller::user(2), &config);
        let rename = InstanceUpdate {
            instance_filename: Some(Some("patient-smith-override".into())),
            ..Default::default()
        };
        let updated = update_instance(&store, &member, instance, rename).unwrap().into_data();
        assert_eq!(updated.instance_filename, Some(image.to_string()));
        assert_eq!(updated.blinded_name, Some(image.to_string()));
        assert!(!serde_json::to_string(&updated).unwrap().contains("patient-smith"));

        let unchanged = update_instance(&store, &member, instance, InstanceUpdate::default())
            .unwrap()
            .into_data();
        assert_eq!(unchanged.instance_filename, Some(image.to_string()));

        let manager = Ctx::new(&acl, Caller::user(3), &config);
        let seen = update_instance(&store, &manager, instance, InstanceUpdate::default())
            .unwrap()
            .into_data();
        assert_eq!(seen.instance_filename.as_deref(), Some("patient-smith-override"));
        assert_eq!(seen.blinded_name, Some(image.to_string()));
    }
}
