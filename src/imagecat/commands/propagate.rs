//! Calibration propagation from a root image to its instances.
//!
//! Instances carry their own `magnification` and `physical_size_x`. When the
//! root value changes, instances still tracking it follow; instances that
//! diverged keep their value. What "still tracking" means depends on
//! [`CalibrationMode`]:
//!
//! - `ValueEquality`: the instance value is null-safe equal to the old root
//!   value.
//! - `ExplicitSource`: the instance's `<attr>_source` column says `inherited`.
//!
//! Runs inside the caller's transaction, right after the root update.

use crate::config::CalibrationMode;
use crate::error::Result;
use crate::model::{CalibrationSource, RootImage};
use crate::store::{bind, Executor, SqlValue};
use serde::Serialize;
use tracing::info;

/// Instances rewritten per attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationReport {
    pub magnification: usize,
    pub physical_size_x: usize,
}

impl PropagationReport {
    pub fn total(&self) -> usize {
        self.magnification + self.physical_size_x
    }
}

pub fn on_root_image_updated<E: Executor>(
    exec: &E,
    mode: CalibrationMode,
    old: &RootImage,
    new: &RootImage,
) -> Result<PropagationReport> {
    let mut report = PropagationReport::default();
    if old.magnification != new.magnification {
        report.magnification = propagate(
            exec,
            mode,
            new.id,
            "magnification",
            old.magnification.into(),
            new.magnification.into(),
        )?;
    }
    if old.physical_size_x != new.physical_size_x {
        report.physical_size_x = propagate(
            exec,
            mode,
            new.id,
            "physical_size_x",
            old.physical_size_x.into(),
            new.physical_size_x.into(),
        )?;
    }
    if report.total() > 0 {
        info!(
            image = new.id,
            magnification = report.magnification,
            physical_size_x = report.physical_size_x,
            "calibration propagated"
        );
    }
    Ok(report)
}

/// `column` is one of the two calibration columns, never caller input.
fn propagate<E: Executor>(
    exec: &E,
    mode: CalibrationMode,
    image: i64,
    column: &'static str,
    old: SqlValue,
    new: SqlValue,
) -> Result<usize> {
    match mode {
        CalibrationMode::ValueEquality => exec.execute(
            &format!(
                "UPDATE project_instance SET {col} = :new WHERE base_image_id = :image AND {col} IS :old",
                col = column
            ),
            &bind([("new", new), ("image", image.into()), ("old", old)]),
        ),
        CalibrationMode::ExplicitSource => exec.execute(
            &format!(
                "UPDATE project_instance SET {col} = :new \
                 WHERE base_image_id = :image AND {col}_source = :inherited",
                col = column
            ),
            &bind([
                ("new", new),
                ("image", image.into()),
                ("inherited", CalibrationSource::Inherited.as_str().into()),
            ]),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::helpers::fetch_root_image;
    use crate::test_utils::*;

    fn with_root_magnification(image: &RootImage, magnification: Option<i32>) -> RootImage {
        RootImage {
            magnification,
            ..image.clone()
        }
    }

    #[test]
    fn matching_instances_follow_the_root() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        seed_root_calibration(&store, image, Some(40), None);
        let p1 = seed_project(&store, "P1", false);
        let p2 = seed_project(&store, "P2", false);
        let tracking = seed_instance(&store, p1, image, 1);
        let diverged = seed_instance(&store, p2, image, 1);
        seed_instance_calibration(&store, diverged, Some(100), None);

        let old = fetch_root_image(&store, image).unwrap();
        seed_root_calibration(&store, image, None, None);
        let new = with_root_magnification(&old, None);

        let report =
            on_root_image_updated(&store, CalibrationMode::ValueEquality, &old, &new).unwrap();
        assert_eq!(report.magnification, 1);
        assert_eq!(report.physical_size_x, 0);
        assert_eq!(cell(&store, "project_instance", "magnification", tracking), SqlValue::Null);
        assert_eq!(
            cell(&store, "project_instance", "magnification", diverged),
            SqlValue::Integer(100)
        );

        let again = on_root_image_updated(&store, CalibrationMode::ValueEquality, &new, &new).unwrap();
        assert_eq!(again, PropagationReport::default());
        assert_eq!(
            cell(&store, "project_instance", "magnification", diverged),
            SqlValue::Integer(100)
        );
    }

    #[test]
    fn null_old_values_match_null_instances() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let project = seed_project(&store, "P1", false);
        let instance = seed_instance(&store, project, image, 1);

        let old = fetch_root_image(&store, image).unwrap();
        let new = RootImage {
            physical_size_x: Some(0.25),
            ..old.clone()
        };
        let report =
            on_root_image_updated(&store, CalibrationMode::ValueEquality, &old, &new).unwrap();
        assert_eq!(report.physical_size_x, 1);
        assert_eq!(
            cell(&store, "project_instance", "physical_size_x", instance),
            SqlValue::Real(0.25)
        );
    }

    #[test]
    fn explicit_source_keeps_overrides_with_equal_values() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        seed_root_calibration(&store, image, Some(40), None);
        let p1 = seed_project(&store, "P1", false);
        let p2 = seed_project(&store, "P2", false);
        let inherited = seed_instance(&store, p1, image, 1);
        let pinned = seed_instance(&store, p2, image, 1);
        store
            .execute(
                "UPDATE project_instance SET magnification_source = 'overridden' WHERE id = :id",
                &bind([("id", pinned.into())]),
            )
            .unwrap();

        let old = fetch_root_image(&store, image).unwrap();
        let new = with_root_magnification(&old, Some(20));
        let report =
            on_root_image_updated(&store, CalibrationMode::ExplicitSource, &old, &new).unwrap();
        assert_eq!(report.magnification, 1);
        assert_eq!(
            cell(&store, "project_instance", "magnification", inherited),
            SqlValue::Integer(20)
        );
        assert_eq!(
            cell(&store, "project_instance", "magnification", pinned),
            SqlValue::Integer(40)
        );
    }

    #[test]
    fn other_root_images_are_untouched() {
        let store = test_store();
        let a = seed_root_image(&store, None, "a.tif");
        let b = seed_root_image(&store, None, "b.tif");
        seed_root_calibration(&store, a, Some(40), None);
        seed_root_calibration(&store, b, Some(40), None);
        let project = seed_project(&store, "P1", false);
        let other = seed_instance(&store, project, b, 1);

        let old = fetch_root_image(&store, a).unwrap();
        let new = with_root_magnification(&old, Some(10));
        on_root_image_updated(&store, CalibrationMode::ValueEquality, &old, &new).unwrap();
        assert_eq!(
            cell(&store, "project_instance", "magnification", other),
            SqlValue::Integer(40)
        );
    }
}
