//! Reference plane lookups for root images and instances.

use super::helpers::{planes_of, readable_instance, readable_root_image};
use super::{CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{Coordinate, Id, Plane, PlaneInstance};
use crate::reference::{self, Axes};
use crate::store::{bind, Executor};
use tracing::debug;

fn reference_plane<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    image: Id,
) -> Result<Plane> {
    let planes = planes_of(exec, image)?;
    let coordinates: Vec<Coordinate> = planes.iter().map(|p| p.coordinate).collect();
    let target = reference::resolve(&coordinates, ctx.config.reference_fallback)?;
    debug!(image, coordinate = %target, "reference plane resolved");
    planes
        .into_iter()
        .find(|p| p.coordinate == target)
        .ok_or_else(|| CatalogError::not_found("plane", target))
}

/// The reference plane of a readable root image.
pub fn get_reference_plane<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    image: Id,
) -> Result<CmdResult<Plane>> {
    readable_root_image(exec, ctx, image)?;
    Ok(CmdResult::new(reference_plane(exec, ctx, image)?))
}

/// The plane instance of an instance's reference plane.
pub fn get_reference_slice<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    instance: Id,
) -> Result<CmdResult<PlaneInstance>> {
    let bound = readable_instance(exec, ctx, instance)?;
    let plane = reference_plane(exec, ctx, bound.base_image_id)?;

    let row = exec
        .query_opt(
            "SELECT pi.id AS id, pi.plane_id AS plane_id, pi.instance_id AS instance_id, \
             pi.project_id AS project_id, p.channel AS channel, p.z_stack AS z_stack, p.time AS time \
             FROM plane_instance pi JOIN plane p ON p.id = pi.plane_id \
             WHERE pi.instance_id = :instance AND pi.plane_id = :plane",
            &bind([("instance", instance.into()), ("plane", plane.id.into())]),
        )?
        .ok_or_else(|| CatalogError::not_found("plane instance", plane.coordinate))?;
    Ok(CmdResult::new(PlaneInstance::from_row(&row)?))
}

/// The distinct sorted channel, z and time values of a readable root image.
pub fn axis_coordinates<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    image: Id,
) -> Result<CmdResult<Axes>> {
    readable_root_image(exec, ctx, image)?;
    let planes = planes_of(exec, image)?;
    Ok(CmdResult::new(Axes::from_coordinates(
        planes.iter().map(|p| &p.coordinate),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::config::{CatalogConfig, ReferenceFallback};
    use crate::model::Caller;
    use crate::test_utils::*;

    #[test]
    fn slice_of_a_three_channel_image() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        for channel in 0..3 {
            seed_plane(&store, image, channel, 0, 0);
        }
        let project = seed_project(&store, "P1", false);
        seed_member(&store, project, 2, false);
        let instance = seed_instance(&store, project, image, 2);
        let acl = Acl::load(&store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(2), &config);

        let slice = get_reference_slice(&store, &ctx, instance).unwrap().into_data();
        assert_eq!(slice.coordinate, Coordinate::new(1, 0, 0));
        assert_eq!(slice.instance_id, instance);
        assert_eq!(slice.project_id, project);

        let plane = get_reference_plane(&store, &ctx, image).unwrap().into_data();
        assert_eq!(plane.id, slice.plane_id);

        let axes = axis_coordinates(&store, &ctx, image).unwrap().into_data();
        assert_eq!(axes.channels, vec![0, 1, 2]);
        assert_eq!(axes.z_stacks, vec![0]);
    }

    #[test]
    fn images_without_planes_have_no_reference() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let acl = Acl::new();
        let config = CatalogConfig::default();
        let admin = Ctx::new(&acl, Caller::admin(9), &config);

        let err = get_reference_plane(&store, &admin, image).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[test]
    fn ragged_axes_follow_the_fallback() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        seed_plane(&store, image, 0, 0, 0);
        seed_plane(&store, image, 0, 1, 0);
        seed_plane(&store, image, 1, 0, 0);
        let acl = Acl::new();

        let strict = CatalogConfig::default();
        let admin = Ctx::new(&acl, Caller::admin(9), &strict);
        let err = get_reference_plane(&store, &admin, image).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { kind: "plane", .. }));

        let nearest = CatalogConfig {
            reference_fallback: ReferenceFallback::Nearest,
            ..CatalogConfig::default()
        };
        let admin = Ctx::new(&acl, Caller::admin(9), &nearest);
        let plane = get_reference_plane(&store, &admin, image).unwrap().into_data();
        assert_eq!(plane.coordinate, Coordinate::new(0, 1, 0));
    }

    #[test]
    fn missing_plane_instances_are_not_found() {
        let store = test_store();
        let image = seed_root_image(&store, None, "a.tif");
        let project = seed_project(&store, "P1", false);
        let instance = seed_instance(&store, project, image, 1);
        seed_plane(&store, image, 0, 0, 0);
        let acl = Acl::new();
        let config = CatalogConfig::default();
        let admin = Ctx::new(&acl, Caller::admin(9), &config);

        let err = get_reference_slice(&store, &admin, instance).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { kind: "plane instance", .. }));
    }
}
