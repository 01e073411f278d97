//! Registering uploaded images: the stored file, the root image and its
//! planes.

use super::helpers::{fetch_root_image, planes_of, writable_root_image};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{now_millis, Container, Coordinate, Id, Plane, RootImage};
use crate::store::{bind, Executor};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Largest plane grid built implicitly. Bigger images list their planes.
pub const MAX_GRID_PLANES: i64 = 10_000;

/// A plane to create, with optional channel metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneSpec {
    pub coordinate: Coordinate,
    pub channel_name: Option<String>,
    pub channel_color: Option<String>,
}

impl PlaneSpec {
    pub fn at(channel: i32, z_stack: i32, time: i32) -> Self {
        Self {
            coordinate: Coordinate::new(channel, z_stack, time),
            channel_name: None,
            channel_color: None,
        }
    }
}

/// An uploaded image to register.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRootImage {
    pub storage: Id,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub depth: i32,
    pub duration: i32,
    pub channels: i32,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    pub fps: Option<f64>,
    pub bit_depth: Option<i32>,
    pub colorspace: Option<String>,
    pub magnification: Option<i32>,
    /// Explicit planes; `None` creates the full channel × depth × duration
    /// grid.
    pub planes: Option<Vec<PlaneSpec>>,
}

impl NewRootImage {
    pub fn new(storage: Id, filename: impl Into<String>) -> Self {
        Self {
            storage,
            filename: filename.into(),
            content_type: None,
            size: 0,
            width: None,
            height: None,
            depth: 1,
            duration: 1,
            channels: 1,
            physical_size_x: None,
            physical_size_y: None,
            physical_size_z: None,
            fps: None,
            bit_depth: None,
            colorspace: None,
            magnification: None,
            planes: None,
        }
    }

    fn grid(&self) -> Vec<PlaneSpec> {
        let mut planes = Vec::new();
        for channel in 0..self.channels {
            for z_stack in 0..self.depth {
                for time in 0..self.duration {
                    planes.push(PlaneSpec::at(channel, z_stack, time));
                }
            }
        }
        planes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingested {
    pub image: RootImage,
    pub stored_file: Id,
    pub planes: Vec<Plane>,
}

pub fn ingest_image<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    new: NewRootImage,
) -> Result<CmdResult<Ingested>> {
    let storage = exec.query_opt(
        "SELECT id FROM storage WHERE id = :id",
        &bind([("id", new.storage.into())]),
    )?;
    if storage.is_none() {
        return Err(CatalogError::not_found("storage", new.storage));
    }
    ctx.check_read(Container::Storage(new.storage), "storage", new.storage)?;
    ctx.check_write(Container::Storage(new.storage))?;

    if new.filename.trim().is_empty() {
        return Err(CatalogError::InvalidArgument("filename cannot be blank".to_string()));
    }
    for (axis, extent) in [
        ("depth", new.depth),
        ("duration", new.duration),
        ("channels", new.channels),
    ] {
        if extent < 1 {
            return Err(CatalogError::InvalidArgument(format!(
                "{} must be at least 1, got {}",
                axis, extent
            )));
        }
    }
    let specs = match &new.planes {
        Some(planes) => planes.clone(),
        None => {
            let size = i64::from(new.channels)
                .saturating_mul(i64::from(new.depth))
                .saturating_mul(i64::from(new.duration));
            if size > MAX_GRID_PLANES {
                return Err(CatalogError::InvalidArgument(format!(
                    "{} channels x {} z-stacks x {} frames is {} planes, over the limit of {}; \
                     list the planes explicitly",
                    new.channels, new.depth, new.duration, size, MAX_GRID_PLANES
                )));
            }
            new.grid()
        }
    };
    let mut seen = BTreeSet::new();
    for spec in &specs {
        if !seen.insert(spec.coordinate) {
            return Err(CatalogError::AlreadyExists(format!(
                "plane {} listed twice",
                spec.coordinate
            )));
        }
    }

    let now = now_millis();
    let ext = Path::new(&new.filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    let stored_file = exec.insert(
        "INSERT INTO stored_file (user_id, storage_id, filename, original_filename, ext, content_type, size, created) \
         VALUES (:user, :storage, :filename, :filename, :ext, :content_type, :size, :now) RETURNING id",
        &bind([
            ("user", ctx.caller.id.into()),
            ("storage", new.storage.into()),
            ("filename", new.filename.as_str().into()),
            ("ext", ext.into()),
            ("content_type", new.content_type.clone().into()),
            ("size", new.size.into()),
            ("now", now.into()),
        ]),
    )?;
    let id = exec.insert(
        "INSERT INTO root_image (stored_file_id, original_filename, width, height, depth, duration, channels, \
         physical_size_x, physical_size_y, physical_size_z, fps, bit_depth, colorspace, magnification, user_id, created) \
         VALUES (:file, :filename, :width, :height, :depth, :duration, :channels, \
         :psx, :psy, :psz, :fps, :bit_depth, :colorspace, :mag, :user, :now) RETURNING id",
        &bind([
            ("file", stored_file.into()),
            ("filename", new.filename.as_str().into()),
            ("width", new.width.into()),
            ("height", new.height.into()),
            ("depth", new.depth.into()),
            ("duration", new.duration.into()),
            ("channels", new.channels.into()),
            ("psx", new.physical_size_x.into()),
            ("psy", new.physical_size_y.into()),
            ("psz", new.physical_size_z.into()),
            ("fps", new.fps.into()),
            ("bit_depth", new.bit_depth.into()),
            ("colorspace", new.colorspace.clone().into()),
            ("mag", new.magnification.into()),
            ("user", ctx.caller.id.into()),
            ("now", now.into()),
        ]),
    )?;
    for spec in &specs {
        insert_plane(exec, id, spec)?;
    }

    let image = fetch_root_image(exec, id)?;
    let planes = planes_of(exec, id)?;
    info!(image = id, planes = planes.len(), "root image ingested");
    let message = format!(
        "Ingested {} as root image {} with {} plane(s)",
        image.original_filename,
        id,
        planes.len()
    );
    Ok(CmdResult::new(Ingested {
        image,
        stored_file,
        planes,
    })
    .with_message(CmdMessage::success(message)))
}

/// Add one plane to an existing root image.
pub fn add_plane<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    image: Id,
    spec: PlaneSpec,
) -> Result<CmdResult<Plane>> {
    writable_root_image(exec, ctx, image)?;
    let plane = insert_plane(exec, image, &spec)?;
    info!(image, plane = plane.id, coordinate = %plane.coordinate, "plane added");
    Ok(CmdResult::new(plane).with_message(CmdMessage::success(format!(
        "Added plane {} to root image {}",
        spec.coordinate, image
    ))))
}

fn insert_plane<E: Executor>(exec: &E, image: Id, spec: &PlaneSpec) -> Result<Plane> {
    let c = spec.coordinate;
    let taken = exec.query_opt(
        "SELECT id FROM plane WHERE root_image_id = :image AND channel = :c AND z_stack = :z AND time = :t",
        &bind([
            ("image", image.into()),
            ("c", c.channel.into()),
            ("z", c.z_stack.into()),
            ("t", c.time.into()),
        ]),
    )?;
    if taken.is_some() {
        return Err(CatalogError::AlreadyExists(format!(
            "root image {} already has plane {}",
            image, c
        )));
    }
    let id = exec.insert(
        "INSERT INTO plane (root_image_id, channel, z_stack, time, channel_name, channel_color) \
         VALUES (:image, :c, :z, :t, :name, :color) RETURNING id",
        &bind([
            ("image", image.into()),
            ("c", c.channel.into()),
            ("z", c.z_stack.into()),
            ("t", c.time.into()),
            ("name", spec.channel_name.clone().into()),
            ("color", spec.channel_color.clone().into()),
        ]),
    )?;
    Ok(Plane {
        id,
        root_image_id: image,
        coordinate: c,
        channel_name: spec.channel_name.clone(),
        channel_color: spec.channel_color.clone(),
    })
}
