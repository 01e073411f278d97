//! Core catalog types.
//!
//! The hierarchy is `RootImage` (one uploaded image) → `Plane` (one
//! channel/z/time plane of it) and, per project, `ProjectInstance` →
//! `PlaneInstance`. Timestamps are epoch milliseconds.

use crate::error::{CatalogError, Result};
use crate::store::Row;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Id = i64;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    User,
    Admin,
}

/// The identity an operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub id: Id,
    pub role: Role,
}

impl Caller {
    pub fn user(id: Id) -> Self {
        Self { id, role: Role::User }
    }

    pub fn admin(id: Id) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The entity every permission check resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Container {
    Project(Id),
    Storage(Id),
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Project(id) => write!(f, "project {}", id),
            Container::Storage(id) => write!(f, "storage {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub blind_mode: bool,
    pub read_only: bool,
}

impl Project {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            blind_mode: row.bool("blind_mode")?,
            read_only: row.bool("read_only")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootImage {
    pub id: Id,
    pub stored_file_id: Option<Id>,
    pub original_filename: String,
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
    pub user_id: Option<Id>,
    pub created: i64,
    pub updated: Option<i64>,
}

impl RootImage {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            stored_file_id: row.opt_i64("stored_file_id")?,
            original_filename: row.text("original_filename")?,
            width: row.opt_i32("width")?,
            height: row.opt_i32("height")?,
            depth: row.opt_i32("depth")?.unwrap_or(1),
            duration: row.opt_i32("duration")?.unwrap_or(1),
            channels: row.opt_i32("channels")?.unwrap_or(1),
            physical_size_x: row.opt_f64("physical_size_x")?,
            physical_size_y: row.opt_f64("physical_size_y")?,
            physical_size_z: row.opt_f64("physical_size_z")?,
            fps: row.opt_f64("fps")?,
            bit_depth: row.opt_i32("bit_depth")?,
            colorspace: row.opt_text("colorspace")?,
            magnification: row.opt_i32("magnification")?,
            user_id: row.opt_i64("user_id")?,
            created: row.i64("created")?,
            updated: row.opt_i64("updated")?,
        })
    }
}

/// A (channel, z, time) address inside a root image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub channel: i32,
    pub z_stack: i32,
    pub time: i32,
}

impl Coordinate {
    pub fn new(channel: i32, z_stack: i32, time: i32) -> Self {
        Self {
            channel,
            z_stack,
            time,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}:Z{}:T{}", self.channel, self.z_stack, self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plane {
    pub id: Id,
    pub root_image_id: Id,
    pub coordinate: Coordinate,
    pub channel_name: Option<String>,
    pub channel_color: Option<String>,
}

impl Plane {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            root_image_id: row.i64("root_image_id")?,
            coordinate: Coordinate::new(row.i32("channel")?, row.i32("z_stack")?, row.i32("time")?),
            channel_name: row.opt_text("channel_name")?,
            channel_color: row.opt_text("channel_color")?,
        })
    }
}

/// Lifecycle of a project binding.
///
/// ```text
/// Active --delete--> Deleted --attach--> Restored --delete--> Deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Active,
    Deleted,
    Restored,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Active => "active",
            InstanceState::Deleted => "deleted",
            InstanceState::Restored => "restored",
        }
    }

    /// Active and restored bindings both count as live usage.
    pub fn is_live(&self) -> bool {
        !matches!(self, InstanceState::Deleted)
    }
}

impl FromStr for InstanceState {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(InstanceState::Active),
            "deleted" => Ok(InstanceState::Deleted),
            "restored" => Ok(InstanceState::Restored),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown instance state '{}'",
                other
            ))),
        }
    }
}

/// Whether an instance's calibration value still tracks its root image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    Inherited,
    Overridden,
}

impl CalibrationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationSource::Inherited => "inherited",
            CalibrationSource::Overridden => "overridden",
        }
    }
}

impl FromStr for CalibrationSource {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inherited" => Ok(CalibrationSource::Inherited),
            "overridden" => Ok(CalibrationSource::Overridden),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown calibration source '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInstance {
    pub id: Id,
    pub base_image_id: Id,
    pub project_id: Id,
    pub user_id: Id,
    pub instance_filename: Option<String>,
    /// Set only on results shaped for a blind project's callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blinded_name: Option<String>,
    pub magnification: Option<i32>,
    pub magnification_source: CalibrationSource,
    pub physical_size_x: Option<f64>,
    pub physical_size_x_source: CalibrationSource,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    pub fps: Option<f64>,
    pub count_annotations: i64,
    pub count_job_annotations: i64,
    pub count_reviewed_annotations: i64,
    pub review_start: Option<i64>,
    pub review_stop: Option<i64>,
    pub review_user_id: Option<Id>,
    pub state: InstanceState,
    pub created: i64,
    pub updated: Option<i64>,
    pub deleted: Option<i64>,
}

impl ProjectInstance {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            base_image_id: row.i64("base_image_id")?,
            project_id: row.i64("project_id")?,
            user_id: row.i64("user_id")?,
            instance_filename: row.opt_text("instance_filename")?,
            blinded_name: None,
            magnification: row.opt_i32("magnification")?,
            magnification_source: row.text("magnification_source")?.parse()?,
            physical_size_x: row.opt_f64("physical_size_x")?,
            physical_size_x_source: row.text("physical_size_x_source")?.parse()?,
            physical_size_y: row.opt_f64("physical_size_y")?,
            physical_size_z: row.opt_f64("physical_size_z")?,
            fps: row.opt_f64("fps")?,
            count_annotations: row.opt_i64("count_annotations")?.unwrap_or(0),
            count_job_annotations: row.opt_i64("count_job_annotations")?.unwrap_or(0),
            count_reviewed_annotations: row.opt_i64("count_reviewed_annotations")?.unwrap_or(0),
            review_start: row.opt_i64("review_start")?,
            review_stop: row.opt_i64("review_stop")?,
            review_user_id: row.opt_i64("review_user_id")?,
            state: row.text("state")?.parse()?,
            created: row.i64("created")?,
            updated: row.opt_i64("updated")?,
            deleted: row.opt_i64("deleted")?,
        })
    }

    pub fn container(&self) -> Container {
        Container::Project(self.project_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneInstance {
    pub id: Id,
    pub plane_id: Id,
    pub instance_id: Id,
    pub project_id: Id,
    pub coordinate: Coordinate,
}

impl PlaneInstance {
    /// Expects the plane coordinate columns joined in.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            plane_id: row.i64("plane_id")?,
            instance_id: row.i64("instance_id")?,
            project_id: row.i64("project_id")?,
            coordinate: Coordinate::new(row.i32("channel")?, row.i32("z_stack")?, row.i32("time")?),
        })
    }
}

/// Entity kinds free files can be attached to (`attached_file.domain_kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentDomain {
    RootImage,
    Plane,
    ProjectInstance,
}

impl AttachmentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentDomain::RootImage => "root_image",
            AttachmentDomain::Plane => "plane",
            AttachmentDomain::ProjectInstance => "project_instance",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_deleted_state_is_not_live() {
        assert!(InstanceState::Active.is_live());
        assert!(InstanceState::Restored.is_live());
        assert!(!InstanceState::Deleted.is_live());
    }

    #[test]
    fn states_parse_from_their_column_text() {
        for state in [
            InstanceState::Active,
            InstanceState::Deleted,
            InstanceState::Restored,
        ] {
            assert_eq!(state.as_str().parse::<InstanceState>().unwrap(), state);
        }
        assert!("archived".parse::<InstanceState>().is_err());
    }

    #[test]
    fn coordinates_order_channel_first() {
        let mut coords = vec![
            Coordinate::new(1, 0, 0),
            Coordinate::new(0, 2, 0),
            Coordinate::new(0, 0, 5),
        ];
        coords.sort();
        assert_eq!(coords[0], Coordinate::new(0, 0, 5));
        assert_eq!(coords[2], Coordinate::new(1, 0, 0));
        assert_eq!(coords[1].to_string(), "C0:Z2:T0");
    }
}
