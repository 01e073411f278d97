//! Output rows.
//!
//! Listing queries return raw table columns; this module turns them into the
//! flat, camelCase rows callers see, applying redaction on the way out.
//! Root image and project details are looked up once per page, keyed by id.

use super::redaction::Visibility;
use crate::error::Result;
use crate::model::Id;
use crate::store::{Row, SqlValue};
use std::collections::BTreeMap;

pub type ProjectedRow = BTreeMap<String, SqlValue>;

/// Root image fields shown next to each instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RootSummary {
    pub original_filename: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub depth: i64,
    pub duration: i64,
    pub channels: i64,
}

impl RootSummary {
    /// SQL for the summaries of a set of root images; the id list is appended
    /// by the caller as `ai.id IN (...)`.
    pub const SELECT: &'static str = "SELECT ai.id AS id, ai.original_filename AS original_filename, \
         ai.width AS width, ai.height AS height, ai.depth AS depth, ai.duration AS duration, \
         ai.channels AS channels, sf.filename AS filename, sf.content_type AS content_type \
         FROM root_image ai LEFT JOIN stored_file sf ON sf.id = ai.stored_file_id";

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            original_filename: row.text("original_filename")?,
            filename: row.opt_text("filename")?,
            content_type: row.opt_text("content_type")?,
            width: row.opt_i64("width")?,
            height: row.opt_i64("height")?,
            depth: row.opt_i64("depth")?.unwrap_or(1),
            duration: row.opt_i64("duration")?.unwrap_or(1),
            channels: row.opt_i64("channels")?.unwrap_or(1),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub name: String,
    pub blind_mode: bool,
}

impl ProjectSummary {
    pub const SELECT: &'static str = "SELECT id, name, blind_mode FROM project";

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: row.text("name")?,
            blind_mode: row.bool("blind_mode")?,
        })
    }
}

fn put(out: &mut ProjectedRow, key: &str, value: impl Into<SqlValue>) {
    out.insert(key.to_string(), value.into());
}

fn copy(out: &mut ProjectedRow, row: &Row, column: &str, key: &str) {
    put(out, key, row.get(column).cloned().unwrap_or(SqlValue::Null));
}

/// One instance listing row, as `visibility` allows the caller to see it.
pub fn instance_row(
    row: &Row,
    root: Option<&RootSummary>,
    project: Option<&ProjectSummary>,
    visibility: Visibility,
) -> Result<ProjectedRow> {
    let mut out = ProjectedRow::new();
    for (column, key) in [
        ("id", "id"),
        ("created", "created"),
        ("updated", "updated"),
        ("project_id", "project"),
        ("base_image_id", "baseImage"),
        ("user_id", "user"),
        ("magnification", "magnification"),
        ("physical_size_x", "physicalSizeX"),
        ("physical_size_y", "physicalSizeY"),
        ("physical_size_z", "physicalSizeZ"),
        ("fps", "fps"),
        ("count_annotations", "numberOfAnnotations"),
        ("count_job_annotations", "numberOfJobAnnotations"),
        ("count_reviewed_annotations", "numberOfReviewedAnnotations"),
        ("review_start", "reviewStart"),
        ("review_stop", "reviewStop"),
        ("review_user_id", "reviewUser"),
    ] {
        copy(&mut out, row, column, key);
    }
    put(&mut out, "reviewed", row.opt_i64("review_stop")?.is_some());

    if let Some(root) = root {
        put(&mut out, "width", root.width);
        put(&mut out, "height", root.height);
        put(&mut out, "depth", root.depth);
        put(&mut out, "duration", root.duration);
        put(&mut out, "channels", root.channels);
        put(&mut out, "contentType", root.content_type.clone());
    }
    if let Some(project) = project {
        put(&mut out, "projectName", project.name.as_str());
        put(&mut out, "projectBlind", project.blind_mode);
    }

    let base_image = row.i64("base_image_id")?;
    if visibility.is_blind() {
        put(&mut out, "blindedName", base_image.to_string());
    }
    match visibility {
        Visibility::Redacted => {
            put(&mut out, "instanceFilename", base_image.to_string());
        }
        Visibility::Open | Visibility::Managed => {
            let name = row
                .opt_text("instance_filename")?
                .filter(|name| !name.trim().is_empty())
                .or_else(|| root.map(|r| r.original_filename.clone()));
            put(&mut out, "instanceFilename", name);
            if let Some(root) = root {
                put(&mut out, "originalFilename", root.original_filename.as_str());
                put(&mut out, "filename", root.filename.clone());
            }
        }
    }
    Ok(out)
}

/// One root image listing row. `in_project` is set when the listing was
/// asked to mark membership of a project.
pub fn root_image_row(row: &Row, in_project: Option<bool>) -> Result<ProjectedRow> {
    let mut out = ProjectedRow::new();
    for (column, key) in [
        ("id", "id"),
        ("created", "created"),
        ("updated", "updated"),
        ("original_filename", "originalFilename"),
        ("filename", "filename"),
        ("content_type", "contentType"),
        ("width", "width"),
        ("height", "height"),
        ("depth", "depth"),
        ("duration", "duration"),
        ("channels", "channels"),
        ("physical_size_x", "physicalSizeX"),
        ("physical_size_y", "physicalSizeY"),
        ("physical_size_z", "physicalSizeZ"),
        ("fps", "fps"),
        ("bit_depth", "bitDepth"),
        ("colorspace", "colorspace"),
        ("magnification", "magnification"),
        ("user_id", "user"),
    ] {
        copy(&mut out, row, column, key);
    }
    if let Some(in_project) = in_project {
        put(&mut out, "inProject", in_project);
    }
    Ok(out)
}

/// Index summaries by id.
pub fn by_id<T>(rows: Vec<Row>, parse: impl Fn(&Row) -> Result<T>) -> Result<BTreeMap<Id, T>> {
    rows.iter()
        .map(|row| Ok((row.i64("id")?, parse(row)?)))
        .collect()
}
