//! Column allow-lists.
//!
//! Every property a caller may filter or sort on is listed here, per table,
//! with its physical column and the kind its values are coerced to. Anything
//! not listed never reaches the SQL text.

use crate::error::{CatalogError, Result};
use crate::store::SqlValue;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A table a listing query can reference, with its fixed alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Instance,
    RootImage,
    StoredFile,
    TagLink,
}

impl Table {
    pub fn alias(&self) -> &'static str {
        match self {
            Table::Instance => "ii",
            Table::RootImage => "ai",
            Table::StoredFile => "sf",
            Table::TagLink => "tl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
    /// Epoch milliseconds.
    Timestamp,
    Boolean,
}

impl ValueKind {
    /// Coerce a raw filter value. The literal `null` is SQL NULL for every kind.
    pub fn coerce(&self, raw: &str) -> Result<SqlValue> {
        if raw == "null" {
            return Ok(SqlValue::Null);
        }
        let invalid = |kind: &str| {
            CatalogError::InvalidArgument(format!("'{}' is not a valid {}", raw, kind))
        };
        match self {
            ValueKind::Text => Ok(SqlValue::Text(raw.to_string())),
            ValueKind::Integer | ValueKind::Timestamp => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| invalid("integer")),
            ValueKind::Real => raw
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .map_err(|_| invalid("number")),
            ValueKind::Boolean => match raw.trim() {
                "true" | "1" => Ok(SqlValue::Integer(1)),
                "false" | "0" => Ok(SqlValue::Integer(0)),
                _ => Err(invalid("boolean")),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub table: Table,
    pub column: &'static str,
    pub kind: ValueKind,
}

type Columns = HashMap<&'static str, ColumnDef>;

fn columns(table: Table, entries: &[(&'static str, &'static str, ValueKind)]) -> Columns {
    entries
        .iter()
        .map(|&(property, column, kind)| (property, ColumnDef { table, column, kind }))
        .collect()
}

use ValueKind::*;

static INSTANCE: Lazy<Columns> = Lazy::new(|| {
    columns(
        Table::Instance,
        &[
            ("id", "id", Integer),
            ("created", "created", Timestamp),
            ("updated", "updated", Timestamp),
            ("project", "project_id", Integer),
            ("user", "user_id", Integer),
            ("baseImage", "base_image_id", Integer),
            ("magnification", "magnification", Integer),
            ("physicalSizeX", "physical_size_x", Real),
            ("physicalSizeY", "physical_size_y", Real),
            ("physicalSizeZ", "physical_size_z", Real),
            ("fps", "fps", Real),
            ("countImageAnnotations", "count_annotations", Integer),
            ("countImageJobAnnotations", "count_job_annotations", Integer),
            ("countImageReviewedAnnotations", "count_reviewed_annotations", Integer),
            ("reviewStart", "review_start", Timestamp),
            ("reviewStop", "review_stop", Timestamp),
            ("reviewUser", "review_user_id", Integer),
        ],
    )
});

static ROOT_IMAGE: Lazy<Columns> = Lazy::new(|| {
    columns(
        Table::RootImage,
        &[
            ("id", "id", Integer),
            ("created", "created", Timestamp),
            ("updated", "updated", Timestamp),
            ("width", "width", Integer),
            ("height", "height", Integer),
            ("depth", "depth", Integer),
            ("duration", "duration", Integer),
            ("channels", "channels", Integer),
            ("physicalSizeX", "physical_size_x", Real),
            ("physicalSizeY", "physical_size_y", Real),
            ("physicalSizeZ", "physical_size_z", Real),
            ("fps", "fps", Real),
            ("bitDepth", "bit_depth", Integer),
            ("colorspace", "colorspace", Text),
            ("magnification", "magnification", Integer),
            ("user", "user_id", Integer),
        ],
    )
});

// No filenames here: they are only reachable through the redaction-aware
// name synonyms.
static STORED_FILE: Lazy<Columns> = Lazy::new(|| {
    columns(
        Table::StoredFile,
        &[
            ("contentType", "content_type", Text),
            ("size", "size", Integer),
            ("status", "status", Integer),
            ("storage", "storage_id", Integer),
        ],
    )
});

pub fn lookup(table: Table, property: &str) -> Option<ColumnDef> {
    let columns: &Columns = match table {
        Table::Instance => &INSTANCE,
        Table::RootImage => &ROOT_IMAGE,
        Table::StoredFile => &STORED_FILE,
        Table::TagLink => return None,
    };
    columns.get(property).copied()
}

/// Lookup order for instance listings: the instance itself, then its root
/// image, then the root image's stored file.
pub const INSTANCE_PRECEDENCE: [Table; 3] = [Table::Instance, Table::RootImage, Table::StoredFile];

pub const ROOT_IMAGE_PRECEDENCE: [Table; 2] = [Table::RootImage, Table::StoredFile];

/// The first table in `precedence` that lists `property`.
pub fn resolve(precedence: &[Table], property: &str) -> Option<ColumnDef> {
    precedence.iter().find_map(|table| lookup(*table, property))
}

/// What a property of an instance listing means once synonyms are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceProperty {
    Column(ColumnDef),
    /// Display name: instance override, else root original filename,
    /// subject to redaction.
    DisplayName,
    /// The root image id rendered as text.
    BlindedName,
    /// Tag id through the tag link join.
    Tag,
    /// Root image ids, always compared as a list.
    Include,
}

pub fn instance_property(property: &str) -> Option<InstanceProperty> {
    let counter = |column| {
        InstanceProperty::Column(ColumnDef {
            table: Table::Instance,
            column,
            kind: ValueKind::Integer,
        })
    };
    match property {
        "name" | "instanceFilename" | "originalFilename" => Some(InstanceProperty::DisplayName),
        "blindedName" => Some(InstanceProperty::BlindedName),
        "tag" => Some(InstanceProperty::Tag),
        "include" => Some(InstanceProperty::Include),
        "numberOfAnnotations" => Some(counter("count_annotations")),
        "numberOfJobAnnotations" => Some(counter("count_job_annotations")),
        "numberOfReviewedAnnotations" => Some(counter("count_reviewed_annotations")),
        other => resolve(&INSTANCE_PRECEDENCE, other).map(InstanceProperty::Column),
    }
}
