//! Value ranges of a project's live instances, for building filter widgets.
//!
//! Every bounded property resolves through the same column tables as listing
//! filters, so a bound always names a property the listing accepts. The name
//! bound follows blind-mode redaction like the listing sort does.

use super::helpers::readable_project;
use super::{CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::{CatalogError, Result};
use crate::model::{Id, InstanceState};
use crate::query::columns::{instance_property, InstanceProperty};
use crate::query::expr::ParamSink;
use crate::query::Redaction;
use crate::store::{Executor, Params, Row, SqlValue};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Properties bounded by min and max.
const RANGED: [&str; 14] = [
    "created",
    "updated",
    "reviewStart",
    "reviewStop",
    "magnification",
    "physicalSizeX",
    "physicalSizeY",
    "physicalSizeZ",
    "fps",
    "numberOfAnnotations",
    "numberOfJobAnnotations",
    "numberOfReviewedAnnotations",
    "width",
    "height",
];

/// Properties that also list their distinct values.
const CHOICES: [&str; 3] = ["magnification", "physicalSizeX", "contentType"];

const FROM: &str = "project_instance ii \
     JOIN root_image ai ON ai.id = ii.base_image_id \
     LEFT JOIN stored_file sf ON sf.id = ai.stored_file_id";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bound {
    pub min: SqlValue,
    pub max: SqlValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<SqlValue>,
}

/// Bounds keyed by listing property.
pub type InstanceBounds = BTreeMap<String, Bound>;

fn column_sql(property: &str) -> Result<String> {
    match instance_property(property) {
        Some(InstanceProperty::Column(def)) => Ok(format!("{}.{}", def.table.alias(), def.column)),
        _ => Err(CatalogError::InvalidArgument(format!(
            "'{}' cannot be bounded",
            property
        ))),
    }
}

fn value(row: &Row, column: &str) -> SqlValue {
    row.get(column).cloned().unwrap_or(SqlValue::Null)
}

pub fn instance_bounds<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
) -> Result<CmdResult<InstanceBounds>> {
    readable_project(exec, ctx, project)?;

    let mut sink = ParamSink::new("b");
    let scope = format!(
        "ii.project_id = {} AND ii.state <> {}",
        sink.push(project.into()),
        sink.push(InstanceState::Deleted.as_str().into())
    );
    let scope_params = sink.params().clone();
    let redaction = Redaction::classify(ctx.permissions, &ctx.caller, &[project]);
    let name = redaction.name_sort();

    let mut bounded: Vec<(&str, String)> = Vec::new();
    for property in RANGED {
        bounded.push((property, column_sql(property)?));
    }
    bounded.push(("contentType", column_sql("contentType")?));
    bounded.push(("instanceFilename", name.render(&mut sink)));

    let aggregates: Vec<String> = bounded
        .iter()
        .enumerate()
        .map(|(i, (_, sql))| format!("MIN({sql}) AS min_{i}, MAX({sql}) AS max_{i}"))
        .collect();
    let params = sink.into_params();
    let sql = format!("SELECT {} FROM {} WHERE {}", aggregates.join(", "), FROM, scope);
    debug!(%sql, "compiled instance bounds");
    let row = exec.query_opt(&sql, &params)?;

    let mut bounds = InstanceBounds::new();
    for (i, (property, _)) in bounded.iter().enumerate() {
        let (min, max) = match &row {
            Some(row) => (value(row, &format!("min_{i}")), value(row, &format!("max_{i}"))),
            None => (SqlValue::Null, SqlValue::Null),
        };
        bounds.insert(
            property.to_string(),
            Bound {
                min,
                max,
                list: Vec::new(),
            },
        );
    }
    for property in CHOICES {
        let list = choices(exec, &column_sql(property)?, &scope, &scope_params)?;
        if let Some(bound) = bounds.get_mut(property) {
            bound.list = list;
        }
    }
    Ok(CmdResult::new(bounds))
}

/// Distinct non-null values of one column, ascending.
fn choices<E: Executor>(
    exec: &E,
    column: &str,
    scope: &str,
    params: &Params,
) -> Result<Vec<SqlValue>> {
    let sql = format!(
        "SELECT DISTINCT {column} AS v FROM {FROM} WHERE {scope} AND {column} IS NOT NULL ORDER BY v"
    );
    Ok(exec.query(&sql, params)?.iter().map(|row| value(row, "v")).collect())
}
