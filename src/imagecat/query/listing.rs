//! Listing compilation.
//!
//! A [`ListRequest`] plus the caller's scope compiles into two statements
//! sharing one FROM/WHERE: the page query and the `COUNT(DISTINCT id)` total.
//! Tables beyond the listed one are joined only when a filter or the sort
//! references them.

use super::columns::{
    self, instance_property, InstanceProperty, Table, ValueKind, ROOT_IMAGE_PRECEDENCE,
};
use super::expr::{CmpOp, Expr, Operand, ParamSink};
use super::filter::{FilterValue, ListRequest, Operator, SearchParameter};
use super::predicate;
use super::redaction::{blinded_name, Redaction};
use crate::error::{CatalogError, Result};
use crate::model::{Id, InstanceState};
use crate::store::Params;
use std::collections::BTreeSet;
use tracing::debug;

/// The instances an instance listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceScope {
    Project(Id),
    /// Every readable project of the caller.
    Projects(Vec<Id>),
}

#[derive(Debug, Clone)]
pub struct CompiledListing {
    pub select_sql: String,
    pub select_params: Params,
    pub count_sql: String,
    pub count_params: Params,
    /// Tables referenced besides the listed one.
    pub joins: BTreeSet<Table>,
    /// Filter properties that matched nothing and were left out.
    pub ignored: Vec<String>,
}

const INSTANCE_COLUMNS: [&str; 19] = [
    "id",
    "base_image_id",
    "project_id",
    "user_id",
    "instance_filename",
    "magnification",
    "physical_size_x",
    "physical_size_y",
    "physical_size_z",
    "fps",
    "count_annotations",
    "count_job_annotations",
    "count_reviewed_annotations",
    "review_start",
    "review_stop",
    "review_user_id",
    "state",
    "created",
    "updated",
];

const ROOT_IMAGE_COLUMNS: [&str; 17] = [
    "id",
    "original_filename",
    "width",
    "height",
    "depth",
    "duration",
    "channels",
    "physical_size_x",
    "physical_size_y",
    "physical_size_z",
    "fps",
    "bit_depth",
    "colorspace",
    "magnification",
    "user_id",
    "created",
    "updated",
];

fn instance(column: &'static str) -> Operand {
    Operand::column(Table::Instance, column)
}

pub fn compile_instances(
    scope: &InstanceScope,
    request: &ListRequest,
    redaction: &Redaction,
    stable_sort: bool,
) -> Result<CompiledListing> {
    let mut clauses = vec![
        match scope {
            InstanceScope::Project(id) => Expr::equals(instance("project_id"), *id),
            InstanceScope::Projects(ids) => Expr::in_ids(instance("project_id"), ids),
        },
        Expr::compare(
            instance("state"),
            CmpOp::Ne,
            Operand::value(InstanceState::Deleted.as_str()),
        ),
    ];

    let mut ignored = Vec::new();
    for param in &request.filters {
        let clause = match instance_property(&param.property) {
            Some(InstanceProperty::Column(def)) => {
                predicate::compile(param, Operand::column(def.table, def.column), def.kind)?
            }
            Some(InstanceProperty::DisplayName) => redaction
                .name_filter(|name| predicate::compile(param, name, ValueKind::Text))?,
            Some(InstanceProperty::BlindedName) => {
                predicate::compile(param, blinded_name(), ValueKind::Text)?
            }
            Some(InstanceProperty::Tag) => predicate::compile(
                param,
                Operand::column(Table::TagLink, "tag_id"),
                ValueKind::Integer,
            )?,
            Some(InstanceProperty::Include) => {
                let ids = SearchParameter::new(
                    param.property.clone(),
                    Operator::In,
                    FilterValue::List(param.value.to_list()),
                );
                predicate::compile(&ids, instance("base_image_id"), ValueKind::Integer)?
            }
            None => {
                debug!(property = %param.property, "ignoring unknown filter property");
                ignored.push(param.property.clone());
                continue;
            }
        };
        clauses.push(clause);
    }
    let filter = Expr::all(clauses);
    let sort = instance_sort(request.sort_column(), redaction)?;

    let mut joins = filter.tables();
    joins.extend(sort.tables());
    joins.remove(&Table::Instance);
    if joins.contains(&Table::StoredFile) {
        joins.insert(Table::RootImage);
    }

    let mut from = String::from("project_instance ii");
    if joins.contains(&Table::RootImage) {
        from.push_str(" JOIN root_image ai ON ai.id = ii.base_image_id");
    }
    if joins.contains(&Table::StoredFile) {
        from.push_str(" LEFT JOIN stored_file sf ON sf.id = ai.stored_file_id");
    }
    if joins.contains(&Table::TagLink) {
        from.push_str(" LEFT OUTER JOIN tag_link tl ON tl.instance_id = ii.id");
    }

    let compiled = assemble(
        &from,
        "ii",
        &select_list("ii", &INSTANCE_COLUMNS),
        &filter,
        &sort,
        request,
        stable_sort,
        joins,
        ignored,
    );
    debug!(sql = %compiled.select_sql, "compiled instance listing");
    Ok(compiled)
}

/// Sort operand for an instance listing: the instance table first, then the
/// root image, then its stored file.
fn instance_sort(column: &str, redaction: &Redaction) -> Result<Operand> {
    match instance_property(column) {
        Some(InstanceProperty::Column(def)) => Ok(Operand::column(def.table, def.column)),
        Some(InstanceProperty::DisplayName) => Ok(redaction.name_sort()),
        Some(InstanceProperty::BlindedName) => Ok(blinded_name()),
        Some(InstanceProperty::Tag) | Some(InstanceProperty::Include) | None => {
            Err(CatalogError::SortNotSupported(column.to_string()))
        }
    }
}

fn root_image_column(property: &str) -> Option<columns::ColumnDef> {
    match property {
        "name" | "originalFilename" => Some(columns::ColumnDef {
            table: Table::RootImage,
            column: "original_filename",
            kind: ValueKind::Text,
        }),
        other => columns::resolve(&ROOT_IMAGE_PRECEDENCE, other),
    }
}

/// Compile a root image listing. `storages` restricts the listing to root
/// images stored in those storages; `None` lists everything.
pub fn compile_root_images(
    storages: Option<&[Id]>,
    request: &ListRequest,
    stable_sort: bool,
) -> Result<CompiledListing> {
    let mut clauses = Vec::new();
    if let Some(storages) = storages {
        clauses.push(Expr::in_ids(
            Operand::column(Table::StoredFile, "storage_id"),
            storages,
        ));
    }

    let mut ignored = Vec::new();
    for param in &request.filters {
        match root_image_column(&param.property) {
            Some(def) => clauses.push(predicate::compile(
                param,
                Operand::column(def.table, def.column),
                def.kind,
            )?),
            None => {
                debug!(property = %param.property, "ignoring unknown filter property");
                ignored.push(param.property.clone());
            }
        }
    }
    let filter = Expr::all(clauses);

    let column = request.sort_column();
    let sort = root_image_column(column)
        .map(|def| Operand::column(def.table, def.column))
        .ok_or_else(|| CatalogError::SortNotSupported(column.to_string()))?;

    // The stored file carries the filename and content type of every row.
    let joins = BTreeSet::from([Table::StoredFile]);
    let from = "root_image ai LEFT JOIN stored_file sf ON sf.id = ai.stored_file_id";
    let select = format!(
        "{}, sf.filename AS filename, sf.content_type AS content_type",
        select_list("ai", &ROOT_IMAGE_COLUMNS)
    );

    let compiled = assemble(
        from,
        "ai",
        &select,
        &filter,
        &sort,
        request,
        stable_sort,
        joins,
        ignored,
    );
    debug!(sql = %compiled.select_sql, "compiled root image listing");
    Ok(compiled)
}

fn select_list(alias: &str, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("{}.{} AS {}", alias, column, column))
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    from: &str,
    alias: &str,
    select: &str,
    filter: &Expr,
    sort: &Operand,
    request: &ListRequest,
    stable_sort: bool,
    joins: BTreeSet<Table>,
    ignored: Vec<String>,
) -> CompiledListing {
    let mut filter_sink = ParamSink::new("p");
    let where_sql = filter.render(&mut filter_sink);
    let mut sort_sink = ParamSink::new("s");
    let sort_sql = sort.render(&mut sort_sink);

    let direction = request.direction.as_sql();
    let mut order = format!("sort_key {}", direction);
    if stable_sort {
        order.push_str(&format!(", id {}", direction));
    }

    let mut select_sql = format!(
        "SELECT DISTINCT {}, {} AS sort_key FROM {} WHERE {} ORDER BY {}",
        select, sort_sql, from, where_sql, order
    );
    let count_params = filter_sink.into_params();
    let mut select_params = count_params.clone();
    select_params.extend(sort_sink.into_params());

    if request.max > 0 {
        select_sql.push_str(" LIMIT :limit OFFSET :offset");
        select_params.insert("limit".to_string(), request.max.into());
        select_params.insert("offset".to_string(), request.offset.into());
    } else if request.offset > 0 {
        select_sql.push_str(" LIMIT -1 OFFSET :offset");
        select_params.insert("offset".to_string(), request.offset.into());
    }

    CompiledListing {
        select_sql,
        select_params,
        count_sql: format!(
            "SELECT COUNT(DISTINCT {}.id) AS total FROM {} WHERE {}",
            alias, from, where_sql
        ),
        count_params,
        joins,
        ignored,
    }
}
