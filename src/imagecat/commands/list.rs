//! Listings: instances of one project, instances across the caller's
//! projects, and root images. Light listings return every live instance in
//! scope with just enough to label it.

use super::helpers::{id_list, project_names, readable_project};
use super::{CmdMessage, CmdResult, Ctx};
use crate::access::Permissions;
use crate::error::Result;
use crate::model::{Id, InstanceState};
use crate::query::columns::Table;
use crate::query::expr::{Expr, Operand, ParamSink};
use crate::query::listing::{compile_instances, compile_root_images, CompiledListing};
use crate::query::projection::{self, ProjectSummary, RootSummary};
use crate::query::{InstanceScope, ListRequest, Page, Redaction, Visibility};
use crate::store::{bind, Executor, Row};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Live instances of one readable project.
pub fn instances_in_project<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
    request: &ListRequest,
) -> Result<CmdResult<Page>> {
    readable_project(exec, ctx, project)?;
    let redaction = Redaction::classify(ctx.permissions, &ctx.caller, &[project]);
    let compiled = compile_instances(
        &InstanceScope::Project(project),
        request,
        &redaction,
        ctx.config.stable_sort,
    )?;
    run_instances(exec, compiled, &redaction, request)
}

/// Live instances across every project the caller can read.
pub fn instances_of_user<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    request: &ListRequest,
) -> Result<CmdResult<Page>> {
    let projects = ctx.permissions.readable_projects(&ctx.caller);
    let redaction = Redaction::classify(ctx.permissions, &ctx.caller, &projects);
    let compiled = compile_instances(
        &InstanceScope::Projects(projects),
        request,
        &redaction,
        ctx.config.stable_sort,
    )?;
    run_instances(exec, compiled, &redaction, request)
}

/// Root images in the caller's readable storages (everything for admins).
/// With `project`, each row says whether the image is bound there.
pub fn root_images<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    request: &ListRequest,
    project: Option<Id>,
) -> Result<CmdResult<Page>> {
    let storages = if ctx.caller.is_admin() {
        None
    } else {
        Some(ctx.permissions.readable_storages(&ctx.caller))
    };
    let bound = match project {
        Some(project) => {
            readable_project(exec, ctx, project)?;
            Some(bound_images(exec, project)?)
        }
        None => None,
    };

    let compiled = compile_root_images(storages.as_deref(), request, ctx.config.stable_sort)?;
    let (rows, total) = fetch(exec, &compiled)?;
    let collection = rows
        .iter()
        .map(|row| {
            let in_project = match &bound {
                Some(bound) => Some(bound.contains(&row.i64("id")?)),
                None => None,
            };
            projection::root_image_row(row, in_project)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(finish(collection, total, request, compiled.ignored))
}

/// One entry of a light listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightInstance {
    pub id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blinded_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// Every live instance of a readable project, by displayed name.
pub fn light_instances_in_project<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
    project: Id,
) -> Result<CmdResult<Vec<LightInstance>>> {
    readable_project(exec, ctx, project)?;
    let redaction = Redaction::classify(ctx.permissions, &ctx.caller, &[project]);
    let rows = light_rows(exec, &[project], &redaction)?;
    let visibility = redaction.visibility(project);
    let collection = rows
        .into_iter()
        .map(|(id, image, _, name)| LightInstance {
            id,
            instance_filename: Some(name),
            blinded_name: visibility.is_blind().then(|| image.to_string()),
            project: None,
            project_name: None,
        })
        .collect();
    Ok(CmdResult::new(collection))
}

/// Every live instance across the caller's readable projects. Redacted
/// entries carry only their blinded name.
pub fn light_instances_of_user<E: Executor, P: Permissions>(
    exec: &E,
    ctx: &Ctx<'_, P>,
) -> Result<CmdResult<Vec<LightInstance>>> {
    let projects = ctx.permissions.readable_projects(&ctx.caller);
    if projects.is_empty() {
        return Ok(CmdResult::new(Vec::new()));
    }
    let redaction = Redaction::classify(ctx.permissions, &ctx.caller, &projects);
    let rows = light_rows(exec, &projects, &redaction)?;
    let names = project_names(exec, &projects)?;
    let collection = rows
        .into_iter()
        .map(|(id, image, project, name)| {
            let visibility = redaction.visibility(project);
            LightInstance {
                id,
                instance_filename: (visibility != Visibility::Redacted).then_some(name),
                blinded_name: visibility.is_blind().then(|| image.to_string()),
                project: Some(project),
                project_name: names.get(&project).cloned(),
            }
        })
        .collect();
    Ok(CmdResult::new(collection))
}

/// `(id, base image, project, displayed name)` of live instances, ordered by
/// the displayed name.
fn light_rows<E: Executor>(
    exec: &E,
    projects: &[Id],
    redaction: &Redaction,
) -> Result<Vec<(Id, Id, Id, String)>> {
    let mut sink = ParamSink::new("l");
    let scope = Expr::in_ids(Operand::column(Table::Instance, "project_id"), projects).render(&mut sink);
    let name = redaction.name_sort().render(&mut sink);
    let deleted = sink.push(InstanceState::Deleted.as_str().into());
    let sql = format!(
        "SELECT ii.id AS id, ii.base_image_id AS base_image_id, ii.project_id AS project_id, {} AS name \
         FROM project_instance ii JOIN root_image ai ON ai.id = ii.base_image_id \
         WHERE {} AND ii.state <> {} ORDER BY name, ii.id",
        name, scope, deleted
    );
    exec.query(&sql, &sink.into_params())?
        .iter()
        .map(|row| {
            Ok((
                row.i64("id")?,
                row.i64("base_image_id")?,
                row.i64("project_id")?,
                row.text("name")?,
            ))
        })
        .collect()
}

fn fetch<E: Executor>(exec: &E, compiled: &CompiledListing) -> Result<(Vec<Row>, u64)> {
    let total = exec
        .query_opt(&compiled.count_sql, &compiled.count_params)?
        .map(|row| row.i64("total"))
        .transpose()?
        .unwrap_or(0);
    let rows = exec.query(&compiled.select_sql, &compiled.select_params)?;
    debug!(rows = rows.len(), total, "listing fetched");
    Ok((rows, u64::try_from(total).unwrap_or(0)))
}

fn run_instances<E: Executor>(
    exec: &E,
    compiled: CompiledListing,
    redaction: &Redaction,
    request: &ListRequest,
) -> Result<CmdResult<Page>> {
    let (rows, total) = fetch(exec, &compiled)?;

    let images: Vec<Id> = distinct(&rows, "base_image_id")?;
    let projects: Vec<Id> = distinct(&rows, "project_id")?;
    let roots = summaries(exec, RootSummary::SELECT, "ai.id", &images, RootSummary::from_row)?;
    let names = summaries(exec, ProjectSummary::SELECT, "id", &projects, ProjectSummary::from_row)?;

    let collection = rows
        .iter()
        .map(|row| {
            let image = row.i64("base_image_id")?;
            let project = row.i64("project_id")?;
            projection::instance_row(
                row,
                roots.get(&image),
                names.get(&project),
                redaction.visibility(project),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(finish(collection, total, request, compiled.ignored))
}

fn finish(
    collection: Vec<projection::ProjectedRow>,
    total: u64,
    request: &ListRequest,
    ignored: Vec<String>,
) -> CmdResult<Page> {
    let mut result = CmdResult::new(
        Page::new(collection, total, request.offset, request.max).with_ignored(ignored.clone()),
    );
    for property in ignored {
        result.add_message(CmdMessage::warning(format!(
            "Ignored unknown filter property '{}'",
            property
        )));
    }
    result
}

fn distinct(rows: &[Row], column: &str) -> Result<Vec<Id>> {
    let ids: BTreeSet<Id> = rows.iter().map(|row| row.i64(column)).collect::<Result<_>>()?;
    Ok(ids.into_iter().collect())
}

fn summaries<E: Executor, T>(
    exec: &E,
    select: &str,
    key: &str,
    ids: &[Id],
    parse: impl Fn(&Row) -> Result<T>,
) -> Result<BTreeMap<Id, T>> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    let (list, params) = id_list("id", ids);
    let rows = exec.query(&format!("{} WHERE {} IN {}", select, key, list), &params)?;
    projection::by_id(rows, parse)
}

/// Root images with a live instance in `project`.
fn bound_images<E: Executor>(exec: &E, project: Id) -> Result<BTreeSet<Id>> {
    exec.query(
        "SELECT DISTINCT base_image_id FROM project_instance WHERE project_id = :project AND state <> :deleted",
        &bind([
            ("project", project.into()),
            ("deleted", InstanceState::Deleted.as_str().into()),
        ]),
    )?
    .iter()
    .map(|row| row.i64("base_image_id"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::config::CatalogConfig;
    use crate::error::CatalogError;
    use crate::model::Caller;
    use crate::query::{Operator, SortDirection};
    use crate::store::SqlValue;
    use crate::test_utils::*;

    struct World {
        store: crate::store::sqlite::SqliteStore,
        open: Id,
        blind: Id,
        images: Vec<Id>,
    }

    /// Two projects over the same three images; user 10 is a plain member
    /// of both, user 11 manages the blind one.
    fn world() -> World {
        let store = test_store();
        let storage = seed_storage(&store, 1);
        let open = seed_project(&store, "Open", false);
        let blind = seed_project(&store, "Blind", true);
        seed_member(&store, open, 10, false);
        seed_member(&store, blind, 10, false);
        seed_member(&store, blind, 11, true);

        let mut images = Vec::new();
        for name in ["kidney-01.svs", "kidney-02.svs", "liver-01.svs"] {
            let image = seed_root_image(&store, Some(storage), name);
            seed_instance(&store, open, image, 10);
            seed_instance(&store, blind, image, 10);
            images.push(image);
        }
        World {
            store,
            open,
            blind,
            images,
        }
    }

    fn list_project(world: &World, caller: Caller, project: Id, request: &ListRequest) -> Page {
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, caller, &config);
        instances_in_project(&world.store, &ctx, project, request)
            .unwrap()
            .into_data()
    }

    fn text(row: &projection::ProjectedRow, key: &str) -> String {
        row[key].as_str().unwrap().to_string()
    }

    #[test]
    fn count_matches_unpaged_rows() {
        let world = world();
        for request in [
            ListRequest::new(),
            ListRequest::new().filter("name", Operator::ILike, "KIDNEY"),
            ListRequest::new().filter("width", Operator::Gte, "500"),
            ListRequest::new().page(1, 0),
        ] {
            let page = list_project(&world, Caller::user(10), world.open, &request);
            assert_eq!(
                page.collection.len() as u64,
                page.total() - request.offset,
                "request {:?}",
                request
            );
        }
    }

    #[test]
    fn open_projects_filter_and_show_real_names() {
        let world = world();
        let request = ListRequest::new().filter("name", Operator::ILike, "KIDNEY");
        let page = list_project(&world, Caller::user(10), world.open, &request);
        assert_eq!(page.total(), 2);
        assert_eq!(text(&page.collection[0], "instanceFilename"), "kidney-01.svs");
        assert_eq!(page.collection[0]["projectName"], SqlValue::Text("Open".into()));
    }

    #[test]
    fn blind_projects_never_leak_names() {
        let world = world();
        let request = ListRequest::new().filter("name", Operator::ILike, "kidney");
        let page = list_project(&world, Caller::user(10), world.blind, &request);
        assert_eq!(page.total(), 0);

        let page = list_project(&world, Caller::user(10), world.blind, &ListRequest::new());
        assert_eq!(page.total(), 3);
        for row in &page.collection {
            for value in row.values() {
                if let Some(s) = value.as_str() {
                    assert!(!s.contains(".svs"), "leaked {}", s);
                }
            }
            assert!(!row.contains_key("originalFilename"));
            assert_eq!(row["instanceFilename"], row["blindedName"]);
        }

        let id = world.images[1].to_string();
        let request = ListRequest::new().filter("name", Operator::Equals, id.as_str());
        let page = list_project(&world, Caller::user(10), world.blind, &request);
        assert_eq!(page.total(), 1);
        assert_eq!(text(&page.collection[0], "instanceFilename"), id);
    }

    #[test]
    fn managers_see_through_blind_mode() {
        let world = world();
        let request = ListRequest::new().filter("name", Operator::ILike, "liver");
        let page = list_project(&world, Caller::user(11), world.blind, &request);
        assert_eq!(page.total(), 1);
        let row = &page.collection[0];
        assert_eq!(text(row, "instanceFilename"), "liver-01.svs");
        assert_eq!(text(row, "blindedName"), world.images[2].to_string());

        let id = world.images[2].to_string();
        let request = ListRequest::new().filter("name", Operator::Equals, id.as_str());
        assert_eq!(list_project(&world, Caller::user(11), world.blind, &request).total(), 1);
    }

    #[test]
    fn user_listing_redacts_per_project() {
        let world = world();
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(10), &config);

        let request = ListRequest::new().filter("name", Operator::ILike, "kidney-02");
        let page = instances_of_user(&world.store, &ctx, &request).unwrap().into_data();
        assert_eq!(page.total(), 1);
        assert_eq!(page.collection[0]["project"], SqlValue::Integer(world.open));

        let request = ListRequest::new().sort_by("name", SortDirection::Asc);
        let page = instances_of_user(&world.store, &ctx, &request).unwrap().into_data();
        assert_eq!(page.total(), 6);
        let blind_rows = page
            .collection
            .iter()
            .filter(|row| row["project"] == SqlValue::Integer(world.blind));
        for row in blind_rows {
            assert_eq!(row["instanceFilename"], row["blindedName"]);
        }
    }

    #[test]
    fn strangers_see_nothing() {
        let world = world();
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(99), &config);

        let err = instances_in_project(&world.store, &ctx, world.open, &ListRequest::new()).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
        let page = instances_of_user(&world.store, &ctx, &ListRequest::new()).unwrap().into_data();
        assert_eq!(page.total(), 0);
    }

    #[test]
    fn deleted_instances_are_hidden() {
        let world = world();
        let first = list_project(&world, Caller::user(10), world.open, &ListRequest::new());
        let id = first.collection[0]["id"].as_i64().unwrap();
        mark_deleted(&world.store, id);
        let page = list_project(&world, Caller::user(10), world.open, &ListRequest::new());
        assert_eq!(page.total(), 2);
    }

    #[test]
    fn pages_are_stable_and_disjoint() {
        let world = world();
        let mut seen = BTreeSet::new();
        for offset in 0..3 {
            let request = ListRequest::new()
                .sort_by("numberOfAnnotations", SortDirection::Desc)
                .page(offset, 1);
            let page = list_project(&world, Caller::user(10), world.open, &request);
            assert_eq!(page.collection.len(), 1);
            assert_eq!(page.total_pages, 3);
            assert!(seen.insert(page.collection[0]["id"].as_i64().unwrap()));
        }
    }

    #[test]
    fn counters_sort_and_filter() {
        let world = world();
        let page = list_project(&world, Caller::user(10), world.open, &ListRequest::new());
        let busiest = page.collection[2]["id"].as_i64().unwrap();
        seed_counters(&world.store, busiest, 12);

        let request = ListRequest::new().sort_by("numberOfAnnotations", SortDirection::Desc);
        let page = list_project(&world, Caller::user(10), world.open, &request);
        assert_eq!(page.collection[0]["id"], SqlValue::Integer(busiest));
        assert_eq!(page.collection[0]["numberOfAnnotations"], SqlValue::Integer(12));

        let request = ListRequest::new().filter("numberOfAnnotations", Operator::Gte, "1");
        assert_eq!(list_project(&world, Caller::user(10), world.open, &request).total(), 1);
    }

    #[test]
    fn tag_filter_matches_tagged_instances() {
        let world = world();
        let page = list_project(&world, Caller::user(10), world.open, &ListRequest::new());
        let tagged = page.collection[1]["id"].as_i64().unwrap();
        let tag = seed_tag(&world.store, "tumor", tagged);
        seed_tag(&world.store, "review", tagged);

        let request = ListRequest::new().filter("tag", Operator::Equals, tag.to_string());
        let page = list_project(&world, Caller::user(10), world.open, &request);
        assert_eq!(page.total(), 1);
        assert_eq!(page.collection[0]["id"], SqlValue::Integer(tagged));
    }

    #[test]
    fn unknown_sort_is_rejected() {
        let world = world();
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(10), &config);
        let request = ListRequest::new().sort_by("secret", SortDirection::Asc);
        let err = instances_in_project(&world.store, &ctx, world.open, &request).unwrap_err();
        assert!(matches!(err, CatalogError::SortNotSupported(_)));
    }

    #[test]
    fn ignored_filters_are_reported() {
        let world = world();
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let ctx = Ctx::new(&acl, Caller::user(10), &config);
        let request = ListRequest::new().filter("colour", Operator::Equals, "red");
        let result = instances_in_project(&world.store, &ctx, world.open, &request).unwrap();
        assert_eq!(result.data.ignored, vec!["colour".to_string()]);
        assert_eq!(result.data.total(), 3);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn root_images_are_scoped_to_storages() {
        let world = world();
        let other = seed_storage(&world.store, 2);
        seed_root_image(&world.store, Some(other), "elsewhere.tif");
        seed_member(&world.store, world.open, 1, false);
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();

        let owner = Ctx::new(&acl, Caller::user(1), &config);
        let page = root_images(&world.store, &owner, &ListRequest::new(), Some(world.open))
            .unwrap()
            .into_data();
        assert_eq!(page.total(), 3);
        assert!(page
            .collection
            .iter()
            .all(|row| row["inProject"] == SqlValue::Bool(true)));
        let json = serde_json::to_string(&page).unwrap();
        assert!(json.contains("\"inProject\":true"));

        let admin = Ctx::new(&acl, Caller::admin(50), &config);
        let request = ListRequest::new().filter("name", Operator::Like, "elsewhere");
        let page = root_images(&world.store, &admin, &request, None).unwrap().into_data();
        assert_eq!(page.total(), 1);
        assert_eq!(page.collection[0]["contentType"], SqlValue::Text("image/tiff".into()));
        assert!(!page.collection[0].contains_key("inProject"));
    }

    #[test]
    fn light_project_listing_redacts_blind_names() {
        let world = world();
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();
        let member = Ctx::new(&acl, Caller::user(10), &config);

        let open = light_instances_in_project(&world.store, &member, world.open)
            .unwrap()
            .into_data();
        let names: Vec<_> = open.iter().filter_map(|i| i.instance_filename.clone()).collect();
        assert_eq!(names, vec!["kidney-01.svs", "kidney-02.svs", "liver-01.svs"]);
        assert!(open.iter().all(|i| i.blinded_name.is_none()));

        let blind = light_instances_in_project(&world.store, &member, world.blind)
            .unwrap()
            .into_data();
        assert_eq!(blind.len(), 3);
        for instance in &blind {
            assert!(instance.blinded_name.is_some());
            assert_eq!(instance.instance_filename, instance.blinded_name);
        }
        assert!(!serde_json::to_string(&blind).unwrap().contains(".svs"));
    }

    #[test]
    fn light_user_listing_drops_blind_names() {
        let world = world();
        let page = list_project(&world, Caller::user(10), world.open, &ListRequest::new());
        mark_deleted(&world.store, page.collection[0]["id"].as_i64().unwrap());
        let acl = Acl::load(&world.store).unwrap();
        let config = CatalogConfig::default();

        let member = Ctx::new(&acl, Caller::user(10), &config);
        let all = light_instances_of_user(&world.store, &member).unwrap().into_data();
        assert_eq!(all.len(), 5);
        for instance in &all {
            if instance.project == Some(world.blind) {
                assert_eq!(instance.instance_filename, None);
                assert!(instance.blinded_name.is_some());
                assert_eq!(instance.project_name.as_deref(), Some("Blind"));
            } else {
                assert!(instance.instance_filename.as_deref().unwrap().ends_with(".svs"));
                assert_eq!(instance.blinded_name, None);
                assert_eq!(instance.project_name.as_deref(), Some("Open"));
            }
        }

        let manager = Ctx::new(&acl, Caller::user(11), &config);
        let managed = light_instances_of_user(&world.store, &manager).unwrap().into_data();
        assert_eq!(managed.len(), 3);
        assert!(managed
            .iter()
            .all(|i| i.instance_filename.is_some() && i.blinded_name.is_some()));

        let nobody = Ctx::new(&acl, Caller::user(77), &config);
        assert!(light_instances_of_user(&world.store, &nobody).unwrap().data.is_empty());
    }
}
