//! Blind-mode redaction.
//!
//! A blind project hides real image names from its non-manager members. Every
//! project in a listing's scope is classified once per request, and the same
//! classification drives the name filter, the name sort and the row
//! projection, for single-project and multi-project listings alike.

use super::columns::Table;
use super::expr::{Expr, Operand};
use crate::access::Permissions;
use crate::error::Result;
use crate::model::{Caller, Id, ProjectInstance};
use std::collections::BTreeMap;

/// How a caller sees the names in one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Not blind: real names everywhere.
    Open,
    /// Blind and not a manager: names are the root image id.
    Redacted,
    /// Blind but a manager: real names, plus the blinded name.
    Managed,
}

impl Visibility {
    pub fn of<P: Permissions>(permissions: &P, project: Id, caller: &Caller) -> Self {
        if !permissions.is_blind_mode_active(project, caller) {
            Visibility::Open
        } else if permissions.is_manager(project, caller) {
            Visibility::Managed
        } else {
            Visibility::Redacted
        }
    }

    pub fn is_blind(&self) -> bool {
        !matches!(self, Visibility::Open)
    }

    /// Shape a single instance the way a listing row would show it.
    pub fn apply(self, mut instance: ProjectInstance) -> ProjectInstance {
        let blinded = instance.base_image_id.to_string();
        match self {
            Visibility::Open => {}
            Visibility::Redacted => {
                instance.instance_filename = Some(blinded.clone());
                instance.blinded_name = Some(blinded);
            }
            Visibility::Managed => instance.blinded_name = Some(blinded),
        }
        instance
    }
}

/// Instance override, else the root image's original filename.
pub fn real_name() -> Operand {
    Operand::Coalesce(vec![
        Operand::column(Table::Instance, "instance_filename"),
        Operand::column(Table::RootImage, "original_filename"),
    ])
}

/// The root image id as text.
pub fn blinded_name() -> Operand {
    Operand::column(Table::Instance, "base_image_id").cast_text()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redaction {
    projects: BTreeMap<Id, Visibility>,
}

impl Redaction {
    pub fn classify<P: Permissions>(permissions: &P, caller: &Caller, projects: &[Id]) -> Self {
        let projects = projects
            .iter()
            .map(|&id| (id, Visibility::of(permissions, id, caller)))
            .collect();
        Self { projects }
    }

    /// Projects outside the classified scope are treated as redacted.
    pub fn visibility(&self, project: Id) -> Visibility {
        self.projects
            .get(&project)
            .copied()
            .unwrap_or(Visibility::Redacted)
    }

    fn ids(&self, visibility: Visibility) -> Vec<Id> {
        self.projects
            .iter()
            .filter(|(_, v)| **v == visibility)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Compile a display-name filter. `compare` builds the comparison for one
    /// name operand; it is called once per name form in use.
    ///
    /// When the scope mixes visibilities, each branch is guarded by the
    /// project ids it applies to.
    pub fn name_filter<F>(&self, mut compare: F) -> Result<Expr>
    where
        F: FnMut(Operand) -> Result<Expr>,
    {
        let mut branches: Vec<(Vec<Id>, Expr)> = Vec::new();

        let open = self.ids(Visibility::Open);
        if !open.is_empty() {
            branches.push((open, compare(real_name())?));
        }
        let redacted = self.ids(Visibility::Redacted);
        if !redacted.is_empty() {
            branches.push((redacted, compare(blinded_name())?));
        }
        let managed = self.ids(Visibility::Managed);
        if !managed.is_empty() {
            let either = Expr::any(vec![compare(blinded_name())?, compare(real_name())?]);
            branches.push((managed, either));
        }

        if branches.len() == 1 {
            return Ok(branches.remove(0).1);
        }
        let project = Operand::column(Table::Instance, "project_id");
        Ok(Expr::any(
            branches
                .into_iter()
                .map(|(ids, expr)| Expr::all(vec![Expr::in_ids(project.clone(), &ids), expr]))
                .collect(),
        ))
    }

    /// The operand a name sort orders by: the name each row will display.
    pub fn name_sort(&self) -> Operand {
        let redacted = self.ids(Visibility::Redacted);
        if redacted.is_empty() {
            return real_name();
        }
        if redacted.len() == self.projects.len() {
            return blinded_name();
        }
        Operand::Case {
            when: Box::new(Expr::in_ids(
                Operand::column(Table::Instance, "project_id"),
                &redacted,
            )),
            then: Box::new(blinded_name()),
            otherwise: Box::new(real_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Acl;
    use crate::query::expr::{CmpOp, ParamSink};

    fn acl() -> Acl {
        Acl::new()
            .with_project(1, false)
            .with_member(1, 10)
            .with_project(2, true)
            .with_member(2, 10)
            .with_project(3, true)
            .with_manager(3, 10)
    }

    fn like(operand: Operand) -> Result<Expr> {
        Ok(Expr::compare(operand, CmpOp::Like, Operand::value("%a%")))
    }

    #[test]
    fn classifies_each_project() {
        let redaction = Redaction::classify(&acl(), &Caller::user(10), &[1, 2, 3]);
        assert_eq!(redaction.visibility(1), Visibility::Open);
        assert_eq!(redaction.visibility(2), Visibility::Redacted);
        assert_eq!(redaction.visibility(3), Visibility::Managed);
        assert_eq!(redaction.visibility(99), Visibility::Redacted);
    }

    #[test]
    fn single_visibility_needs_no_project_guard() {
        let redaction = Redaction::classify(&acl(), &Caller::user(10), &[2]);
        let mut sink = ParamSink::new("p");
        let sql = redaction.name_filter(like).unwrap().render(&mut sink);
        assert_eq!(sql, "CAST(ii.base_image_id AS TEXT) LIKE :p0");
    }

    #[test]
    fn managed_projects_match_either_name() {
        let redaction = Redaction::classify(&acl(), &Caller::user(10), &[3]);
        let mut sink = ParamSink::new("p");
        let sql = redaction.name_filter(like).unwrap().render(&mut sink);
        assert_eq!(
            sql,
            "(CAST(ii.base_image_id AS TEXT) LIKE :p0 OR \
             COALESCE(ii.instance_filename, ai.original_filename) LIKE :p1)"
        );
    }

    #[test]
    fn mixed_scope_guards_each_branch() {
        let redaction = Redaction::classify(&acl(), &Caller::user(10), &[1, 2]);
        let mut sink = ParamSink::new("p");
        let sql = redaction.name_filter(like).unwrap().render(&mut sink);
        assert_eq!(
            sql,
            "((ii.project_id IN (:p0) AND COALESCE(ii.instance_filename, ai.original_filename) LIKE :p1) OR \
             (ii.project_id IN (:p2) AND CAST(ii.base_image_id AS TEXT) LIKE :p3))"
        );
    }

    #[test]
    fn redacted_instances_show_the_root_id() {
        let store = crate::test_utils::test_store();
        let image = crate::test_utils::seed_root_image(&store, None, "patient-7.svs");
        let project = crate::test_utils::seed_project(&store, "Blind", true);
        let id = crate::test_utils::seed_instance(&store, project, image, 10);
        crate::test_utils::seed_instance_name(&store, id, "patient-7-left");
        let instance = crate::commands::helpers::fetch_instance(&store, id).unwrap();

        let redacted = Visibility::Redacted.apply(instance.clone());
        assert_eq!(redacted.instance_filename, Some(image.to_string()));
        assert_eq!(redacted.blinded_name, Some(image.to_string()));

        let managed = Visibility::Managed.apply(instance.clone());
        assert_eq!(managed.instance_filename.as_deref(), Some("patient-7-left"));
        assert_eq!(managed.blinded_name, Some(image.to_string()));

        assert_eq!(Visibility::Open.apply(instance.clone()), instance);
    }

    #[test]
    fn name_sort_follows_redaction() {
        let caller = Caller::user(10);
        assert_eq!(Redaction::classify(&acl(), &caller, &[1, 3]).name_sort(), real_name());
        assert_eq!(Redaction::classify(&acl(), &caller, &[2]).name_sort(), blinded_name());
        assert!(matches!(
            Redaction::classify(&acl(), &caller, &[1, 2]).name_sort(),
            Operand::Case { .. }
        ));
    }
}
