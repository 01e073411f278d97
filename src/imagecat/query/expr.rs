//! Predicate tree and SQL rendering.
//!
//! Filters are compiled into an [`Expr`] tree first and rendered to SQL text
//! last. Rendering is the only place SQL is produced: column references come
//! from the allow-lists, every value goes through a [`ParamSink`] and shows up
//! in the text as a named placeholder.

use super::columns::Table;
use crate::store::{Params, SqlValue};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column { table: Table, column: &'static str },
    Value(SqlValue),
    Coalesce(Vec<Operand>),
    CastText(Box<Operand>),
    Lower(Box<Operand>),
    Case {
        when: Box<Expr>,
        then: Box<Operand>,
        otherwise: Box<Operand>,
    },
}

impl Operand {
    pub fn column(table: Table, column: &'static str) -> Self {
        Operand::Column { table, column }
    }

    pub fn value(value: impl Into<SqlValue>) -> Self {
        Operand::Value(value.into())
    }

    pub fn cast_text(self) -> Self {
        Operand::CastText(Box::new(self))
    }

    pub fn lower(self) -> Self {
        Operand::Lower(Box::new(self))
    }

    fn collect_tables(&self, tables: &mut BTreeSet<Table>) {
        match self {
            Operand::Column { table, .. } => {
                tables.insert(*table);
            }
            Operand::Value(_) => {}
            Operand::Coalesce(items) => items.iter().for_each(|o| o.collect_tables(tables)),
            Operand::CastText(inner) | Operand::Lower(inner) => inner.collect_tables(tables),
            Operand::Case {
                when,
                then,
                otherwise,
            } => {
                when.collect_tables(tables);
                then.collect_tables(tables);
                otherwise.collect_tables(tables);
            }
        }
    }

    pub fn tables(&self) -> BTreeSet<Table> {
        let mut tables = BTreeSet::new();
        self.collect_tables(&mut tables);
        tables
    }

    pub fn render(&self, sink: &mut ParamSink) -> String {
        match self {
            Operand::Column { table, column } => format!("{}.{}", table.alias(), column),
            Operand::Value(value) => sink.push(value.clone()),
            Operand::Coalesce(items) => format!("COALESCE({})", render_list(items, sink)),
            Operand::CastText(inner) => format!("CAST({} AS TEXT)", inner.render(sink)),
            Operand::Lower(inner) => format!("LOWER({})", inner.render(sink)),
            Operand::Case {
                when,
                then,
                otherwise,
            } => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                when.render(sink),
                then.render(sink),
                otherwise.render(sink)
            ),
        }
    }
}

fn render_list(items: &[Operand], sink: &mut ParamSink) -> String {
    items
        .iter()
        .map(|item| item.render(sink))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Like,
    Gte,
    Lte,
}

impl CmpOp {
    fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Like => "LIKE",
            CmpOp::Gte => ">=",
            CmpOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare { lhs: Operand, op: CmpOp, rhs: Operand },
    IsNull(Operand),
    IsNotNull(Operand),
    In { operand: Operand, values: Vec<Operand> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Const(bool),
}

impl Expr {
    pub fn compare(lhs: Operand, op: CmpOp, rhs: Operand) -> Self {
        Expr::Compare { lhs, op, rhs }
    }

    pub fn equals(lhs: Operand, value: impl Into<SqlValue>) -> Self {
        Expr::compare(lhs, CmpOp::Eq, Operand::value(value))
    }

    /// `operand IN (ids...)`; an empty id list is a constant false.
    pub fn in_ids(operand: Operand, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return Expr::Const(false);
        }
        Expr::In {
            operand,
            values: ids.iter().map(|id| Operand::value(*id)).collect(),
        }
    }

    /// Conjunction that drops constant-true members and collapses to a
    /// single member where it can.
    pub fn all(exprs: Vec<Expr>) -> Self {
        let mut exprs: Vec<Expr> = exprs.into_iter().filter(|e| *e != Expr::Const(true)).collect();
        if exprs.iter().any(|e| *e == Expr::Const(false)) {
            return Expr::Const(false);
        }
        match exprs.len() {
            0 => Expr::Const(true),
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        }
    }

    /// Disjunction that drops constant-false members and collapses to a
    /// single member where it can.
    pub fn any(exprs: Vec<Expr>) -> Self {
        let mut exprs: Vec<Expr> = exprs.into_iter().filter(|e| *e != Expr::Const(false)).collect();
        if exprs.iter().any(|e| *e == Expr::Const(true)) {
            return Expr::Const(true);
        }
        match exprs.len() {
            0 => Expr::Const(false),
            1 => exprs.remove(0),
            _ => Expr::Or(exprs),
        }
    }

    fn collect_tables(&self, tables: &mut BTreeSet<Table>) {
        match self {
            Expr::Compare { lhs, rhs, .. } => {
                lhs.collect_tables(tables);
                rhs.collect_tables(tables);
            }
            Expr::IsNull(operand) | Expr::IsNotNull(operand) => operand.collect_tables(tables),
            Expr::In { operand, values } => {
                operand.collect_tables(tables);
                values.iter().for_each(|v| v.collect_tables(tables));
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                exprs.iter().for_each(|e| e.collect_tables(tables))
            }
            Expr::Const(_) => {}
        }
    }

    /// Every table the predicate references.
    pub fn tables(&self) -> BTreeSet<Table> {
        let mut tables = BTreeSet::new();
        self.collect_tables(&mut tables);
        tables
    }

    pub fn render(&self, sink: &mut ParamSink) -> String {
        match self {
            Expr::Compare { lhs, op, rhs } => {
                format!("{} {} {}", lhs.render(sink), op.as_sql(), rhs.render(sink))
            }
            Expr::IsNull(operand) => format!("{} IS NULL", operand.render(sink)),
            Expr::IsNotNull(operand) => format!("{} IS NOT NULL", operand.render(sink)),
            Expr::In { operand, values } => {
                format!("{} IN ({})", operand.render(sink), render_list(values, sink))
            }
            Expr::And(exprs) => render_joined(exprs, " AND ", sink),
            Expr::Or(exprs) => render_joined(exprs, " OR ", sink),
            Expr::Const(true) => "1 = 1".to_string(),
            Expr::Const(false) => "1 = 0".to_string(),
        }
    }
}

fn render_joined(exprs: &[Expr], separator: &str, sink: &mut ParamSink) -> String {
    let parts: Vec<String> = exprs.iter().map(|e| e.render(sink)).collect();
    format!("({})", parts.join(separator))
}

/// Collects bound values and hands out placeholder names.
///
/// Each statement part gets its own prefix, so the parameters of a part can
/// be bound only to the statements that contain it.
#[derive(Debug, Clone)]
pub struct ParamSink {
    prefix: &'static str,
    params: Params,
}

impl ParamSink {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            params: Params::new(),
        }
    }

    /// Bind a value and return its placeholder.
    pub fn push(&mut self, value: SqlValue) -> String {
        let name = format!("{}{}", self.prefix, self.params.len());
        let placeholder = format!(":{}", name);
        self.params.insert(name, value);
        placeholder
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(column: &'static str) -> Operand {
        Operand::column(Table::Instance, column)
    }

    #[test]
    fn renders_values_as_placeholders() {
        let expr = Expr::all(vec![
            Expr::equals(col("project_id"), 7i64),
            Expr::compare(
                col("instance_filename").lower(),
                CmpOp::Like,
                Operand::value("%x' OR 1=1 --%").lower(),
            ),
        ]);
        let mut sink = ParamSink::new("p");
        let sql = expr.render(&mut sink);

        assert_eq!(
            sql,
            "(ii.project_id = :p0 AND LOWER(ii.instance_filename) LIKE LOWER(:p1))"
        );
        assert_eq!(sink.params()["p0"], SqlValue::Integer(7));
        assert_eq!(
            sink.params()["p1"],
            SqlValue::Text("%x' OR 1=1 --%".to_string())
        );
    }

    #[test]
    fn empty_id_list_is_constant_false() {
        assert_eq!(Expr::in_ids(col("project_id"), &[]), Expr::Const(false));
        let mut sink = ParamSink::new("p");
        assert_eq!(Expr::Const(false).render(&mut sink), "1 = 0");
        assert!(sink.params().is_empty());
    }

    #[test]
    fn all_and_any_simplify_constants() {
        let a = Expr::IsNull(col("deleted"));
        assert_eq!(Expr::all(vec![Expr::Const(true), a.clone()]), a);
        assert_eq!(Expr::all(vec![a.clone(), Expr::Const(false)]), Expr::Const(false));
        assert_eq!(Expr::any(vec![Expr::Const(false), a.clone()]), a);
        assert_eq!(Expr::any(vec![]), Expr::Const(false));
        assert_eq!(Expr::all(vec![]), Expr::Const(true));
    }

    #[test]
    fn collects_referenced_tables() {
        let expr = Expr::any(vec![
            Expr::equals(col("id"), 1i64),
            Expr::IsNull(Operand::Coalesce(vec![
                col("instance_filename"),
                Operand::column(Table::RootImage, "original_filename"),
            ])),
        ]);
        let tables: Vec<Table> = expr.tables().into_iter().collect();
        assert_eq!(tables, vec![Table::Instance, Table::RootImage]);
    }

    #[test]
    fn sinks_with_different_prefixes_do_not_collide() {
        let mut filters = ParamSink::new("p");
        let mut sort = ParamSink::new("s");
        assert_eq!(filters.push(1i64.into()), ":p0");
        assert_eq!(sort.push(2i64.into()), ":s0");
        assert_eq!(filters.push(3i64.into()), ":p1");
    }
}
