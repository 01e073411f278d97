//! Operator semantics: one filter applied to one resolved operand.

use super::columns::ValueKind;
use super::expr::{CmpOp, Expr, Operand};
use super::filter::{Operator, SearchParameter};
use crate::error::{CatalogError, Result};
use crate::store::SqlValue;

/// Compile `param` against `target`, coercing values to `kind`.
pub fn compile(param: &SearchParameter, target: Operand, kind: ValueKind) -> Result<Expr> {
    match param.operator {
        Operator::Equals => {
            let value = kind.coerce(param.value.single()?)?;
            Ok(if value.is_null() {
                Expr::IsNull(target)
            } else {
                Expr::compare(target, CmpOp::Eq, Operand::Value(value))
            })
        }
        Operator::NotEquals => {
            let value = kind.coerce(param.value.single()?)?;
            Ok(if value.is_null() {
                Expr::IsNotNull(target)
            } else {
                Expr::compare(target, CmpOp::Ne, Operand::Value(value))
            })
        }
        Operator::Like | Operator::ILike => {
            let pattern = like_pattern(param.value.single()?);
            let target = if kind == ValueKind::Text {
                target
            } else {
                target.cast_text()
            };
            Ok(if param.operator == Operator::Like {
                Expr::compare(target, CmpOp::Like, Operand::value(pattern))
            } else {
                Expr::compare(target.lower(), CmpOp::Like, Operand::value(pattern).lower())
            })
        }
        Operator::Gte | Operator::Lte => {
            let value = kind.coerce(param.value.single()?)?;
            if value.is_null() {
                return Err(CatalogError::InvalidArgument(format!(
                    "'{}' cannot compare {} against null",
                    param.property, param.operator
                )));
            }
            let op = if param.operator == Operator::Gte {
                CmpOp::Gte
            } else {
                CmpOp::Lte
            };
            Ok(Expr::compare(target, op, Operand::Value(value)))
        }
        Operator::In => compile_in(&param.value.to_list(), target, kind),
    }
}

/// `x IN (...)` over de-duplicated values; `null` members become `x IS NULL`.
fn compile_in(raw: &[String], target: Operand, kind: ValueKind) -> Result<Expr> {
    let mut values: Vec<SqlValue> = Vec::new();
    let mut with_null = false;
    for item in raw {
        let value = kind.coerce(item)?;
        if value.is_null() {
            with_null = true;
        } else if !values.contains(&value) {
            values.push(value);
        }
    }

    let listed = if values.is_empty() {
        Expr::Const(false)
    } else {
        Expr::In {
            operand: target.clone(),
            values: values.into_iter().map(Operand::Value).collect(),
        }
    };
    if with_null {
        Ok(Expr::any(vec![listed, Expr::IsNull(target)]))
    } else {
        Ok(listed)
    }
}

/// `abc*def` becomes `%abc%def%`.
pub fn like_pattern(raw: &str) -> String {
    format!("%{}%", raw.replace('*', "%"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::columns::Table;
    use crate::query::expr::ParamSink;
    use crate::query::filter::FilterValue;

    fn render(
        property: &str,
        operator: Operator,
        value: impl Into<FilterValue>,
        kind: ValueKind,
    ) -> (String, Vec<SqlValue>) {
        let param = SearchParameter::new(property, operator, value);
        let expr = compile(&param, Operand::column(Table::Instance, "col"), kind).unwrap();
        let mut sink = ParamSink::new("p");
        let sql = expr.render(&mut sink);
        (sql, sink.into_params().into_values().collect())
    }

    #[test]
    fn equals_null_is_is_null() {
        let (sql, params) = render("x", Operator::Equals, "null", ValueKind::Integer);
        assert_eq!(sql, "ii.col IS NULL");
        assert!(params.is_empty());

        let (sql, _) = render("x", Operator::NotEquals, "null", ValueKind::Text);
        assert_eq!(sql, "ii.col IS NOT NULL");
    }

    #[test]
    fn like_wraps_and_translates_wildcards() {
        let (sql, params) = render("x", Operator::Like, "ab*cd", ValueKind::Text);
        assert_eq!(sql, "ii.col LIKE :p0");
        assert_eq!(params, vec![SqlValue::Text("%ab%cd%".into())]);

        let (sql, _) = render("x", Operator::ILike, "AB", ValueKind::Text);
        assert_eq!(sql, "LOWER(ii.col) LIKE LOWER(:p0)");

        let (sql, _) = render("x", Operator::Like, "4", ValueKind::Integer);
        assert_eq!(sql, "CAST(ii.col AS TEXT) LIKE :p0");
    }

    #[test]
    fn in_deduplicates_and_handles_null() {
        let (sql, params) = render("x", Operator::In, vec!["1", "2", "1"], ValueKind::Integer);
        assert_eq!(sql, "ii.col IN (:p0, :p1)");
        assert_eq!(params, vec![SqlValue::Integer(1), SqlValue::Integer(2)]);

        let (sql, _) = render("x", Operator::In, vec!["1", "null"], ValueKind::Integer);
        assert_eq!(sql, "(ii.col IN (:p0) OR ii.col IS NULL)");

        let (sql, params) = render("x", Operator::In, vec!["null"], ValueKind::Integer);
        assert_eq!(sql, "ii.col IS NULL");
        assert!(params.is_empty());

        let (sql, _) = render("x", Operator::In, Vec::<String>::new(), ValueKind::Integer);
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn range_operators_coerce_values() {
        let (sql, params) = render("x", Operator::Gte, "10", ValueKind::Integer);
        assert_eq!(sql, "ii.col >= :p0");
        assert_eq!(params, vec![SqlValue::Integer(10)]);

        let param = SearchParameter::new("x", Operator::Lte, "ten");
        let target = Operand::column(Table::Instance, "col");
        assert!(compile(&param, target.clone(), ValueKind::Integer).is_err());

        let param = SearchParameter::new("x", Operator::Lte, "null");
        assert!(compile(&param, target, ValueKind::Integer).is_err());
    }
}
