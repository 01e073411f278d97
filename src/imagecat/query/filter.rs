//! Caller-facing listing requests.
//!
//! A request is a list of `(property, operator, value)` filters, an optional
//! sort column and a page window. Nothing here is trusted: properties are only
//! ever matched against the allow-lists in [`super::columns`], values are only
//! ever bound as parameters.

use crate::error::{CatalogError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Like,
    ILike,
    In,
    Gte,
    Lte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "nequals",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::In => "in",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equals" | "eq" => Ok(Operator::Equals),
            "nequals" | "ne" => Ok(Operator::NotEquals),
            "like" => Ok(Operator::Like),
            "ilike" => Ok(Operator::ILike),
            "in" => Ok(Operator::In),
            "gte" => Ok(Operator::Gte),
            "lte" => Ok(Operator::Lte),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown filter operator '{}'",
                other
            ))),
        }
    }
}

/// Raw filter value. The literal `null` stands for SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Single(String),
    List(Vec<String>),
}

impl FilterValue {
    /// The value as a list; a single value becomes a one-element list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            FilterValue::Single(v) => vec![v.clone()],
            FilterValue::List(values) => values.clone(),
        }
    }

    pub fn single(&self) -> Result<&str> {
        match self {
            FilterValue::Single(v) => Ok(v),
            FilterValue::List(values) if values.len() == 1 => Ok(&values[0]),
            FilterValue::List(values) => Err(CatalogError::InvalidArgument(format!(
                "expected a single value, got {} values",
                values.len()
            ))),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Single(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Single(value)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::List(values.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::List(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameter {
    pub property: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl SearchParameter {
    pub fn new(property: impl Into<String>, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Parses the query-string form `property[operator]=value`. `in` values are
/// comma separated.
impl FromStr for SearchParameter {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            CatalogError::InvalidArgument(format!(
                "filter '{}' is not of the form property[operator]=value",
                s
            ))
        };
        let (key, raw) = s.split_once('=').ok_or_else(invalid)?;
        let (property, rest) = key.split_once('[').ok_or_else(invalid)?;
        let operator: Operator = rest.strip_suffix(']').ok_or_else(invalid)?.parse()?;
        if property.is_empty() {
            return Err(invalid());
        }

        let value = if operator == Operator::In {
            FilterValue::List(raw.split(',').map(|v| v.trim().to_string()).collect())
        } else {
            FilterValue::Single(raw.to_string())
        };
        Ok(SearchParameter::new(property, operator, value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` sorts ascending.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A listing request: filters, sort and page window (`max = 0` = no limit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub filters: Vec<SearchParameter>,
    pub sort: Option<String>,
    pub direction: SortDirection,
    pub offset: u64,
    pub max: u64,
}

impl ListRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        mut self,
        property: impl Into<String>,
        operator: Operator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.filters.push(SearchParameter::new(property, operator, value));
        self
    }

    pub fn sort_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(column.into());
        self.direction = direction;
        self
    }

    pub fn page(mut self, offset: u64, max: u64) -> Self {
        self.offset = offset;
        self.max = max;
        self
    }

    pub fn sort_column(&self) -> &str {
        self.sort.as_deref().unwrap_or("created")
    }
}
