//! List query grammar for certificate collections.
//!
//! A list request's query string is parsed into a [`ListQuery`]:
//!
//! ```text
//! ?offset=0&limit=50&sort=name.asc,id.desc&expand=owner
//!  &type=dns&name:contains=edge&ownerId:in=1,2&domainNames:ends=.example.com
//! ```
//!
//! Filters are `field=value` (equality) or `field:modifier=value`. Anything
//! that does not fit the grammar is rejected with a [`QueryError`] instead of
//! being silently dropped, except for unknown expansion names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{CertificateStatus, CertificateType, ExpansionSet};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

/// Error produced when a list query cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct QueryError(pub String);

impl QueryError {
    fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// Fields a certificate list can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Name,
    Type,
    Status,
    OwnerId,
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Type => "certificate_type",
            Self::Status => "status",
            Self::OwnerId => "owner_id",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::ExpiresAt => "expires_at",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Type => "type",
            Self::Status => "status",
            Self::OwnerId => "ownerId",
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
            Self::ExpiresAt => "expiresAt",
        }
    }
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "type" => Ok(Self::Type),
            "status" => Ok(Self::Status),
            "ownerId" => Ok(Self::OwnerId),
            "createdAt" => Ok(Self::CreatedAt),
            "updatedAt" => Ok(Self::UpdatedAt),
            "expiresAt" => Ok(Self::ExpiresAt),
            other => Err(QueryError::new(format!("Cannot sort by unknown field '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `field.direction` element of the sort parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}.{}", self.field.as_str(), direction)
    }
}

impl FromStr for Sort {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once('.') {
            Some((field, "asc")) => (field, SortDirection::Asc),
            Some((field, "desc")) => (field, SortDirection::Desc),
            Some((_, other)) => {
                return Err(QueryError::new(format!("Invalid sort direction '{}'", other)))
            }
            None => (s, SortDirection::Asc),
        };
        Ok(Self { field: field.parse()?, direction })
    }
}

/// Fields a certificate list can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Id,
    Name,
    Type,
    Status,
    OwnerId,
    DomainNames,
}

impl FilterField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Type => "certificate_type",
            Self::Status => "status",
            Self::OwnerId => "owner_id",
            Self::DomainNames => "domain_names",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Id | Self::OwnerId)
    }
}

impl FromStr for FilterField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "type" => Ok(Self::Type),
            "status" => Ok(Self::Status),
            "ownerId" => Ok(Self::OwnerId),
            "domainNames" => Ok(Self::DomainNames),
            other => Err(QueryError::new(format!("Cannot filter on unknown field '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterModifier {
    Equals,
    Not,
    Contains,
    Starts,
    Ends,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterModifier {
    fn is_text_match(&self) -> bool {
        matches!(self, Self::Contains | Self::Starts | Self::Ends)
    }

    fn is_comparison(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    fn is_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl FromStr for FilterModifier {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "not" => Ok(Self::Not),
            "contains" => Ok(Self::Contains),
            "starts" => Ok(Self::Starts),
            "ends" => Ok(Self::Ends),
            "in" => Ok(Self::In),
            "notin" => Ok(Self::NotIn),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            other => Err(QueryError::new(format!("Unknown filter modifier '{}'", other))),
        }
    }
}

/// A typed filter operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Integer(i64),
    Text(String),
}

/// A single parsed filter condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: FilterField,
    pub modifier: FilterModifier,
    /// One value, or several for `in` / `notin`
    pub values: Vec<FilterValue>,
}

impl Filter {
    fn parse(key: &str, raw_value: &str) -> Result<Self, QueryError> {
        let (field, modifier) = match key.split_once(':') {
            Some((field, modifier)) => (field.parse::<FilterField>()?, modifier.parse()?),
            None => (key.parse::<FilterField>()?, FilterModifier::Equals),
        };

        if field.is_numeric() && modifier.is_text_match() {
            return Err(QueryError::new(format!(
                "Modifier '{:?}' cannot be used on numeric field '{}'",
                modifier, key
            )));
        }
        if !field.is_numeric() && modifier.is_comparison() {
            return Err(QueryError::new(format!(
                "Modifier '{:?}' can only be used on numeric fields",
                modifier
            )));
        }

        let raw_values: Vec<&str> = if modifier.is_list() {
            raw_value.split(',').map(str::trim).filter(|v| !v.is_empty()).collect()
        } else {
            vec![raw_value]
        };
        if raw_values.is_empty() {
            return Err(QueryError::new(format!("Filter '{}' needs at least one value", key)));
        }

        let values = raw_values
            .into_iter()
            .map(|raw| Self::parse_value(field, modifier, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { field, modifier, values })
    }

    fn parse_value(
        field: FilterField,
        modifier: FilterModifier,
        raw: &str,
    ) -> Result<FilterValue, QueryError> {
        if field.is_numeric() {
            return raw.parse::<i64>().map(FilterValue::Integer).map_err(|_| {
                QueryError::new(format!("Filter value '{}' is not an integer", raw))
            });
        }

        // Exact matches on enumerated fields must name a real variant.
        if !modifier.is_text_match() {
            match field {
                FilterField::Type => {
                    raw.parse::<CertificateType>().map_err(QueryError::new)?;
                }
                FilterField::Status => {
                    raw.parse::<CertificateStatus>().map_err(QueryError::new)?;
                }
                _ => {}
            }
        }

        Ok(FilterValue::Text(raw.to_string()))
    }
}

/// Fully parsed list request: page descriptor, filters and expansions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: i64,
    pub limit: i64,
    pub sort: Vec<Sort>,
    pub filters: Vec<Filter>,
    pub expand: ExpansionSet,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            sort: vec![Sort { field: SortField::Name, direction: SortDirection::Asc }],
            filters: Vec::new(),
            expand: ExpansionSet::none(),
        }
    }
}

impl ListQuery {
    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let mut query = ListQuery::default();

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "offset" => {
                    query.offset = value
                        .parse::<i64>()
                        .ok()
                        .filter(|offset| *offset >= 0)
                        .ok_or_else(|| {
                            QueryError::new(format!(
                                "offset must be a non-negative integer, got '{}'",
                                value
                            ))
                        })?;
                }
                "limit" => {
                    query.limit = value
                        .parse::<i64>()
                        .ok()
                        .filter(|limit| (1..=MAX_LIMIT).contains(limit))
                        .ok_or_else(|| {
                            QueryError::new(format!(
                                "limit must be an integer between 1 and {}, got '{}'",
                                MAX_LIMIT, value
                            ))
                        })?;
                }
                "sort" => {
                    query.sort = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(Sort::from_str)
                        .collect::<Result<Vec<_>, _>>()?;
                    if query.sort.is_empty() {
                        return Err(QueryError::new("sort cannot be empty"));
                    }
                }
                "expand" => query.expand = ExpansionSet::parse(&value),
                key => query.filters.push(Filter::parse(key, &value)?),
            }
        }

        Ok(query)
    }

    /// Sort expression echoed back to clients, e.g. `name.asc,id.desc`
    pub fn sort_expression(&self) -> String {
        self.sort.iter().map(Sort::to_string).collect::<Vec<_>>().join(",")
    }
}

/// One page of results together with the total number of matches
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Expansion;

    #[test]
    fn test_parse_empty_query_uses_defaults() {
        let query = ListQuery::parse("").unwrap();
        assert_eq!(query, ListQuery::default());
        assert_eq!(query.sort_expression(), "name.asc");
    }

    #[test]
    fn test_parse_page_descriptor() {
        let query = ListQuery::parse("offset=20&limit=10&sort=createdAt.desc,id").unwrap();
        assert_eq!(query.offset, 20);
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort_expression(), "createdAt.desc,id.asc");
    }

    #[test]
    fn test_parse_rejects_malformed_pagination() {
        assert!(ListQuery::parse("limit=abc").is_err());
        assert!(ListQuery::parse("limit=0").is_err());
        assert!(ListQuery::parse("limit=5000").is_err());
        assert!(ListQuery::parse("offset=-1").is_err());
        assert!(ListQuery::parse("sort=name.sideways").is_err());
        assert!(ListQuery::parse("sort=secret").is_err());
    }

    #[test]
    fn test_parse_filters() {
        let query = ListQuery::parse("type=dns&name:contains=edge&ownerId:in=1,%202").unwrap();
        assert_eq!(query.filters.len(), 3);

        assert_eq!(query.filters[0].field, FilterField::Type);
        assert_eq!(query.filters[0].modifier, FilterModifier::Equals);

        assert_eq!(query.filters[1].modifier, FilterModifier::Contains);
        assert_eq!(query.filters[1].values, vec![FilterValue::Text("edge".to_string())]);

        assert_eq!(
            query.filters[2].values,
            vec![FilterValue::Integer(1), FilterValue::Integer(2)]
        );
    }

    #[test]
    fn test_parse_rejects_bad_filters() {
        assert!(ListQuery::parse("secret=1").is_err());
        assert!(ListQuery::parse("name:near=x").is_err());
        assert!(ListQuery::parse("id=seven").is_err());
        assert!(ListQuery::parse("id:contains=7").is_err());
        assert!(ListQuery::parse("name:gt=a").is_err());
        assert!(ListQuery::parse("type=acme").is_err());
        assert!(ListQuery::parse("status:in=").is_err());
    }

    #[test]
    fn test_parse_text_match_on_enum_field_is_free_text() {
        let query = ListQuery::parse("type:starts=d").unwrap();
        assert_eq!(query.filters[0].values, vec![FilterValue::Text("d".to_string())]);
    }

    #[test]
    fn test_parse_expand() {
        let query = ListQuery::parse("expand=owner,unknown").unwrap();
        assert!(query.expand.contains(Expansion::Owner));
    }
}
