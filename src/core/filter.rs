//! Filter compilation.
//!
//! A caller-supplied `SearchFilters` compiles into one `CompiledFilter`
//! whose SQL rendering is shared by both retrieval channels. Each filter
//! kind is a tagged clause rendered in exactly one place, so the two
//! channels cannot drift apart in what they consider eligible.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Value;
use serde::Deserialize;

use super::error::{Result, RetrievalError};

/// Raw filter object as received from the CLI or MCP layer.
///
/// Dates are calendar days in `YYYY-MM-DD` form; both bounds are inclusive
/// of the whole named day. Omitted fields impose no constraint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub city: Option<String>,
    pub starred: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
enum FilterClause {
    /// Entry timestamp at or after the start of a day (unix seconds, UTC).
    CreatedAtLeast(i64),
    /// Entry timestamp strictly before the start of a day.
    CreatedBefore(i64),
    /// Case-insensitive city match.
    CityEquals(String),
    StarredIs(bool),
    /// Entry carries at least one tag from the set.
    HasAnyTag(Vec<String>),
}

/// A validated filter, ready to render against either channel's query.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    clauses: Vec<FilterClause>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.city.is_none()
            && self.starred.is_none()
            && self.tags.as_ref().map_or(true, |t| t.is_empty())
    }

    /// Validate and compile. Malformed dates are rejected here, before any
    /// retrieval is attempted.
    pub fn compile(&self) -> Result<CompiledFilter> {
        let mut clauses = Vec::new();

        if let Some(raw) = &self.date_from {
            let day = parse_day(raw)?;
            clauses.push(FilterClause::CreatedAtLeast(day_start(day)));
        }

        if let Some(raw) = &self.date_to {
            let day = parse_day(raw)?;
            // Inclusive of the whole end date: bound by the next day's start.
            let next = day.succ_opt().ok_or_else(|| {
                RetrievalError::InvalidFilter(format!("date_to '{}' has no following day", raw))
            })?;
            clauses.push(FilterClause::CreatedBefore(day_start(next)));
        }

        if let Some(city) = &self.city {
            clauses.push(FilterClause::CityEquals(city.clone()));
        }

        if let Some(starred) = self.starred {
            clauses.push(FilterClause::StarredIs(starred));
        }

        if let Some(tags) = &self.tags {
            if !tags.is_empty() {
                clauses.push(FilterClause::HasAnyTag(tags.clone()));
            }
        }

        Ok(CompiledFilter { clauses })
    }
}

impl CompiledFilter {
    /// Append this filter's SQL to a query against the entries table.
    ///
    /// `alias` names the entries table in the surrounding query. Fragments
    /// use positional `?` placeholders and params are pushed in fragment
    /// order, so callers can splice them into a larger parameter list.
    pub fn render(&self, alias: &str, sql: &mut String, params: &mut Vec<Value>) {
        for clause in &self.clauses {
            match clause {
                FilterClause::CreatedAtLeast(ts) => {
                    sql.push_str(&format!(" AND {}.created_at >= ?", alias));
                    params.push(Value::Integer(*ts));
                }
                FilterClause::CreatedBefore(ts) => {
                    sql.push_str(&format!(" AND {}.created_at < ?", alias));
                    params.push(Value::Integer(*ts));
                }
                FilterClause::CityEquals(city) => {
                    sql.push_str(&format!(" AND LOWER({}.city) = LOWER(?)", alias));
                    params.push(Value::Text(city.clone()));
                }
                FilterClause::StarredIs(flag) => {
                    sql.push_str(&format!(" AND {}.starred = ?", alias));
                    params.push(Value::Integer(i64::from(*flag)));
                }
                FilterClause::HasAnyTag(tags) => {
                    let marks = vec!["?"; tags.len()].join(", ");
                    sql.push_str(&format!(
                        " AND EXISTS (SELECT 1 FROM entry_tags et \
                         JOIN tags t ON t.id = et.tag_id \
                         WHERE et.entry_uuid = {}.uuid AND t.name IN ({}))",
                        alias, marks
                    ));
                    params.extend(tags.iter().cloned().map(Value::Text));
                }
            }
        }
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        RetrievalError::InvalidFilter(format!("malformed date '{}', expected YYYY-MM-DD", raw))
    })
}

fn day_start(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &CompiledFilter) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        filter.render("e", &mut sql, &mut params);
        (sql, params)
    }

    #[test]
    fn empty_filter_renders_nothing() {
        let compiled = SearchFilters::default().compile().unwrap();
        let (sql, params) = render(&compiled);
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn malformed_date_is_invalid_filter() {
        let filters = SearchFilters {
            date_from: Some("01/02/2024".to_string()),
            ..Default::default()
        };
        let err = filters.compile().unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidFilter(_)));
    }

    #[test]
    fn date_to_covers_the_whole_end_day() {
        let filters = SearchFilters {
            date_to: Some("2024-03-15".to_string()),
            ..Default::default()
        };
        let compiled = filters.compile().unwrap();
        let (sql, params) = render(&compiled);
        assert!(sql.contains("e.created_at < ?"));
        // Bound is the start of March 16, so 23:59:59 on the 15th passes.
        let expected = NaiveDate::from_ymd_opt(2024, 3, 16)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        assert_eq!(params, vec![Value::Integer(expected)]);
    }

    #[test]
    fn date_from_is_the_start_of_day() {
        let filters = SearchFilters {
            date_from: Some("2024-03-15".to_string()),
            ..Default::default()
        };
        let (sql, params) = render(&filters.compile().unwrap());
        assert!(sql.contains("e.created_at >= ?"));
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        assert_eq!(params, vec![Value::Integer(expected)]);
    }

    #[test]
    fn omitted_starred_adds_no_clause() {
        let some = SearchFilters {
            starred: Some(false),
            ..Default::default()
        };
        let (sql, params) = render(&some.compile().unwrap());
        assert!(sql.contains("e.starred = ?"));
        assert_eq!(params, vec![Value::Integer(0)]);

        let none = SearchFilters::default();
        let (sql, _) = render(&none.compile().unwrap());
        assert!(!sql.contains("starred"));
    }

    #[test]
    fn city_match_is_case_insensitive() {
        let filters = SearchFilters {
            city: Some("Seoul".to_string()),
            ..Default::default()
        };
        let (sql, params) = render(&filters.compile().unwrap());
        assert!(sql.contains("LOWER(e.city) = LOWER(?)"));
        assert_eq!(params, vec![Value::Text("Seoul".to_string())]);
    }

    #[test]
    fn tags_render_as_existence_check() {
        let filters = SearchFilters {
            tags: Some(vec!["travel".to_string(), "food".to_string()]),
            ..Default::default()
        };
        let (sql, params) = render(&filters.compile().unwrap());
        assert!(sql.contains("EXISTS"));
        assert!(sql.contains("IN (?, ?)"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_tag_list_adds_no_clause() {
        let filters = SearchFilters {
            tags: Some(Vec::new()),
            ..Default::default()
        };
        let (sql, params) = render(&filters.compile().unwrap());
        assert!(sql.is_empty());
        assert!(params.is_empty());
        assert!(filters.is_empty());
    }

    #[test]
    fn params_follow_fragment_order() {
        let filters = SearchFilters {
            date_from: Some("2024-01-01".to_string()),
            city: Some("Busan".to_string()),
            starred: Some(true),
            ..Default::default()
        };
        let (_, params) = render(&filters.compile().unwrap());
        assert!(matches!(params[0], Value::Integer(_)));
        assert!(matches!(params[1], Value::Text(_)));
        assert_eq!(params[2], Value::Integer(1));
    }
}
