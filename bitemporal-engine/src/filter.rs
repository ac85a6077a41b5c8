//! Versioning Filter (§4.F) — pure transformation from a query-time temporal
//! intent into a metadata-filter predicate, `AND`-combined with any
//! user-supplied source filter.

use bitemporal_core::constants::TIMESTAMP_UPPER_BOUND;
use bitemporal_core::models::{FilterCondition, FilterConfig, FilterExpr, FilterOperator, VersioningConfig, VersioningMode};

const VALID_TO_FIELD: &str = "valid_to";
const VALID_FROM_FIELD: &str = "valid_from";

/// Builds the predicate for `config.mode` (§4.F table). `NoVersioning`
/// returns `None` — pass-through, nothing to `AND` in.
fn versioning_predicate(config: &VersioningConfig) -> Option<FilterExpr> {
    let predicate = match config.mode {
        VersioningMode::NoVersioning => return None,
        VersioningMode::Current => {
            FilterExpr::Predicate { key: VALID_TO_FIELD.into(), value: TIMESTAMP_UPPER_BOUND.into(), operator: FilterOperator::Eq }
        }
        VersioningMode::Previous => {
            FilterExpr::Predicate { key: VALID_TO_FIELD.into(), value: TIMESTAMP_UPPER_BOUND.into(), operator: FilterOperator::Lt }
        }
        VersioningMode::AtTimestamp => FilterExpr::Compound {
            condition: FilterCondition::And,
            filters: vec![
                FilterExpr::Predicate { key: VALID_FROM_FIELD.into(), value: config.at_timestamp.into(), operator: FilterOperator::Lte },
                FilterExpr::Predicate { key: VALID_TO_FIELD.into(), value: config.at_timestamp.into(), operator: FilterOperator::Gt },
            ],
        },
        VersioningMode::BeforeTimestamp => {
            FilterExpr::Predicate { key: VALID_TO_FIELD.into(), value: config.at_timestamp.into(), operator: FilterOperator::Lt }
        }
        VersioningMode::OnOrAfterTimestamp => {
            FilterExpr::Predicate { key: VALID_FROM_FIELD.into(), value: config.at_timestamp.into(), operator: FilterOperator::Gte }
        }
    };
    Some(predicate)
}

/// Combines `config`'s versioning predicate with `user_filter`'s source
/// filter via `AND` (§4.F, P5). An absent user filter leaves the versioning
/// predicate standing alone; `NoVersioning` with no user filter yields an
/// empty `FilterConfig`.
pub fn effective_filter(config: &VersioningConfig, user_filter: &FilterConfig) -> FilterConfig {
    let versioning = versioning_predicate(config);
    let combined = match (versioning, user_filter.source_filters.clone()) {
        (Some(v), Some(u)) => Some(FilterExpr::Compound { filters: vec![v, u], condition: FilterCondition::And }),
        (Some(v), None) => Some(v),
        (None, Some(u)) => Some(u),
        (None, None) => None,
    };
    FilterConfig { source_filters: combined }
}

#[cfg(test)]
mod tests {
    use bitemporal_core::models::FilterValue;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn no_versioning_with_no_user_filter_is_empty() {
        let effective = effective_filter(&VersioningConfig::no_versioning(), &FilterConfig::empty());
        assert_eq!(effective.source_filters, None);
    }

    #[test]
    fn current_with_no_user_filter_stands_alone() {
        let effective = effective_filter(&VersioningConfig::current(), &FilterConfig::empty());
        assert_eq!(
            effective.source_filters,
            Some(FilterExpr::Predicate {
                key: "valid_to".into(),
                value: TIMESTAMP_UPPER_BOUND.into(),
                operator: FilterOperator::Eq
            })
        );
    }

    #[test]
    fn filter_composition_with_a_user_filter() {
        let user = FilterConfig::new(FilterExpr::Predicate {
            key: "category".into(),
            value: FilterValue::from("x"),
            operator: FilterOperator::Eq,
        });
        let effective = effective_filter(&VersioningConfig::current(), &user);

        assert_eq!(
            effective.source_filters,
            Some(FilterExpr::Compound {
                condition: FilterCondition::And,
                filters: vec![
                    FilterExpr::Predicate { key: "valid_to".into(), value: TIMESTAMP_UPPER_BOUND.into(), operator: FilterOperator::Eq },
                    FilterExpr::Predicate { key: "category".into(), value: FilterValue::from("x"), operator: FilterOperator::Eq },
                ],
            })
        );
    }

    #[rstest]
    #[case(VersioningMode::Previous, FilterOperator::Lt)]
    #[case(VersioningMode::BeforeTimestamp, FilterOperator::Lt)]
    fn single_field_predicates(#[case] mode: VersioningMode, #[case] expected_operator: FilterOperator) {
        let config = VersioningConfig::new(Some(mode), Some(500)).unwrap();
        let predicate = versioning_predicate(&config).unwrap();
        let FilterExpr::Predicate { operator, .. } = predicate else { panic!("expected a single predicate") };
        assert_eq!(operator, expected_operator);
    }

    #[test]
    fn at_timestamp_is_a_closed_interval_check() {
        let config = VersioningConfig::new(Some(VersioningMode::AtTimestamp), Some(150)).unwrap();
        let predicate = versioning_predicate(&config).unwrap();
        assert_eq!(
            predicate,
            FilterExpr::Compound {
                condition: FilterCondition::And,
                filters: vec![
                    FilterExpr::Predicate { key: "valid_from".into(), value: 150.into(), operator: FilterOperator::Lte },
                    FilterExpr::Predicate { key: "valid_to".into(), value: 150.into(), operator: FilterOperator::Gt },
                ],
            }
        );
    }
}
