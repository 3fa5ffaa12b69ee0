//! Declarative filter evaluator (component E).

use crate::model::{Event, FieldValue, ResolvedMetadata};
use crate::rules::{FilterCondition, FilterOperator, FilterRule, FilterValue};

/// Decide whether `event`/`resolved` should be suppressed: always true for
/// the agent's own pid, otherwise false when system filtering is disabled,
/// otherwise true iff any configured rule matches.
pub fn should_suppress(
    event: &Event,
    resolved: &ResolvedMetadata,
    self_pid: i32,
    filter_system_events: bool,
    rules: &[FilterRule],
) -> bool {
    if event.pid == self_pid {
        return true;
    }
    if !filter_system_events {
        return false;
    }
    rules.iter().any(|rule| rule_matches(rule, event, resolved))
}

fn rule_matches(rule: &FilterRule, event: &Event, resolved: &ResolvedMetadata) -> bool {
    rule.conditions.iter().all(|cond| condition_matches(cond, event, resolved))
}

/// Resolve a condition's field name to the event/metadata value it refers
/// to.
fn resolve_field(name: &str, event: &Event, resolved: &ResolvedMetadata) -> Option<FieldValue> {
    match name {
        "type" => Some(FieldValue::Str(resolved.type_tag().to_string())),
        "pid" => Some(FieldValue::Int(event.pid as i64)),
        "comm" => Some(FieldValue::Str(event.comm.clone())),
        "filepath" => Some(FieldValue::Str(event.path.clone())),
        "cgroup_paths" => Some(FieldValue::List(resolved.cgroup_paths().to_vec())),
        other => resolved.field(other),
    }
}

fn condition_matches(cond: &FilterCondition, event: &Event, resolved: &ResolvedMetadata) -> bool {
    let Some(value) = resolve_field(&cond.field, event, resolved) else {
        // Missing field: fails every positive operator, passes not_* vacuously.
        return matches!(
            cond.operator,
            FilterOperator::NotEquals
                | FilterOperator::NotPrefix
                | FilterOperator::NotSuffix
                | FilterOperator::NotContains
                | FilterOperator::NotIn
        );
    };

    match cond.operator {
        FilterOperator::Equals => op_equals(&value, &cond.value),
        FilterOperator::NotEquals => !op_equals(&value, &cond.value),
        FilterOperator::Prefix => op_match_any(&value, &cond.value, str::starts_with),
        FilterOperator::NotPrefix => !op_match_any(&value, &cond.value, str::starts_with),
        FilterOperator::Suffix => op_match_any(&value, &cond.value, str::ends_with),
        FilterOperator::NotSuffix => !op_match_any(&value, &cond.value, str::ends_with),
        FilterOperator::Contains => op_match_any(&value, &cond.value, str::contains),
        FilterOperator::NotContains => !op_match_any(&value, &cond.value, str::contains),
        FilterOperator::In => op_in(&value, &cond.value),
        FilterOperator::NotIn => !op_in(&value, &cond.value),
    }
}

fn value_as_list(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::Str(s) => vec![s.clone()],
        FieldValue::List(items) => items.clone(),
        FieldValue::Int(n) => vec![n.to_string()],
    }
}

fn op_equals(value: &FieldValue, literal: &FilterValue) -> bool {
    match value {
        FieldValue::List(items) => match literal {
            FilterValue::Str(s) => items.contains(s),
            _ => false,
        },
        FieldValue::Int(n) => literal.as_truncated_int().map(|lit| *n == lit).unwrap_or(false),
        FieldValue::Str(s) => match literal {
            FilterValue::Str(lit) => s == lit,
            _ => false,
        },
    }
}

/// Shared implementation for prefix/suffix/contains: passes iff any
/// literal (string or sequence-of-strings) matches the value, or any
/// element of a sequence value.
fn op_match_any(value: &FieldValue, literal: &FilterValue, matcher: impl Fn(&str, &str) -> bool) -> bool {
    let literals = literal.as_str_list();
    if literals.is_empty() {
        return false;
    }
    value_as_list(value)
        .iter()
        .any(|item| literals.iter().any(|lit| matcher(item.as_str(), lit.as_str())))
}

fn op_in(value: &FieldValue, literal: &FilterValue) -> bool {
    let literals = literal.as_str_list();
    if literals.is_empty() {
        return false;
    }
    value_as_list(value).iter().any(|item| literals.contains(item))
}
