use crate::event::{parse_numeric, Event, Row, Value};
use crate::query::{AggFunc, CmpOp, Expr, Literal, Query, SortDir};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Executor output: events when the query has no grouping, synthesized
/// row maps when it groups or aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Events(Vec<Event>),
    Rows(Vec<Row>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Events(events) => events.len(),
            QueryOutput::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a compiled query over a batch: filter, group/aggregate, sort,
/// limit. Pure function of its inputs; the batch order it receives is
/// the order ties keep.
pub fn execute(query: &Query, events: Vec<Event>) -> QueryOutput {
    let filtered: Vec<Event> = match &query.where_ {
        Some(expr) => events.into_iter().filter(|e| evaluate(expr, e)).collect(),
        None => events,
    };

    let mut output = if query.is_grouped() {
        QueryOutput::Rows(group_and_aggregate(query, &filtered))
    } else {
        QueryOutput::Events(filtered)
    };

    if let Some(sort) = &query.sort {
        let flip = |ord: Ordering| match sort.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        };
        match &mut output {
            QueryOutput::Events(events) => {
                events.sort_by(|a, b| flip(compare_values(a.field(&sort.field), b.field(&sort.field))));
            }
            QueryOutput::Rows(rows) => {
                rows.sort_by(|a, b| flip(compare_values(a.get(&sort.field), b.get(&sort.field))));
            }
        }
    }

    if let Some(limit) = query.limit {
        match &mut output {
            QueryOutput::Events(events) => events.truncate(limit),
            QueryOutput::Rows(rows) => rows.truncate(limit),
        }
    }
    output
}

/// Truth of a filter expression against one event. A missing field makes
/// every comparison false, `!=` included: missing is unknown, not
/// unequal. `not` then negates that truth value, so `not status == 200`
/// selects missing-status events.
pub fn evaluate(expr: &Expr, event: &Event) -> bool {
    match expr {
        Expr::Compare { field, op, value } => match event.field(field) {
            Some(actual) => compare_literal(actual, *op, value),
            None => false,
        },
        Expr::In { field, values } => match event.field(field) {
            Some(actual) => values
                .iter()
                .any(|v| compare_literal(actual, CmpOp::Eq, v)),
            None => false,
        },
        Expr::Has { field } => event.fields.contains_key(field),
        Expr::Match { field, pattern } => match event.field(field) {
            Some(actual) => Regex::new(pattern)
                .map(|re| re.is_match(&actual.render()))
                .unwrap_or(false),
            None => false,
        },
        Expr::Not(inner) => !evaluate(inner, event),
        Expr::And(left, right) => evaluate(left, event) && evaluate(right, event),
        Expr::Or(left, right) => evaluate(left, event) || evaluate(right, event),
    }
}

/// Compare a field value with a literal: numeric when both sides parse
/// as finite numbers, byte-wise/lexicographic strings otherwise.
fn compare_literal(actual: &Value, op: CmpOp, literal: &Literal) -> bool {
    let ord = match (actual.as_numeric(), literal.as_numeric()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.render().cmp(&literal.render()),
    };
    match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    }
}

/// Ordering used by `sort` and by `min`/`max`: numeric when both render
/// as numbers, lexicographic otherwise. Missing and null both order as
/// the empty string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let ra = a.map(Value::render).unwrap_or_default();
    let rb = b.map(Value::render).unwrap_or_default();
    match (parse_numeric(&ra), parse_numeric(&rb)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => ra.cmp(&rb),
    }
}

enum AggState {
    Count,
    Sum(f64),
    Avg(f64),
    Min(Option<Value>),
    Max(Option<Value>),
}

struct GroupAcc {
    /// Group-field values from the first event of the group, which
    /// breaks representation ties ("200" vs 200 keyed identically).
    key_values: Vec<(String, Value)>,
    count: usize,
    states: Vec<AggState>,
}

fn group_and_aggregate(query: &Query, events: &[Event]) -> Vec<Row> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, GroupAcc> = HashMap::new();

    for event in events {
        let key_values: Vec<(String, Value)> = query
            .group
            .iter()
            .map(|f| {
                (
                    f.clone(),
                    event.field(f).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        // Missing values key as the empty string, byte-wise.
        let key = key_values
            .iter()
            .map(|(_, v)| v.render())
            .collect::<Vec<_>>()
            .join("\u{1f}");

        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            GroupAcc {
                key_values,
                count: 0,
                states: query
                    .aggs
                    .iter()
                    .map(|agg| match agg.func {
                        AggFunc::Count => AggState::Count,
                        AggFunc::Sum => AggState::Sum(0.0),
                        AggFunc::Avg => AggState::Avg(0.0),
                        AggFunc::Min => AggState::Min(None),
                        AggFunc::Max => AggState::Max(None),
                    })
                    .collect(),
            }
        });
        acc.count += 1;

        for (agg, state) in query.aggs.iter().zip(acc.states.iter_mut()) {
            let value = agg.field.as_deref().and_then(|f| event.field(f));
            match state {
                AggState::Count => {}
                // Missing contributes zero to the sum.
                AggState::Sum(total) | AggState::Avg(total) => {
                    *total += value.and_then(Value::as_numeric).unwrap_or(0.0);
                }
                AggState::Min(best) => {
                    if let Some(value) = value.filter(|v| !v.is_null()) {
                        let replace = best
                            .as_ref()
                            .map(|b| compare_values(Some(value), Some(b)) == Ordering::Less)
                            .unwrap_or(true);
                        if replace {
                            *best = Some(value.clone());
                        }
                    }
                }
                AggState::Max(best) => {
                    if let Some(value) = value.filter(|v| !v.is_null()) {
                        let replace = best
                            .as_ref()
                            .map(|b| compare_values(Some(value), Some(b)) == Ordering::Greater)
                            .unwrap_or(true);
                        if replace {
                            *best = Some(value.clone());
                        }
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|acc| {
            let mut row = Row::new();
            for (field, value) in acc.key_values {
                row.insert(field, value);
            }
            for (agg, state) in query.aggs.iter().zip(acc.states) {
                let value = match state {
                    AggState::Count => Value::Int(acc.count as i64),
                    AggState::Sum(total) => number_value(total),
                    // Divisor is the full group size, missing values included.
                    AggState::Avg(total) => number_value(total / acc.count as f64),
                    AggState::Min(best) | AggState::Max(best) => best.unwrap_or(Value::Null),
                };
                row.insert(agg.key(), value);
            }
            row
        })
        .collect()
}

/// Computed numbers collapse to Int when integral so they render and
/// re-compare cleanly.
pub(crate) fn number_value(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9e18 {
        Value::Int(x as i64)
    } else {
        Value::Float(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use quickcheck_macros::quickcheck;

    fn event(fields: &[(&str, Value)]) -> Event {
        let mut e = Event::new("test");
        for (name, value) in fields {
            e.fields.insert(name.to_string(), value.clone());
        }
        e
    }

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    fn run(query: &str, events: Vec<Event>) -> QueryOutput {
        execute(&parse_query(query).unwrap(), events)
    }

    fn rows(output: QueryOutput) -> Vec<Row> {
        match output {
            QueryOutput::Rows(rows) => rows,
            other => panic!("expected rows, got {:?}", other),
        }
    }

    fn events_out(output: QueryOutput) -> Vec<Event> {
        match output {
            QueryOutput::Events(events) => events,
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_and_conjunction() {
        // status >= 500 and method == "GET" keeps exactly one event.
        let batch = vec![
            event(&[("status", int(500)), ("method", s("GET"))]),
            event(&[("status", int(500)), ("method", s("POST"))]),
            event(&[("status", int(200)), ("method", s("GET"))]),
        ];
        let out = events_out(run(r#"status >= 500 and method == "GET""#, batch));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("status"), Some(&int(500)));
        assert_eq!(out[0].field("method"), Some(&s("GET")));
    }

    #[test]
    fn test_group_by_count() {
        // Five events, two distinct ips.
        let ips = ["1.1.1.1", "1.1.1.1", "2.2.2.2", "1.1.1.1", "2.2.2.2"];
        let batch: Vec<Event> = ips
            .iter()
            .map(|ip| event(&[("ip", s(ip)), ("status", int(400))]))
            .collect();
        let mut out = rows(run("status >= 400 group by ip count", batch));
        out.sort_by_key(|r| r.get("ip").map(Value::render));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("ip"), Some(&s("1.1.1.1")));
        assert_eq!(out[0].get("count"), Some(&int(3)));
        assert_eq!(out[1].get("ip"), Some(&s("2.2.2.2")));
        assert_eq!(out[1].get("count"), Some(&int(2)));
    }

    #[test]
    fn test_aggregate_avg() {
        // Avg over 50, 200, 500 is 250.
        let batch: Vec<Event> = [50, 200, 500]
            .iter()
            .map(|l| event(&[("ip", s("1.1.1.1")), ("latency", int(*l))]))
            .collect();
        let out = rows(run(r#"ip == "1.1.1.1" group by ip avg latency"#, batch));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("ip"), Some(&s("1.1.1.1")));
        assert_eq!(out[0].get("avg_latency"), Some(&int(250)));
    }

    #[test]
    fn test_in_expression_numeric_coercion() {
        // String statuses match integer in-list members.
        let batch = vec![
            event(&[("status", s("500"))]),
            event(&[("status", s("502"))]),
            event(&[("status", s("200"))]),
        ];
        let out = events_out(run("status in {500, 502}", batch));
        let statuses: Vec<String> = out
            .iter()
            .map(|e| e.field("status").unwrap().render())
            .collect();
        assert_eq!(statuses, vec!["500", "502"]);
    }

    #[test]
    fn test_numeric_string_coercion_symmetry() {
        let batch = vec![event(&[("status", s("200"))])];
        assert_eq!(run("status == 200", batch.clone()).len(), 1);
        assert_eq!(run(r#"status == "200""#, batch).len(), 1);
    }

    #[test]
    fn test_missing_field_is_false_for_all_operators() {
        let batch = vec![event(&[("other", int(1))])];
        for query in [
            "status == 200",
            "status != 200",
            "status < 200",
            "status >= 200",
            "status in {200}",
            r#"status matches "2..""#,
        ] {
            assert_eq!(run(query, batch.clone()).len(), 0, "query: {}", query);
        }
    }

    #[test]
    fn test_not_of_missing_is_true() {
        let batch = vec![event(&[("other", int(1))])];
        assert_eq!(run("not status == 200", batch).len(), 1);
    }

    #[test]
    fn test_has_and_matches() {
        let batch = vec![
            event(&[("client_ip", s("10.0.0.1")), ("path", s("/api/v1"))]),
            event(&[("path", s("/static/a.css"))]),
        ];
        assert_eq!(run("has(client_ip)", batch.clone()).len(), 1);
        assert_eq!(run(r#"path matches "^/api""#, batch.clone()).len(), 1);
        // A pattern that fails to compile makes the match false, not an error.
        assert_eq!(run(r#"path matches "[broken""#, batch).len(), 0);
    }

    #[test]
    fn test_string_ordering_mode() {
        let batch = vec![event(&[("method", s("GET"))])];
        // Lexicographic: "GET" < "POST"
        assert_eq!(run(r#"method < "POST""#, batch.clone()).len(), 1);
        assert_eq!(run(r#"method > "POST""#, batch).len(), 0);
    }

    #[test]
    fn test_identity_query_preserves_batch() {
        let batch = vec![
            event(&[("a", int(2))]),
            event(&[("a", int(1))]),
            event(&[("a", int(3))]),
        ];
        let out = events_out(execute(&Query::default(), batch.clone()));
        assert_eq!(out, batch);
    }

    #[test]
    fn test_group_key_missing_values_collapse() {
        let batch = vec![
            event(&[("ip", s("1.1.1.1"))]),
            event(&[("other", int(1))]),
            event(&[("ip", s(""))]),
        ];
        let out = rows(run("group by ip count", batch));
        // Missing keys as "" and so shares a group with the empty string.
        assert_eq!(out.len(), 2);
        let empty_group = out
            .iter()
            .find(|r| r.get("ip").map(Value::render).unwrap_or_default().is_empty())
            .unwrap();
        assert_eq!(empty_group.get("count"), Some(&int(2)));
    }

    #[test]
    fn test_sum_treats_missing_as_zero_avg_divides_by_group_size() {
        let batch = vec![
            event(&[("ip", s("a")), ("latency", int(100))]),
            event(&[("ip", s("a"))]),
        ];
        let out = rows(run("group by ip sum latency avg latency", batch));
        assert_eq!(out[0].get("sum_latency"), Some(&int(100)));
        assert_eq!(out[0].get("avg_latency"), Some(&int(50)));
    }

    #[test]
    fn test_min_max_skip_missing_and_null_for_empty() {
        let batch = vec![
            event(&[("ip", s("a")), ("latency", int(200))]),
            event(&[("ip", s("a")), ("latency", int(50))]),
            event(&[("ip", s("a"))]),
            event(&[("ip", s("b"))]),
        ];
        let out = rows(run("group by ip min latency max latency", batch));
        let a = out.iter().find(|r| r.get("ip") == Some(&s("a"))).unwrap();
        assert_eq!(a.get("min_latency"), Some(&int(50)));
        assert_eq!(a.get("max_latency"), Some(&int(200)));
        let b = out.iter().find(|r| r.get("ip") == Some(&s("b"))).unwrap();
        assert_eq!(b.get("min_latency"), Some(&Value::Null));
        assert_eq!(b.get("max_latency"), Some(&Value::Null));
    }

    #[test]
    fn test_aggregate_without_group_is_one_synthetic_group() {
        let batch = vec![
            event(&[("latency", int(10))]),
            event(&[("latency", int(30))]),
        ];
        let out = rows(run("count avg latency", batch));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("count"), Some(&int(2)));
        assert_eq!(out[0].get("avg_latency"), Some(&int(20)));
    }

    #[test]
    fn test_sort_numeric_and_direction() {
        let batch = vec![
            event(&[("status", int(404))]),
            event(&[("status", s("99"))]),
            event(&[("status", int(500))]),
        ];
        let asc = events_out(run("sort by status", batch.clone()));
        let order: Vec<String> = asc
            .iter()
            .map(|e| e.field("status").unwrap().render())
            .collect();
        // Numeric mode: 99 before 404 despite lexicographic order.
        assert_eq!(order, vec!["99", "404", "500"]);

        let desc = events_out(run("sort by status desc", batch));
        let order: Vec<String> = desc
            .iter()
            .map(|e| e.field("status").unwrap().render())
            .collect();
        assert_eq!(order, vec!["500", "404", "99"]);
    }

    #[test]
    fn test_sort_stability_on_ties() {
        let batch = vec![
            event(&[("k", int(1)), ("tag", s("first"))]),
            event(&[("k", int(1)), ("tag", s("second"))]),
            event(&[("k", int(0)), ("tag", s("zero"))]),
            event(&[("k", int(1)), ("tag", s("third"))]),
        ];
        let out = events_out(run("sort by k", batch));
        let tags: Vec<String> = out
            .iter()
            .map(|e| e.field("tag").unwrap().render())
            .collect();
        assert_eq!(tags, vec!["zero", "first", "second", "third"]);
    }

    #[test]
    fn test_sort_missing_sorts_as_empty() {
        let batch = vec![
            event(&[("name", s("beta"))]),
            event(&[("other", int(1))]),
        ];
        let out = events_out(run("sort by name", batch));
        assert!(out[0].field("name").is_none());
        assert_eq!(out[1].field("name"), Some(&s("beta")));
    }

    #[test]
    fn test_multi_field_group_key() {
        let batch = vec![
            event(&[("ip", s("a")), ("method", s("GET"))]),
            event(&[("ip", s("a")), ("method", s("POST"))]),
            event(&[("ip", s("a")), ("method", s("GET"))]),
        ];
        let out = rows(run("group by ip, method count", batch));
        assert_eq!(out.len(), 2);
        let get_group = out
            .iter()
            .find(|r| r.get("method") == Some(&s("GET")))
            .unwrap();
        assert_eq!(get_group.get("count"), Some(&int(2)));
        assert_eq!(get_group.get("ip"), Some(&s("a")));
    }

    #[test]
    fn test_float_comparisons() {
        let batch = vec![
            event(&[("ratio", Value::Float(0.25))]),
            event(&[("ratio", s("0.75"))]),
        ];
        assert_eq!(run("ratio < 0.5", batch.clone()).len(), 1);
        assert_eq!(run("ratio >= 0.5", batch).len(), 1);
    }

    #[test]
    fn test_ne_on_present_values() {
        let batch = vec![
            event(&[("method", s("GET"))]),
            event(&[("method", s("POST"))]),
        ];
        let out = events_out(run(r#"method != "GET""#, batch));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("method"), Some(&s("POST")));
    }

    #[test]
    fn test_short_circuit_connectives() {
        // Connectives short-circuit left to right.
        let batch = vec![event(&[("a", int(1))])];
        assert_eq!(run(r#"a == 1 or b matches "[bad""#, batch.clone()).len(), 1);
        assert_eq!(run(r#"a == 2 and b matches "[bad""#, batch).len(), 0);
    }

    #[test]
    fn test_limit() {
        let batch: Vec<Event> = (0..5).map(|n| event(&[("n", int(n))])).collect();
        assert_eq!(run("limit 2", batch.clone()).len(), 2);
        assert_eq!(run("limit 0", batch.clone()).len(), 0);
        assert_eq!(run("group by n count limit 3", batch).len(), 3);
    }

    #[test]
    fn test_grouped_rows_after_sort_limit() {
        let batch = vec![
            event(&[("ip", s("a"))]),
            event(&[("ip", s("b"))]),
            event(&[("ip", s("a"))]),
            event(&[("ip", s("c"))]),
            event(&[("ip", s("a"))]),
            event(&[("ip", s("b"))]),
        ];
        let out = rows(run("group by ip count sort by count desc limit 2", batch));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("ip"), Some(&s("a")));
        assert_eq!(out[0].get("count"), Some(&int(3)));
        assert_eq!(out[1].get("ip"), Some(&s("b")));
        assert_eq!(out[1].get("count"), Some(&int(2)));
    }

    #[quickcheck]
    fn prop_execute_is_deterministic(statuses: Vec<u16>) -> bool {
        let batch: Vec<Event> = statuses
            .iter()
            .map(|&st| event(&[("status", int(st as i64)), ("bucket", int((st % 7) as i64))]))
            .collect();
        let query = parse_query("status >= 300 group by bucket count sort by count desc").unwrap();
        execute(&query, batch.clone()) == execute(&query, batch)
    }

    #[quickcheck]
    fn prop_empty_query_is_identity(values: Vec<i64>) -> bool {
        let batch: Vec<Event> = values.iter().map(|&n| event(&[("n", int(n))])).collect();
        execute(&Query::default(), batch.clone()) == QueryOutput::Events(batch)
    }

    #[quickcheck]
    fn prop_filter_preserves_relative_order(values: Vec<i64>) -> bool {
        let batch: Vec<Event> = values.iter().map(|&n| event(&[("n", int(n))])).collect();
        let query = parse_query("n >= 0").unwrap();
        let out = match execute(&query, batch) {
            QueryOutput::Events(events) => events,
            _ => return false,
        };
        let kept: Vec<i64> = out
            .iter()
            .filter_map(|e| match e.field("n") {
                Some(Value::Int(n)) => Some(*n),
                _ => None,
            })
            .collect();
        let expected: Vec<i64> = values.iter().copied().filter(|&n| n >= 0).collect();
        kept == expected
    }
}
