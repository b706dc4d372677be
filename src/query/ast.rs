use crate::event::parse_numeric;
use std::fmt;

/// Literal values a query can mention.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// Numeric view under the same shape rule fields use; comparisons go
    /// numeric only when both sides qualify.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Literal::Int(n) => Some(*n as f64),
            Literal::Float(x) if x.is_finite() => Some(*x),
            Literal::Float(_) => None,
            Literal::Str(s) => parse_numeric(s),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Literal::Int(n) => n.to_string(),
            Literal::Float(x) => x.to_string(),
            Literal::Str(s) => s.clone(),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Filter expression tree. One variant per grammar production, so the
/// evaluator can match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
    },
    Has {
        field: String,
    },
    Match {
        field: String,
        pattern: String,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        }
    }
}

/// One aggregate clause; `count` carries no field, the rest require one.
#[derive(Debug, Clone, PartialEq)]
pub struct Agg {
    pub func: AggFunc,
    pub field: Option<String>,
}

impl Agg {
    /// Row key this aggregate writes: `count` or `<func>_<field>`.
    pub fn key(&self) -> String {
        match (&self.func, &self.field) {
            (AggFunc::Count, _) => "count".to_string(),
            (func, Some(field)) => format!("{}_{}", func.name(), field),
            (func, None) => func.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub dir: SortDir,
}

/// Compiled query: filter, group-by fields, aggregates, sort, limit.
/// Built once per query string, then read-only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub where_: Option<Expr>,
    pub group: Vec<String>,
    pub aggs: Vec<Agg>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl Query {
    /// Grouped execution produces row maps instead of events.
    pub fn is_grouped(&self) -> bool {
        !self.group.is_empty() || !self.aggs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_keys() {
        let count = Agg { func: AggFunc::Count, field: None };
        assert_eq!(count.key(), "count");
        let avg = Agg { func: AggFunc::Avg, field: Some("latency".into()) };
        assert_eq!(avg.key(), "avg_latency");
    }

    #[test]
    fn test_literal_numeric_views() {
        assert_eq!(Literal::Int(200).as_numeric(), Some(200.0));
        assert_eq!(Literal::Str("200".into()).as_numeric(), Some(200.0));
        assert_eq!(Literal::Str("GET".into()).as_numeric(), None);
        assert_eq!(Literal::Float(2.5).as_numeric(), Some(2.5));
    }

    #[test]
    fn test_grouped_detection() {
        assert!(!Query::default().is_grouped());
        let by_group = Query { group: vec!["ip".into()], ..Default::default() };
        assert!(by_group.is_grouped());
        let by_agg = Query {
            aggs: vec![Agg { func: AggFunc::Count, field: None }],
            ..Default::default()
        };
        assert!(by_agg.is_grouped());
    }
}
