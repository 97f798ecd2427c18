use crate::{
    instance::Instance,
    value::{Value, compare_eq, strict_value_order},
};
use std::cmp::Ordering;

///
/// Predicate AST
///
/// Pure, schema-agnostic representation of request filters. This layer
/// contains no type validation or planning; schema-aware validation
/// happens in `request::validate`, evaluation happens against loaded
/// rows and the transaction's write overlay.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, PartialEq)]
pub struct ComparePredicate {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

impl ComparePredicate {
    fn new(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
    IsNull { field: String },
}

impl Predicate {
    #[must_use]
    pub const fn and(preds: Vec<Self>) -> Self {
        Self::And(preds)
    }

    #[must_use]
    pub const fn or(preds: Vec<Self>) -> Self {
        Self::Or(preds)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(pred: Self) -> Self {
        Self::Not(Box::new(pred))
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Eq, value))
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Ne, value))
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Lt, value))
    }

    #[must_use]
    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Lte, value))
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Gt, value))
    }

    #[must_use]
    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Gte, value))
    }

    #[must_use]
    pub fn in_(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::In, Value::List(values)))
    }

    #[must_use]
    pub fn contains(field: impl Into<String>, value: Value) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Contains, value))
    }

    #[must_use]
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    /// Evaluate against one row. `id_field` names the identifier so
    /// predicates over it read the instance id rather than an attribute.
    /// Missing attributes evaluate as Null.
    #[must_use]
    pub fn matches(&self, instance: &Instance, id_field: &str) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::And(preds) => preds.iter().all(|p| p.matches(instance, id_field)),
            Self::Or(preds) => preds.iter().any(|p| p.matches(instance, id_field)),
            Self::Not(pred) => !pred.matches(instance, id_field),
            Self::Compare(cmp) => {
                let actual = field_value(instance, &cmp.field, id_field);
                compare(&actual, cmp.op, &cmp.value)
            }
            Self::IsNull { field } => field_value(instance, field, id_field).is_null(),
        }
    }

    /// Every field name the predicate touches, for validation.
    pub(crate) fn fields<'a>(&'a self, out: &mut Vec<(&'a str, Option<CompareOp>)>) {
        match self {
            Self::True | Self::False => {}
            Self::And(preds) | Self::Or(preds) => {
                for pred in preds {
                    pred.fields(out);
                }
            }
            Self::Not(pred) => pred.fields(out),
            Self::Compare(cmp) => out.push((&cmp.field, Some(cmp.op))),
            Self::IsNull { field } => out.push((field, None)),
        }
    }
}

fn field_value(instance: &Instance, field: &str, id_field: &str) -> Value {
    if field == id_field {
        return Value::Id(instance.id);
    }
    instance.attribute(field).cloned().unwrap_or(Value::Null)
}

fn compare(actual: &Value, op: CompareOp, literal: &Value) -> bool {
    match op {
        CompareOp::Eq => compare_eq(actual, literal),
        CompareOp::Ne => !compare_eq(actual, literal),
        CompareOp::Lt => strict_value_order(actual, literal) == Ordering::Less,
        CompareOp::Lte => strict_value_order(actual, literal) != Ordering::Greater,
        CompareOp::Gt => strict_value_order(actual, literal) == Ordering::Greater,
        CompareOp::Gte => strict_value_order(actual, literal) != Ordering::Less,
        CompareOp::In => literal.contains(actual),
        CompareOp::Contains => actual.contains(literal),
    }
}
