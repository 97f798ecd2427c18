use crate::value::Value;
use std::cmp::Ordering;

// Integers in this range convert to f64 without loss.
const F64_SAFE_U64: u64 = 1u64 << 53;

///
/// NumericRepr
/// Common representation for cross-family numeric comparison.
///

enum NumericRepr {
    Int(i64),
    Uint(u64),
    Float(f64),
}

fn numeric_repr(value: &Value) -> Option<NumericRepr> {
    match value {
        Value::Int(v) => Some(NumericRepr::Int(*v)),
        Value::Uint(v) => Some(NumericRepr::Uint(*v)),
        Value::Float(v) => Some(NumericRepr::Float(*v)),
        _ => None,
    }
}

fn numeric_cmp(a: &NumericRepr, b: &NumericRepr) -> Ordering {
    use NumericRepr::{Float, Int, Uint};

    match (a, b) {
        (Int(x), Int(y)) => x.cmp(y),
        (Uint(x), Uint(y)) => x.cmp(y),
        (Int(x), Uint(y)) => {
            if *x < 0 {
                Ordering::Less
            } else {
                (*x as u64).cmp(y)
            }
        }
        (Uint(x), Int(y)) => numeric_cmp(&Int(*y), &Uint(*x)).reverse(),
        (Float(x), Float(y)) => x.total_cmp(y),
        (Int(x), Float(y)) => int_float_cmp(*x, *y),
        (Float(x), Int(y)) => int_float_cmp(*y, *x).reverse(),
        (Uint(x), Float(y)) => uint_float_cmp(*x, *y),
        (Float(x), Uint(y)) => uint_float_cmp(*y, *x).reverse(),
    }
}

fn int_float_cmp(i: i64, f: f64) -> Ordering {
    if i.unsigned_abs() < F64_SAFE_U64 {
        (i as f64).total_cmp(&f)
    } else if f.is_nan() {
        Ordering::Less
    } else {
        // outside the safe window, truncation decides
        (i as f64).partial_cmp(&f).unwrap_or(Ordering::Less)
    }
}

fn uint_float_cmp(u: u64, f: f64) -> Ordering {
    if u < F64_SAFE_U64 {
        (u as f64).total_cmp(&f)
    } else if f.is_nan() {
        Ordering::Less
    } else {
        (u as f64).partial_cmp(&f).unwrap_or(Ordering::Less)
    }
}

// Rank buckets for the strict total order; numeric variants share one
// bucket so that Int/Uint/Float interleave numerically.
const fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Uint(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::Id(_) => 4,
        Value::Blob(_) => 5,
        Value::List(_) => 6,
        Value::Map(_) => 7,
    }
}

/// Strict total order over all values, used for sort evaluation.
/// Values of different ranks order by rank; numerics compare
/// cross-family; floats use IEEE total ordering.
#[must_use]
pub fn strict_value_order(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Id(x), Value::Id(y)) => x.cmp(y),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => seq_cmp(x.iter(), y.iter()),
        (Value::Map(x), Value::Map(y)) => map_cmp(x, y),
        _ => match (numeric_repr(a), numeric_repr(b)) {
            (Some(x), Some(y)) => numeric_cmp(&x, &y),
            // unreachable: equal ranks always match one arm above
            _ => Ordering::Equal,
        },
    }
}

fn seq_cmp<'a>(
    a: impl Iterator<Item = &'a Value>,
    b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    let mut a = a;
    let mut b = b;
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match strict_value_order(x, y) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

fn map_cmp(a: &[(String, Value)], b: &[(String, Value)]) -> Ordering {
    let mut ai = a.iter();
    let mut bi = b.iter();
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => match ka.cmp(kb) {
                Ordering::Equal => match strict_value_order(va, vb) {
                    Ordering::Equal => {}
                    other => return other,
                },
                other => return other,
            },
        }
    }
}

/// Equality under the same semantics as `strict_value_order`.
#[must_use]
pub fn compare_eq(a: &Value, b: &Value) -> bool {
    strict_value_order(a, b) == Ordering::Equal
}
