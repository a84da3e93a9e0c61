/*!

Structural comparison of an actual and an expected [`Snapshot`]. This is the only place that
decides whether a remote mutation is needed.

!*/

use crate::error::{self, Result};
use crate::resource::Snapshot;
use log::debug;
use serde_json::{Map, Value};
use snafu::{ensure, ResultExt};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// One field whose actual value differs from its expected value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub actual: Value,
    pub expected: Value,
}

impl Display for FieldDiff {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}': actual {} expected {}",
            self.field, self.actual, self.expected
        )
    }
}

/// Returns `true` when every comparable field of `actual` equals the same field of `expected`.
pub fn is_equal<S>(actual: &S, expected: &S) -> Result<bool>
where
    S: Snapshot,
{
    let diffs = diff(actual, expected)?;
    if !diffs.is_empty() {
        debug!(
            "{} '{}' differs on {}",
            expected.kind(),
            expected.name(),
            diffs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(diffs.is_empty())
}

/// Every comparable field that differs between `actual` and `expected`, ordered by field name.
/// Fields listed in [`Snapshot::generated_fields`] are skipped when the expected value is unset.
pub fn diff<S>(actual: &S, expected: &S) -> Result<Vec<FieldDiff>>
where
    S: Snapshot,
{
    ensure!(
        actual.kind() == expected.kind(),
        error::ComparisonFailedSnafu {
            resource: expected.name(),
            actual: actual.kind(),
            expected: expected.kind(),
        }
    );
    let actual_fields = fields(actual)?;
    let expected_fields = fields(expected)?;
    let generated = expected.generated_fields();

    let keys: BTreeSet<&String> = actual_fields.keys().chain(expected_fields.keys()).collect();
    let mut diffs = Vec::new();
    for key in keys {
        let actual_value = actual_fields.get(key).unwrap_or(&Value::Null);
        let expected_value = expected_fields.get(key).unwrap_or(&Value::Null);
        if generated.contains(&key.as_str()) && is_unset(expected_value) {
            continue;
        }
        if actual_value != expected_value {
            diffs.push(FieldDiff {
                field: key.clone(),
                actual: actual_value.clone(),
                expected: expected_value.clone(),
            });
        }
    }
    Ok(diffs)
}

fn fields<S>(snapshot: &S) -> Result<Map<String, Value>>
where
    S: Snapshot,
{
    let value = serde_json::to_value(snapshot).context(error::SnapshotEncodingSnafu {
        resource: snapshot.name(),
        kind: snapshot.kind(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => error::ComparisonFailedSnafu {
            resource: snapshot.name(),
            actual: format!("non-object value {}", other),
            expected: "object",
        }
        .fail(),
    }
}

/// The zero value of a field: what an expected snapshot holds when the specification does not
/// know the value yet.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
