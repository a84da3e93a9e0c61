use resource_reconciler::error;
use resource_reconciler::Result;
use snafu::ResultExt;

/// The single object in `found`, or `LookupAmbiguous` naming how many were found.
pub(crate) fn exactly_one<T>(mut found: Vec<T>, resource: &str, tag: &str) -> Result<T> {
    let count = found.len();
    match (count, found.pop()) {
        (1, Some(only)) => Ok(only),
        _ => error::LookupAmbiguousSnafu {
            resource,
            tag,
            found: count,
        }
        .fail(),
    }
}

/// The single object in `found` that is about to be deleted, or `DeleteFailed` with `NotUnique`.
pub(crate) fn exactly_one_to_delete<T>(mut found: Vec<T>, resource: &str) -> Result<T> {
    let count = found.len();
    match (count, found.pop()) {
        (1, Some(only)) => Ok(only),
        _ => error::NotUniqueSnafu { found: count }
            .fail()
            .context(error::DeleteFailedSnafu { resource }),
    }
}
