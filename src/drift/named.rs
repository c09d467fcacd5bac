use super::Summary;
use crate::schema::Named;
use crate::schema::normalize::Normalize;
use std::collections::{BTreeMap, BTreeSet};

/// Pair entries of two collections by name.
///
/// `primary` is invoked for every name present in `expected` whose normalized
/// value is missing from or different in `actual` (with `None` when missing).
/// Entries present only in `actual` are ignored.
pub fn compare_named_lists<T>(
    actual: &[T],
    expected: &[T],
    primary: impl Fn(Option<&T>, &T) -> Vec<Summary>,
) -> Vec<Summary>
where
    T: Named + Normalize + PartialEq,
{
    compare_named_lists_strict(actual, expected, primary, |_| Vec::new())
}

/// Like [`compare_named_lists`], but entries present only in `actual` are
/// collected and passed to `additional` once, after all other findings.
pub fn compare_named_lists_strict<T>(
    actual: &[T],
    expected: &[T],
    primary: impl Fn(Option<&T>, &T) -> Vec<Summary>,
    additional: impl Fn(&[&T]) -> Vec<Summary>,
) -> Vec<Summary>
where
    T: Named + Normalize + PartialEq,
{
    let actual_map: BTreeMap<&str, &T> = actual.iter().map(|a| (a.name(), a)).collect();
    let expected_map: BTreeMap<&str, &T> = expected.iter().map(|e| (e.name(), e)).collect();
    let all_names: BTreeSet<&str> = actual_map.keys().chain(expected_map.keys()).copied().collect();

    let mut summaries = Vec::new();
    let mut extras = Vec::new();

    for name in all_names {
        match (actual_map.get(name), expected_map.get(name)) {
            (Some(a), Some(e)) => {
                if a.normalize() != e.normalize() {
                    summaries.extend(primary(Some(*a), *e));
                }
            }
            (None, Some(e)) => summaries.extend(primary(None, *e)),
            (Some(a), None) => extras.push(*a),
            (None, None) => {}
        }
    }

    if !extras.is_empty() {
        summaries.extend(additional(&extras));
    }

    summaries
}
