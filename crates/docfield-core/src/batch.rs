//! Batched field extraction
//!
//! Large request lists are processed a few fields at a time so the UI can show
//! results progressively. Required fields always come first.

use serde::{Deserialize, Serialize};

use crate::types::FieldRequest;

/// Position of one batch within a request list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_index: usize,
    pub batch_size: usize,
    pub total_fields: usize,
    pub total_batches: usize,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_batch_index: Option<usize>,
}

/// Stable partition: required requests first, each group in input order
pub fn prioritize(requests: &[FieldRequest]) -> Vec<FieldRequest> {
    let (mut required, optional): (Vec<_>, Vec<_>) =
        requests.iter().cloned().partition(|r| r.required());
    required.extend(optional);
    required
}

/// Select batch `batch_index` of size `batch_size`.
///
/// A zero batch size is treated as one. An index past the end yields an empty
/// slice with `has_more == false`.
pub fn schedule(
    requests: &[FieldRequest],
    batch_size: usize,
    batch_index: usize,
) -> (Vec<FieldRequest>, BatchState) {
    let batch_size = batch_size.max(1);
    let ordered = prioritize(requests);
    let total_fields = ordered.len();
    let total_batches = total_fields.div_ceil(batch_size);

    let start = batch_index.saturating_mul(batch_size).min(total_fields);
    let end = start.saturating_add(batch_size).min(total_fields);
    let has_more = batch_index < total_batches.saturating_sub(1);

    let state = BatchState {
        batch_index,
        batch_size,
        total_fields,
        total_batches,
        has_more,
        next_batch_index: has_more.then(|| batch_index + 1),
    };
    (ordered[start..end].to_vec(), state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn requests(total: usize, required: usize) -> Vec<FieldRequest> {
        // Interleave so the partition actually has to move things
        (0..total)
            .map(|i| {
                let is_required = i % 2 == 1 && i / 2 < required;
                FieldRequest::generic(&format!("field_{}", i), "What?", is_required)
            })
            .collect()
    }

    #[test]
    fn test_first_batch_holds_required_fields() {
        let reqs = requests(12, 5);
        let (batch, state) = schedule(&reqs, 5, 0);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|r| r.required()));
        assert_eq!(
            batch.iter().map(|r| r.key()).collect::<Vec<_>>(),
            vec!["field_1", "field_3", "field_5", "field_7", "field_9"]
        );
        assert_eq!(
            state,
            BatchState {
                batch_index: 0,
                batch_size: 5,
                total_fields: 12,
                total_batches: 3,
                has_more: true,
                next_batch_index: Some(1),
            }
        );
    }

    #[test]
    fn test_last_batch() {
        let reqs = requests(12, 5);
        let (batch, state) = schedule(&reqs, 5, 2);
        assert_eq!(batch.len(), 2);
        assert!(!state.has_more);
        assert_eq!(state.next_batch_index, None);
    }

    #[test]
    fn test_out_of_range_index() {
        let (batch, state) = schedule(&requests(3, 0), 5, 7);
        assert!(batch.is_empty());
        assert!(!state.has_more);
        assert_eq!(state.total_batches, 1);
    }

    #[test]
    fn test_huge_index_is_out_of_range() {
        let (batch, state) = schedule(&requests(3, 0), 5, usize::MAX);
        assert!(batch.is_empty());
        assert!(!state.has_more);
        assert_eq!(state.next_batch_index, None);
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        let (batch, state) = schedule(&requests(3, 0), 0, 0);
        assert_eq!(batch.len(), 1);
        assert_eq!(state.batch_size, 1);
        assert_eq!(state.total_batches, 3);
    }

    #[test]
    fn test_empty_requests() {
        let (batch, state) = schedule(&[], 5, 0);
        assert!(batch.is_empty());
        assert_eq!(state.total_batches, 0);
        assert!(!state.has_more);
    }
}
