//! Reciprocal Rank Fusion of vector and keyword results.
//!
//! ```text
//! combined(id) = w_v / (rrf_k + vector_rank(id)) + w_k / (rrf_k + keyword_rank(id))
//! ```
//!
//! Ranks are 1-based. A record missing from one list contributes nothing
//! for that term, so single-method hits still surface (full outer join).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::keyword::KeywordHit;
use crate::types::MemoryId;
use crate::vector::VectorHit;

use super::SearchResult;

/// Fusion constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub rrf_k: f64,
    pub weight_vector: f64,
    pub weight_keyword: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            rrf_k: super::query::DEFAULT_RRF_K,
            weight_vector: super::query::DEFAULT_WEIGHT,
            weight_keyword: super::query::DEFAULT_WEIGHT,
        }
    }
}

/// A record's position in each list and its fused score.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub record_id: MemoryId,
    pub vector_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub vector_distance: Option<f32>,
    pub keyword_score: Option<f64>,
    pub combined_score: f64,
}

/// One method's RRF term; a missing rank contributes zero.
pub fn rrf_term(weight: f64, rrf_k: f64, rank: Option<usize>) -> f64 {
    match rank {
        Some(rank) => weight / (rrf_k + rank as f64),
        None => 0.0,
    }
}

/// Fuse two ranked lists. Inputs must already be best-first.
///
/// Output is in first-seen order (vector list, then keyword-only ids);
/// final ordering happens after hydration with [`compare_results`].
pub fn fuse(vector: &[VectorHit], keyword: &[KeywordHit], params: FusionParams) -> Vec<FusedCandidate> {
    let mut candidates: Vec<FusedCandidate> = Vec::with_capacity(vector.len() + keyword.len());
    let mut index: HashMap<MemoryId, usize> = HashMap::with_capacity(vector.len() + keyword.len());

    for (i, hit) in vector.iter().enumerate() {
        // A record appears at most once per list; keep its best rank.
        if index.contains_key(&hit.record_id) {
            continue;
        }
        index.insert(hit.record_id, candidates.len());
        candidates.push(FusedCandidate {
            record_id: hit.record_id,
            vector_rank: Some(i + 1),
            keyword_rank: None,
            vector_distance: Some(hit.distance),
            keyword_score: None,
            combined_score: 0.0,
        });
    }

    for (i, hit) in keyword.iter().enumerate() {
        match index.get(&hit.record_id) {
            Some(&pos) => {
                let candidate = &mut candidates[pos];
                if candidate.keyword_rank.is_none() {
                    candidate.keyword_rank = Some(i + 1);
                    candidate.keyword_score = Some(hit.score);
                }
            }
            None => {
                index.insert(hit.record_id, candidates.len());
                candidates.push(FusedCandidate {
                    record_id: hit.record_id,
                    vector_rank: None,
                    keyword_rank: Some(i + 1),
                    vector_distance: None,
                    keyword_score: Some(hit.score),
                    combined_score: 0.0,
                });
            }
        }
    }

    for candidate in &mut candidates {
        candidate.combined_score = rrf_term(params.weight_vector, params.rrf_k, candidate.vector_rank)
            + rrf_term(params.weight_keyword, params.rrf_k, candidate.keyword_rank);
    }

    candidates
}

/// Final result ordering.
///
/// Higher `combined_score` first. Ties go to the smaller vector distance,
/// where a missing distance counts as infinitely far, then to the more
/// recently created record, then to the smaller record id. Every step is a
/// total order on its key, so the whole comparison is transitive.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| match (a.vector_distance, b.vector_distance) {
            (Some(da), Some(db)) => da.total_cmp(&db),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.record_id.cmp(&b.record_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::types::ContentType;

    fn v(id: MemoryId, distance: f32) -> VectorHit {
        VectorHit {
            record_id: id,
            distance,
        }
    }

    fn kw(id: MemoryId, score: f64) -> KeywordHit {
        KeywordHit {
            record_id: id,
            score,
        }
    }

    fn find(fused: &[FusedCandidate], id: MemoryId) -> &FusedCandidate {
        fused.iter().find(|c| c.record_id == id).unwrap()
    }

    fn result_from(c: &FusedCandidate, created_offset_secs: i64) -> SearchResult {
        SearchResult {
            record_id: c.record_id,
            content: String::new(),
            content_type: ContentType::Context,
            vector_rank: c.vector_rank,
            keyword_rank: c.keyword_rank,
            combined_score: c.combined_score,
            vector_distance: c.vector_distance,
            keyword_score: c.keyword_score,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
            relevance_score: 0.5,
        }
    }

    #[test]
    fn test_vector_only_score() {
        let id = MemoryId::new();
        let params = FusionParams {
            rrf_k: 60.0,
            weight_vector: 1.5,
            weight_keyword: 1.0,
        };
        let fused = fuse(&[v(id, 0.1)], &[], params);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].vector_rank, Some(1));
        assert_eq!(fused[0].keyword_rank, None);
        assert_eq!(fused[0].combined_score, 1.5 / (60.0 + 1.0));
    }

    #[test]
    fn test_full_outer_join() {
        let (a, b, c) = (MemoryId::new(), MemoryId::new(), MemoryId::new());
        let fused = fuse(
            &[v(a, 0.1), v(b, 0.2)],
            &[kw(b, 5.0), kw(c, 4.0)],
            FusionParams::default(),
        );

        assert_eq!(fused.len(), 3);
        let b_c = find(&fused, b);
        assert_eq!(b_c.vector_rank, Some(2));
        assert_eq!(b_c.keyword_rank, Some(1));
        assert_eq!(b_c.combined_score, 1.0 / 62.0 + 1.0 / 61.0);

        let c_c = find(&fused, c);
        assert_eq!(c_c.vector_rank, None);
        assert_eq!(c_c.keyword_rank, Some(2));
        assert_eq!(c_c.combined_score, 1.0 / 62.0);
    }

    #[test]
    fn test_rank_one_in_both_beats_rank_one_in_one() {
        for rrf_k in [0.0, 1.0, 60.0, 1000.0] {
            let (both, vec_only, kw_only) = (MemoryId::new(), MemoryId::new(), MemoryId::new());
            let params = FusionParams {
                rrf_k,
                weight_vector: 1.0,
                weight_keyword: 1.0,
            };
            // `both` is rank 1 in each list; the others are rank 1 in a list of their own.
            let fused_both = fuse(&[v(both, 0.0)], &[kw(both, 1.0)], params);
            let fused_single = fuse(&[v(vec_only, 0.0)], &[kw(kw_only, 1.0)], params);

            let s_both = fused_both[0].combined_score;
            assert!(s_both > find(&fused_single, vec_only).combined_score);
            assert!(s_both > find(&fused_single, kw_only).combined_score);
        }
    }

    #[test]
    fn test_zero_weight_disables_method() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        let params = FusionParams {
            rrf_k: 60.0,
            weight_vector: 0.0,
            weight_keyword: 1.0,
        };
        let fused = fuse(&[v(a, 0.0)], &[kw(b, 1.0)], params);
        assert_eq!(find(&fused, a).combined_score, 0.0);
        assert!(find(&fused, b).combined_score > 0.0);
    }

    #[test]
    fn test_duplicate_ids_keep_best_rank() {
        let a = MemoryId::new();
        let fused = fuse(&[v(a, 0.1), v(a, 0.5)], &[], FusionParams::default());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].vector_rank, Some(1));
    }

    #[test]
    fn test_empty_lists() {
        assert!(fuse(&[], &[], FusionParams::default()).is_empty());
    }

    #[test]
    fn test_tie_prefers_newer_record() {
        // Same combined score, no shared vector distance: recency decides.
        let (old, new) = (MemoryId::new(), MemoryId::new());
        let fused = fuse(&[], &[kw(old, 1.0)], FusionParams::default());
        let fused_new = fuse(&[], &[kw(new, 1.0)], FusionParams::default());

        let mut results = vec![
            result_from(&fused[0], -60),
            result_from(&fused_new[0], 0),
        ];
        assert_eq!(results[0].combined_score, results[1].combined_score);
        results.sort_by(compare_results);
        assert_eq!(results[0].record_id, new);
        assert_eq!(results[1].record_id, old);
    }

    #[test]
    fn test_tie_prefers_smaller_distance_when_both_have_one() {
        let (near, far) = (MemoryId::new(), MemoryId::new());
        let a = fuse(&[v(near, 0.1)], &[], FusionParams::default());
        let b = fuse(&[v(far, 0.4)], &[], FusionParams::default());

        // The far record is newer, but distance wins first.
        let mut results = vec![result_from(&b[0], 60), result_from(&a[0], 0)];
        results.sort_by(compare_results);
        assert_eq!(results[0].record_id, near);
    }

    #[test]
    fn test_tie_prefers_result_with_distance() {
        let (with_vec, kw_only) = (MemoryId::new(), MemoryId::new());
        let fused = fuse(&[v(with_vec, 0.1)], &[kw(kw_only, 2.0)], FusionParams::default());

        // The keyword-only record is newer, but having a distance wins first.
        let mut results = vec![
            result_from(find(&fused, kw_only), 0),
            result_from(find(&fused, with_vec), -10),
        ];
        results.sort_by(compare_results);
        assert_eq!(results[0].record_id, with_vec);
        assert_eq!(results[1].record_id, kw_only);
    }

    #[test]
    fn test_tie_order_independent_of_input_order() {
        // Equal scores with mixed distances and recency that disagrees with
        // distance: every input order must sort the same way.
        let base = fuse(&[v(MemoryId::new(), 0.0)], &[], FusionParams::default());
        let with = |distance: Option<f32>, offset: i64| {
            let mut r = result_from(&base[0], offset);
            r.record_id = MemoryId::new();
            r.vector_distance = distance;
            r
        };
        let near_old = with(Some(0.1), 0);
        let none_mid = with(None, 5);
        let far_new = with(Some(0.2), 10);

        let expected = vec![near_old.record_id, far_new.record_id, none_mid.record_id];
        let items = [near_old, none_mid, far_new];
        for order in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            let mut results: Vec<SearchResult> = order.iter().map(|&i| items[i].clone()).collect();
            results.sort_by(compare_results);
            let ids: Vec<MemoryId> = results.iter().map(|r| r.record_id).collect();
            assert_eq!(ids, expected, "input order {order:?}");
        }

        // Pairwise checks for the cycle that a partial tie-break would allow.
        assert_eq!(compare_results(&items[0], &items[2]), Ordering::Less);
        assert_eq!(compare_results(&items[2], &items[1]), Ordering::Less);
        assert_eq!(compare_results(&items[0], &items[1]), Ordering::Less);
    }

    #[test]
    fn test_higher_score_sorts_first() {
        let (a, b) = (MemoryId::new(), MemoryId::new());
        let fused = fuse(&[v(a, 0.1), v(b, 0.2)], &[kw(b, 1.0)], FusionParams::default());
        let mut results: Vec<_> = fused.iter().map(|c| result_from(c, 0)).collect();
        results.sort_by(compare_results);
        assert_eq!(results[0].record_id, b);
    }
}
