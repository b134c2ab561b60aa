//! 쿼터 집계 -- 중복 리소스 쿼터 요청을 하나의 대기 조건으로 병합
//!
//! 같은 `(metric, region)` 키의 요청은 units를 합산하고, 다른 키는 별도 항목으로
//! 유지합니다. 병합 결과는 키 순서로 정렬되므로 입력 순서와 무관합니다
//! (교환 법칙, 결합 법칙 성립).
//!
//! # 사용 예시
//! ```
//! use imagetest_graph::quota::{QuotaRequest, merge_quota_requests};
//!
//! let merged = merge_quota_requests(vec![
//!     QuotaRequest::new("CPUS", "us-central1", 2),
//!     QuotaRequest::new("CPUS", "us-central1", 1),
//! ]);
//! assert_eq!(merged, vec![QuotaRequest::new("CPUS", "us-central1", 3)]);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 단일 쿼터 요청
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaRequest {
    /// 쿼터 메트릭 (예: `CPUS`, `SSD_TOTAL_GB`)
    pub metric: String,
    /// 리전
    pub region: String,
    /// 요청 수량
    pub units: u64,
}

impl QuotaRequest {
    /// 새 쿼터 요청을 생성합니다.
    pub fn new(metric: impl Into<String>, region: impl Into<String>, units: u64) -> Self {
        Self {
            metric: metric.into(),
            region: region.into(),
            units,
        }
    }
}

/// `(metric, region)` 키로 병합된 쿼터 요청 집합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaSet {
    entries: BTreeMap<(String, String), u64>,
}

impl QuotaSet {
    /// 빈 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 요청을 병합합니다. 같은 키가 있으면 units를 합산합니다.
    pub fn insert(&mut self, request: QuotaRequest) {
        let units = self
            .entries
            .entry((request.metric, request.region))
            .or_insert(0);
        *units = units.saturating_add(request.units);
    }

    /// 특정 키의 누적 units를 조회합니다.
    pub fn units(&self, metric: &str, region: &str) -> Option<u64> {
        self.entries
            .get(&(metric.to_owned(), region.to_owned()))
            .copied()
    }

    /// 병합된 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 병합된 요청 목록을 키 순서로 반환합니다.
    pub fn requests(&self) -> Vec<QuotaRequest> {
        self.entries
            .iter()
            .map(|((metric, region), units)| QuotaRequest::new(metric, region, *units))
            .collect()
    }
}

impl Extend<QuotaRequest> for QuotaSet {
    fn extend<T: IntoIterator<Item = QuotaRequest>>(&mut self, iter: T) {
        for request in iter {
            self.insert(request);
        }
    }
}

impl FromIterator<QuotaRequest> for QuotaSet {
    fn from_iter<T: IntoIterator<Item = QuotaRequest>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// 쿼터 요청 목록을 병합합니다.
pub fn merge_quota_requests(requests: impl IntoIterator<Item = QuotaRequest>) -> Vec<QuotaRequest> {
    requests.into_iter().collect::<QuotaSet>().requests()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn same_key_sums_units() {
        let merged = merge_quota_requests(vec![
            QuotaRequest::new("m", "r", 2),
            QuotaRequest::new("m", "r", 1),
        ]);
        assert_eq!(merged, vec![QuotaRequest::new("m", "r", 3)]);
    }

    #[test]
    fn distinct_keys_stay_separate() {
        let merged = merge_quota_requests(vec![
            QuotaRequest::new("m1", "r1", 2),
            QuotaRequest::new("m2", "r2", 1),
        ]);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&QuotaRequest::new("m1", "r1", 2)));
        assert!(merged.contains(&QuotaRequest::new("m2", "r2", 1)));
    }

    #[test]
    fn same_metric_different_region_is_distinct() {
        let set: QuotaSet = vec![
            QuotaRequest::new("CPUS", "us-central1", 4),
            QuotaRequest::new("CPUS", "europe-west4", 4),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.units("CPUS", "us-central1"), Some(4));
    }

    #[test]
    fn empty_input_yields_empty_set() {
        assert!(merge_quota_requests(Vec::new()).is_empty());
    }

    #[test]
    fn units_saturate_instead_of_overflowing() {
        let mut set = QuotaSet::new();
        set.insert(QuotaRequest::new("m", "r", u64::MAX));
        set.insert(QuotaRequest::new("m", "r", 5));
        assert_eq!(set.units("m", "r"), Some(u64::MAX));
    }

    fn request_strategy() -> impl Strategy<Value = QuotaRequest> {
        (
            prop::sample::select(vec!["CPUS", "GPUS", "SSD_TOTAL_GB"]),
            prop::sample::select(vec!["us-central1", "europe-west4"]),
            0u64..1000,
        )
            .prop_map(|(m, r, u)| QuotaRequest::new(m, r, u))
    }

    proptest! {
        #[test]
        fn merge_is_permutation_invariant(
            (requests, shuffled) in prop::collection::vec(request_strategy(), 0..24)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            prop_assert_eq!(merge_quota_requests(requests), merge_quota_requests(shuffled));
        }

        #[test]
        fn merge_is_associative(
            a in prop::collection::vec(request_strategy(), 0..8),
            b in prop::collection::vec(request_strategy(), 0..8),
        ) {
            let all: Vec<_> = a.iter().chain(b.iter()).cloned().collect();
            let staged = merge_quota_requests(
                merge_quota_requests(a).into_iter().chain(merge_quota_requests(b)),
            );
            prop_assert_eq!(merge_quota_requests(all), staged);
        }

        #[test]
        fn merged_total_equals_input_total(
            requests in prop::collection::vec(request_strategy(), 0..24)
        ) {
            let total: u64 = requests.iter().map(|r| r.units).sum();
            let merged_total: u64 = merge_quota_requests(requests).iter().map(|r| r.units).sum();
            prop_assert_eq!(total, merged_total);
        }
    }
}
