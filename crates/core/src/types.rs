//! 도메인 타입 — 테스트 결과 레코드
//!
//! 결과 리듀서가 만들고 스케줄러가 집계하는 구조를 정의합니다.
//! 시간은 밀리초 정수로 보관하고, 출력 시에만 소수점 3자리 초 문자열로 변환합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 밀리초를 소수점 3자리 초 문자열로 변환합니다. (예: 30 -> "0.030")
pub fn format_seconds(millis: u64) -> String {
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

/// 테스트 케이스 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// 통과
    Passed,
    /// 실패
    Failed,
    /// 건너뜀
    Skipped,
    /// 시작했지만 결과 줄이 없음 (크래시, 타임아웃 등)
    Error,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "pass"),
            Self::Failed => write!(f, "fail"),
            Self::Skipped => write!(f, "skip"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 단일 테스트 케이스 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// 테스트 이름
    pub name: String,
    /// 소요 시간 (밀리초)
    pub elapsed_ms: u64,
    /// 결과 상태
    pub status: CaseStatus,
    /// 실패 상세 (시작 줄과 결과 줄 사이의 들여쓴 줄)
    pub failure: Option<String>,
}

impl TestCase {
    /// 소요 시간을 소수점 3자리 초 문자열로 반환합니다.
    pub fn time(&self) -> String {
        format_seconds(self.elapsed_ms)
    }
}

/// 테스트 스위트 집계 결과
///
/// `tests`는 전체 케이스 수, `time_ms`는 각 케이스 소요 시간의 합입니다
/// (실제 경과 시간이 아님).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    /// 스위트 이름
    pub name: String,
    /// 전체 케이스 수
    pub tests: usize,
    /// 실패 케이스 수
    pub failures: usize,
    /// 에러 수 (엔진 실패, 파싱 실패, 미완료 케이스 포함)
    pub errors: usize,
    /// 건너뛴 케이스 수
    pub skipped: usize,
    /// 비활성화된 케이스 수
    pub disabled: usize,
    /// 케이스 소요 시간 합 (밀리초)
    pub time_ms: u64,
    /// 개별 케이스
    pub cases: Vec<TestCase>,
}

impl TestSuiteResult {
    /// 빈 스위트 결과를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 케이스 목록에서 카운터를 계산하여 스위트 결과를 만듭니다.
    pub fn from_cases(name: impl Into<String>, cases: Vec<TestCase>) -> Self {
        let mut suite = Self::new(name);
        for case in cases {
            suite.push_case(case);
        }
        suite
    }

    /// 케이스를 추가하고 카운터를 갱신합니다.
    pub fn push_case(&mut self, case: TestCase) {
        self.tests += 1;
        self.time_ms += case.elapsed_ms;
        match case.status {
            CaseStatus::Passed => {}
            CaseStatus::Failed => self.failures += 1,
            CaseStatus::Skipped => self.skipped += 1,
            CaseStatus::Error => self.errors += 1,
        }
        self.cases.push(case);
    }

    /// 케이스와 무관한 에러를 기록합니다. (엔진 실패, 로그 파싱 실패 등)
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// 소요 시간 합을 소수점 3자리 초 문자열로 반환합니다.
    pub fn time(&self) -> String {
        format_seconds(self.time_ms)
    }

    /// 실패 또는 에러가 있는지 확인합니다.
    pub fn is_failing(&self) -> bool {
        self.failures != 0 || self.errors != 0
    }
}

/// 실행 전체의 집계 결과
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// 스위트별 결과 (워크플로 구성 순서)
    pub suites: Vec<TestSuiteResult>,
    /// 전체 케이스 수
    pub tests: usize,
    /// 전체 실패 수
    pub failures: usize,
    /// 전체 에러 수
    pub errors: usize,
}

impl RunSummary {
    /// 스위트 결과를 전역 집계에 합산합니다.
    pub fn absorb(&mut self, suite: TestSuiteResult) {
        self.tests += suite.tests;
        self.failures += suite.failures;
        self.errors += suite.errors;
        self.suites.push(suite);
    }

    /// 종료 코드 결정용: 실패나 에러가 하나라도 있는지 확인합니다.
    pub fn is_failing(&self) -> bool {
        self.failures != 0 || self.errors != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(name: &str, ms: u64, status: CaseStatus) -> TestCase {
        TestCase {
            name: name.to_owned(),
            elapsed_ms: ms,
            status,
            failure: None,
        }
    }

    #[test]
    fn format_seconds_pads_to_three_decimals() {
        assert_eq!(format_seconds(0), "0.000");
        assert_eq!(format_seconds(30), "0.030");
        assert_eq!(format_seconds(1500), "1.500");
        assert_eq!(format_seconds(62_004), "62.004");
    }

    #[test]
    fn from_cases_counts_by_status() {
        let suite = TestSuiteResult::from_cases(
            "hostname",
            vec![
                case("TestA", 10, CaseStatus::Passed),
                case("TestB", 20, CaseStatus::Failed),
                case("TestC", 0, CaseStatus::Skipped),
                case("TestD", 5, CaseStatus::Error),
            ],
        );
        assert_eq!(suite.tests, 4);
        assert_eq!(suite.failures, 1);
        assert_eq!(suite.skipped, 1);
        assert_eq!(suite.errors, 1);
        assert_eq!(suite.time(), "0.035");
        assert!(suite.is_failing());
    }

    #[test]
    fn run_summary_sums_across_suites() {
        let mut summary = RunSummary::default();
        summary.absorb(TestSuiteResult::from_cases(
            "a",
            vec![case("TestA", 1, CaseStatus::Passed)],
        ));
        let mut b = TestSuiteResult::new("b");
        b.record_error();
        summary.absorb(b);

        assert_eq!(summary.tests, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.suites.len(), 2);
        assert!(summary.is_failing());
    }

    #[test]
    fn empty_summary_is_not_failing() {
        assert!(!RunSummary::default().is_failing());
    }
}
