//! JUnit XML 보고서 -- `testsuites > testsuite > testcase`
//!
//! 스위트 결과를 quick-junit 보고서로 변환하여 문자열 또는 파일로 출력합니다.
//! 스위트 속성(tests, failures, errors, disabled, time)은 리듀서의 집계 값을 그대로
//! 사용하며, 케이스와 무관한 에러(엔진 실패 등)도 errors에 포함됩니다.

use std::path::Path;
use std::time::Duration;

use imagetest_core::types::{CaseStatus, TestCase, TestSuiteResult};
use quick_junit::{NonSuccessKind, Report, TestCaseStatus, TestSuite};
use tracing::info;

use crate::error::ReducerError;

/// 기본 보고서 이름
pub const DEFAULT_REPORT_NAME: &str = "imagetest";

fn junit_case(suite: &str, case: &TestCase) -> quick_junit::TestCase {
    let status = match case.status {
        CaseStatus::Passed => TestCaseStatus::success(),
        CaseStatus::Failed | CaseStatus::Error => {
            let kind = if case.status == CaseStatus::Failed {
                NonSuccessKind::Failure
            } else {
                NonSuccessKind::Error
            };
            let mut status = TestCaseStatus::non_success(kind);
            if let Some(detail) = case.failure.as_deref().filter(|d| !d.is_empty()) {
                status.set_description(detail);
            }
            status
        }
        CaseStatus::Skipped => {
            let mut status = TestCaseStatus::skipped();
            if let Some(reason) = case.failure.as_deref().filter(|d| !d.is_empty()) {
                status.set_message(reason);
            }
            status
        }
    };
    let mut junit = quick_junit::TestCase::new(case.name.as_str(), status);
    junit.set_classname(suite);
    junit.set_time(Duration::from_millis(case.elapsed_ms));
    junit
}

fn junit_suite(result: &TestSuiteResult) -> TestSuite {
    let mut suite = TestSuite::new(result.name.as_str());
    suite.add_test_cases(result.cases.iter().map(|case| junit_case(&result.name, case)));
    suite.tests = result.tests;
    suite.failures = result.failures;
    suite.errors = result.errors;
    suite.disabled = result.disabled;
    suite
        .extra
        .insert("skipped".into(), result.skipped.to_string().into());
    suite.set_time(Duration::from_millis(result.time_ms));
    suite
}

/// 스위트 결과 목록을 JUnit 보고서로 변환합니다.
pub fn build_report(name: &str, suites: &[TestSuiteResult]) -> Report {
    let mut report = Report::new(name);
    let total_ms: u64 = suites.iter().map(|s| s.time_ms).sum();
    for suite in suites {
        report.add_test_suite(junit_suite(suite));
    }
    report.set_time(Duration::from_millis(total_ms));
    report
}

/// JUnit XML 문자열로 렌더링합니다.
pub fn render_report(name: &str, suites: &[TestSuiteResult]) -> Result<String, ReducerError> {
    build_report(name, suites)
        .to_string()
        .map_err(|e| ReducerError::Serialize(e.to_string()))
}

/// JUnit XML 파일을 기록합니다.
pub fn write_report(
    path: impl AsRef<Path>,
    name: &str,
    suites: &[TestSuiteResult],
) -> Result<(), ReducerError> {
    let path = path.as_ref();
    let xml = render_report(name, suites)?;
    std::fs::write(path, xml).map_err(|source| ReducerError::Write {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), suites = suites.len(), "junit report written");
    Ok(())
}
