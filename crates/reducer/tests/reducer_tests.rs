//! 통합 테스트 -- 로그 픽스처에서 JUnit 보고서까지
//!
//! 실제 verbose 테스트 출력 픽스처를 집계하여 스위트 카운터와 XML 출력을 검증합니다.

use std::path::PathBuf;

use proptest::prelude::*;

use imagetest_core::types::CaseStatus;
use imagetest_reducer::{render_report, reduce_to_suite, write_report};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).expect("fixture should exist")
}

/// 통과 4건 (0.01/0.02/0.00/0.00s) -> Tests=4, Time=0.030
#[test]
fn passing_log_reduces_to_four_tests() {
    let suite = reduce_to_suite(&[fixture("passing.txt")], "hostname");
    assert_eq!(suite.tests, 4);
    assert_eq!(suite.failures, 0);
    assert_eq!(suite.errors, 0);
    assert_eq!(suite.time(), "0.030");
}

/// 실패 1건 + 통과 4건 -> Tests=5, Failures=1, Time=0.000
#[test]
fn failing_log_counts_failure_and_detail() {
    let suite = reduce_to_suite(&[fixture("failing.txt")], "hostname");
    assert_eq!(suite.tests, 5);
    assert_eq!(suite.failures, 1);
    assert_eq!(suite.time(), "0.000");

    let failed = suite
        .cases
        .iter()
        .find(|c| c.status == CaseStatus::Failed)
        .expect("one failed case");
    assert_eq!(failed.name, "TestHostname");
    assert!(
        failed
            .failure
            .as_deref()
            .unwrap()
            .starts_with("hostname_test.go:41:")
    );
}

/// 같은 로그 두 번 -> Tests=8, Time=0.060
#[test]
fn passing_log_twice_is_additive() {
    let passing = fixture("passing.txt");
    let suite = reduce_to_suite(&[passing.clone(), passing], "hostname");
    assert_eq!(suite.tests, 8);
    assert_eq!(suite.time(), "0.060");
}

/// 통과 + 실패 로그 -> Tests=9, Failures=1, Time=0.030
#[test]
fn passing_and_failing_logs_merge() {
    let suite = reduce_to_suite(&[fixture("passing.txt"), fixture("failing.txt")], "hostname");
    assert_eq!(suite.tests, 9);
    assert_eq!(suite.failures, 1);
    assert_eq!(suite.time(), "0.030");
    assert!(suite.is_failing());
}

/// 손상된 로그 하나는 스위트 에러 하나로만 기록
#[test]
fn malformed_log_does_not_block_other_logs() {
    let broken = "=== RUN   TestA\n--- PASS: TestA (later)\n";
    let suite = reduce_to_suite(&[fixture("passing.txt"), broken.to_owned()], "hostname");
    assert_eq!(suite.tests, 4);
    assert_eq!(suite.errors, 1);
}

#[test]
fn junit_report_carries_suite_attributes() {
    let passing = reduce_to_suite(&[fixture("passing.txt")], "hostname-debian-12");
    let failing = reduce_to_suite(&[fixture("failing.txt")], "hostname-rhel-9");

    let xml = render_report("imagetest", &[passing, failing]).unwrap();
    assert!(xml.contains(r#"name="hostname-debian-12""#));
    assert!(xml.contains(r#"tests="4""#));
    assert!(xml.contains(r#"time="0.030""#));
    assert!(xml.contains(r#"failures="1""#));
    assert!(xml.contains("TestHostKeysGeneratedOnce"));
    assert!(xml.contains("does not match metadata"));
}

#[test]
fn junit_report_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junit.xml");
    let suite = reduce_to_suite(&[fixture("passing.txt")], "hostname");

    write_report(&path, "imagetest", &[suite]).unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("<testsuites"));
    assert_eq!(xml.matches("<testcase").count(), 4);
}

proptest! {
    /// 로그 순서는 최종 카운터에 영향을 주지 않음
    #[test]
    fn log_order_does_not_change_counts(order in Just(vec![0usize, 1, 0, 1]).prop_shuffle()) {
        let logs = [fixture("passing.txt"), fixture("failing.txt")];
        let shuffled: Vec<&str> = order.iter().map(|&i| logs[i].as_str()).collect();
        let suite = reduce_to_suite(&shuffled, "hostname");
        prop_assert_eq!(suite.tests, 18);
        prop_assert_eq!(suite.failures, 2);
        prop_assert_eq!(suite.time(), "0.060");
    }
}
