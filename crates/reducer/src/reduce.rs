//! 스위트 집계 -- 여러 로그의 케이스를 하나의 스위트 결과로 병합
//!
//! 같은 스위트의 독립 실행(예: 아키텍처별) 로그를 더하기 방식으로 병합합니다.
//! 로그 순서는 최종 카운터에 영향을 주지 않습니다. 파싱에 실패한 로그는
//! 해당 스위트의 에러 하나로 기록되고 나머지 로그는 계속 집계됩니다.

use imagetest_core::types::TestSuiteResult;
use tracing::{debug, warn};

use crate::parser::{GoTestParser, ResultParser};

/// 파서를 감싼 결과 리듀서
#[derive(Debug, Clone, Default)]
pub struct Reducer<P = GoTestParser> {
    parser: P,
}

impl Reducer<GoTestParser> {
    /// 기본 파서로 리듀서를 생성합니다.
    pub fn new() -> Self {
        Self::with_parser(GoTestParser::new())
    }
}

impl<P: ResultParser> Reducer<P> {
    /// 지정한 파서로 리듀서를 생성합니다.
    pub fn with_parser(parser: P) -> Self {
        Self { parser }
    }

    /// 사용 중인 파서
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// 로그 목록을 하나의 스위트 결과로 병합합니다.
    ///
    /// Tests는 전체 케이스 수, Failures는 실패 케이스 수, Time은 케이스별 소요 시간의
    /// 합입니다. 파싱 실패는 Errors에 더해집니다.
    pub fn reduce_to_suite<S: AsRef<str>>(&self, logs: &[S], name: &str) -> TestSuiteResult {
        let mut suite = TestSuiteResult::new(name);
        for (index, log) in logs.iter().enumerate() {
            match self.parser.parse(log.as_ref()) {
                Ok(cases) => {
                    for case in cases {
                        suite.push_case(case);
                    }
                }
                Err(e) => {
                    warn!(
                        suite = %name,
                        log_index = index,
                        parser = self.parser.format_name(),
                        error = %e,
                        "failed to parse test log"
                    );
                    suite.record_error();
                }
            }
        }
        debug!(
            suite = %name,
            logs = logs.len(),
            tests = suite.tests,
            failures = suite.failures,
            errors = suite.errors,
            time = %suite.time(),
            "suite reduced"
        );
        suite
    }
}

/// 기본 파서로 로그 목록을 하나의 스위트 결과로 병합합니다.
pub fn reduce_to_suite<S: AsRef<str>>(logs: &[S], name: &str) -> TestSuiteResult {
    Reducer::new().reduce_to_suite(logs, name)
}
