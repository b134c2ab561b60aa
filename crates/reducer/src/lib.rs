//! imagetest 결과 리듀서
//!
//! 테스트 실행 로그를 파싱하여 스위트 결과로 집계하고 JUnit XML 보고서를 생성합니다.
//!
//! # 처리 흐름
//! ```text
//! 로그 텍스트 -> ResultParser -> Vec<TestCase> -> Reducer -> TestSuiteResult -> junit
//! ```
//!
//! # 사용 예시
//! ```
//! use imagetest_reducer::reduce_to_suite;
//!
//! let log = "=== RUN   TestHostname\n--- PASS: TestHostname (0.01s)\nPASS\n";
//! let suite = reduce_to_suite(&[log], "hostname");
//! assert_eq!(suite.tests, 1);
//! assert_eq!(suite.time(), "0.010");
//! ```

pub mod error;
pub mod junit;
pub mod parser;
pub mod reduce;

pub use error::ReducerError;
pub use junit::{DEFAULT_REPORT_NAME, build_report, render_report, write_report};
pub use parser::{GoTestParser, ResultParser, parse_elapsed_ms};
pub use reduce::{Reducer, reduce_to_suite};
