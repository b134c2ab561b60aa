//! 테스트 로그 파서 -- 원시 텍스트를 테스트 케이스 목록으로 변환
//!
//! [`ResultParser`] 트레이트 뒤에 파서를 격리하여, 집계 로직을 건드리지 않고
//! 구조화된 결과 형식으로 교체할 수 있습니다.
//!
//! # 지원 형식 (verbose 테스트 출력)
//! ```text
//! === RUN   TestHostname
//!     hostname_test.go:31: expected "a", got "b"
//! --- FAIL: TestHostname (0.01s)
//! === RUN   TestParent
//! === RUN   TestParent/child
//! --- PASS: TestParent (0.00s)
//!     --- PASS: TestParent/child (0.00s)
//! ```
//!
//! - `=== RUN` 줄이 케이스를 시작하고 `--- PASS|FAIL|SKIP` 줄이 종료합니다.
//! - 시작과 종료 사이의 들여쓴 줄은 실패 상세로 수집됩니다.
//! - 들여쓴 결과 줄(서브테스트)도 별도 케이스로 기록됩니다.
//! - 종료 줄이 없는 케이스(크래시, 타임아웃)는 에러 케이스가 됩니다.

use imagetest_core::types::{CaseStatus, TestCase};
use tracing::trace;

use crate::error::ReducerError;

/// 기본 최대 입력 크기 (16MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 16 * 1024 * 1024;

/// 종료 줄 없이 끝난 케이스의 상세 메시지
pub const INCOMPLETE_DETAIL: &str = "test did not complete (no result line)";

/// 원시 테스트 로그 -> 테스트 케이스 목록
pub trait ResultParser: Send + Sync {
    /// 지원하는 로그 형식 이름
    fn format_name(&self) -> &str;

    /// 로그 하나를 파싱합니다. 케이스는 종료 줄 순서로 반환됩니다.
    fn parse(&self, raw: &str) -> Result<Vec<TestCase>, ReducerError>;
}

/// verbose 테스트 출력 파서
#[derive(Debug, Clone)]
pub struct GoTestParser {
    max_input_size: usize,
}

impl Default for GoTestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GoTestParser {
    /// 기본 설정으로 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }
}

/// 시작했지만 아직 종료 줄이 없는 케이스
struct OpenCase {
    name: String,
    detail: Vec<String>,
}

/// 파싱된 종료 줄
struct ResultLine<'a> {
    status: CaseStatus,
    name: &'a str,
    elapsed: &'a str,
}

/// `--- PASS: name (0.01s)` 형태를 분해합니다. 형식이 다르면 `None`.
fn split_result_line(line: &str) -> Option<ResultLine<'_>> {
    let rest = line.trim_start().strip_prefix("--- ")?;
    let (status, rest) = rest.split_once(": ")?;
    let status = match status {
        "PASS" => CaseStatus::Passed,
        "FAIL" => CaseStatus::Failed,
        "SKIP" => CaseStatus::Skipped,
        _ => return None,
    };
    let (name, elapsed) = rest.rsplit_once(" (")?;
    let elapsed = elapsed.strip_suffix(')')?;
    Some(ResultLine {
        status,
        name: name.trim(),
        elapsed,
    })
}

/// `0.01s` 형태의 소요 시간을 밀리초로 변환합니다. (밀리초 미만 절삭)
pub fn parse_elapsed_ms(raw: &str) -> Option<u64> {
    let seconds = raw.trim().strip_suffix('s')?;
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;
    let millis = fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0u64, |acc, digit| acc * 10 + u64::from(digit - b'0'));
    whole.checked_mul(1000)?.checked_add(millis)
}

/// `=== RUN name` 등 제어 줄이면 (동작, 이름)을 반환합니다.
fn split_control_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("=== ")?;
    let (action, name) = rest.split_once(char::is_whitespace)?;
    Some((action, name.trim()))
}

impl ResultParser for GoTestParser {
    fn format_name(&self) -> &str {
        "go-test-verbose"
    }

    fn parse(&self, raw: &str) -> Result<Vec<TestCase>, ReducerError> {
        if raw.len() > self.max_input_size {
            return Err(ReducerError::InputTooLarge {
                size: raw.len(),
                max: self.max_input_size,
            });
        }

        let mut cases = Vec::new();
        let mut open: Vec<OpenCase> = Vec::new();
        let mut current: Option<String> = None;

        for (index, line) in raw.lines().enumerate() {
            let line = line.trim_end();

            if let Some((action, name)) = split_control_line(line) {
                match action {
                    "RUN" => {
                        open.push(OpenCase {
                            name: name.to_owned(),
                            detail: Vec::new(),
                        });
                        current = Some(name.to_owned());
                    }
                    "CONT" | "NAME" => current = Some(name.to_owned()),
                    _ => {}
                }
                continue;
            }

            if let Some(result) = split_result_line(line) {
                let elapsed_ms =
                    parse_elapsed_ms(result.elapsed).ok_or_else(|| ReducerError::Parse {
                        line: index + 1,
                        reason: format!(
                            "invalid elapsed time '{}' for {}",
                            result.elapsed, result.name
                        ),
                    })?;
                let detail = open
                    .iter()
                    .position(|c| c.name == result.name)
                    .map(|pos| open.remove(pos).detail)
                    .unwrap_or_default();
                let failure = match result.status {
                    CaseStatus::Passed => None,
                    _ if detail.is_empty() && result.status == CaseStatus::Skipped => None,
                    _ => Some(detail.join("\n")),
                };
                trace!(case = %result.name, status = %result.status, elapsed_ms, "case parsed");
                cases.push(TestCase {
                    name: result.name.to_owned(),
                    elapsed_ms,
                    status: result.status,
                    failure,
                });
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let target = current
                    .as_deref()
                    .and_then(|name| open.iter().rposition(|c| c.name == name))
                    .or_else(|| open.len().checked_sub(1));
                if let Some(pos) = target {
                    open[pos].detail.push(line.trim_start().to_owned());
                }
            }
        }

        for incomplete in open {
            cases.push(TestCase {
                name: incomplete.name,
                elapsed_ms: 0,
                status: CaseStatus::Error,
                failure: Some(if incomplete.detail.is_empty() {
                    INCOMPLETE_DETAIL.to_owned()
                } else {
                    format!("{INCOMPLETE_DETAIL}\n{}", incomplete.detail.join("\n"))
                }),
            });
        }

        Ok(cases)
    }
}
