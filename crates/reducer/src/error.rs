//! 리듀서 에러 타입
//!
//! [`ReducerError`]는 로그 파싱과 보고서 생성 중 발생하는 에러를 표현합니다.
//! `From<ReducerError> for ImagetestError` 변환이 구현되어 있습니다.

use imagetest_core::error::{ImagetestError, ParseError, ReportError};

/// 결과 리듀서 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ReducerError {
    /// 로그 파싱 실패 (잘못된 소요 시간 등)
    #[error("parse error at line {line}: {reason}")]
    Parse {
        /// 1부터 시작하는 줄 번호
        line: usize,
        /// 실패 사유
        reason: String,
    },

    /// 입력 로그 크기 초과
    #[error("log too large: {size} bytes (max: {max})")]
    InputTooLarge {
        /// 입력 크기
        size: usize,
        /// 허용 최대 크기
        max: usize,
    },

    /// 보고서 직렬화 실패
    #[error("report serialization failed: {0}")]
    Serialize(String),

    /// 보고서 파일 쓰기 실패
    #[error("failed to write report to {path}: {source}")]
    Write {
        /// 출력 경로
        path: String,
        /// 원인
        source: std::io::Error,
    },
}

impl From<ReducerError> for ImagetestError {
    fn from(err: ReducerError) -> Self {
        match err {
            ReducerError::Parse { line, reason } => {
                ImagetestError::Parse(ParseError::Failed { line, reason })
            }
            ReducerError::InputTooLarge { size, max } => {
                ImagetestError::Parse(ParseError::TooLarge { size, max })
            }
            ReducerError::Serialize(reason) => {
                ImagetestError::Report(ReportError::Serialize(reason))
            }
            ReducerError::Write { path, source } => ImagetestError::Report(ReportError::Write {
                path,
                reason: source.to_string(),
            }),
        }
    }
}
