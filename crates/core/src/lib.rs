//! imagetest 공통 크레이트
//!
//! 모든 imagetest 크레이트가 공유하는 에러 계층, 설정, 결과 타입을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`config`]: `imagetest.toml` 파싱과 환경변수 오버라이드
//! - [`error`]: 최상위 에러와 도메인별 에러
//! - [`types`]: 테스트 케이스, 스위트, 실행 집계 결과

pub mod config;
pub mod error;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    BuildError, ConfigError, ExecutionError, ImagetestError, ParseError, ReportError,
    StorageError,
};

// 설정
pub use config::ImagetestConfig;

// 결과 타입
pub use types::{CaseStatus, RunSummary, TestCase, TestSuiteResult, format_seconds};
