//! 스케줄러 에러 타입
//!
//! [`SchedulerError`]는 워크플로 구성과 실행 조율 중 발생하는 에러를,
//! [`EngineError`]는 외부 워크플로 엔진 호출 실패를 표현합니다.
//! 둘 다 `ImagetestError`로 변환됩니다.

use imagetest_core::error::{
    BuildError, ConfigError, ExecutionError, ImagetestError, StorageError,
};
use imagetest_graph::GraphError;

/// 외부 워크플로 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 워크플로 문서 직렬화 실패
    #[error("failed to render workflow document: {0}")]
    Document(String),

    /// 작업 디렉토리/문서 파일 I/O 실패
    #[error("engine io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// 엔진 프로세스 시작 실패
    #[error("failed to spawn engine '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// 엔진이 0이 아닌 코드로 종료
    #[error("engine exited with {}: {stderr}", exit_code_label(.code))]
    Exited {
        /// 종료 코드 (시그널 종료 시 None)
        code: Option<i32>,
        /// stderr 마지막 부분
        stderr: String,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_owned(),
    }
}

/// 스케줄러 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// 잘못된 스위트 필터 정규식
    #[error("invalid {kind} filter '{pattern}': {reason}")]
    InvalidFilter {
        /// include 또는 exclude
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    /// 해석할 수 없는 이미지 참조
    #[error("invalid image reference '{0}'")]
    InvalidImage(String),

    /// 잘못된 실행 옵션
    #[error("invalid option '{field}': {reason}")]
    InvalidOption { field: &'static str, reason: String },

    /// 스위트 셋업 중 그래프 구성 실패
    #[error("setup of {workflow} failed: {source}")]
    Setup {
        /// 워크플로 이름 (`{suite}-{image}`)
        workflow: String,
        source: GraphError,
    },

    /// 그래프 구성 에러
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// 엔진 에러
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// 아티팩트 목록 조회 실패
    #[error("failed to list artifacts under '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// 아티팩트 읽기 실패
    #[error("failed to fetch artifact '{path}': {reason}")]
    Fetch { path: String, reason: String },

    /// 실행 중 태스크 조인 실패
    #[error("workflow task failed: {0}")]
    Join(String),
}

impl From<EngineError> for ImagetestError {
    fn from(err: EngineError) -> Self {
        ImagetestError::Execution(ExecutionError::Engine(err.to_string()))
    }
}

impl From<SchedulerError> for ImagetestError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidFilter { .. } | SchedulerError::InvalidOption { .. } => {
                ImagetestError::Config(ConfigError::InvalidValue {
                    field: "scheduler".to_owned(),
                    reason: err.to_string(),
                })
            }
            SchedulerError::InvalidImage(image) => {
                ImagetestError::Build(BuildError::InvalidReference(format!("image '{image}'")))
            }
            SchedulerError::Setup { workflow, source } => {
                ImagetestError::Build(BuildError::Setup {
                    suite: workflow,
                    reason: source.to_string(),
                })
            }
            SchedulerError::Graph(e) => e.into(),
            SchedulerError::Engine(e) => e.into(),
            SchedulerError::List { .. } => {
                ImagetestError::Storage(StorageError::List(err.to_string()))
            }
            SchedulerError::Fetch { .. } => {
                ImagetestError::Storage(StorageError::Fetch(err.to_string()))
            }
            SchedulerError::Join(reason) => {
                ImagetestError::Execution(ExecutionError::Engine(reason))
            }
        }
    }
}
