//! 에러 타입 — 도메인별 에러 정의

/// imagetest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ImagetestError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 워크플로 그래프 구성 에러
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// 워크플로 실행 에러
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// 테스트 로그 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 아티팩트 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 결과 보고서 생성 에러
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 워크플로 구성 에러
///
/// 셋업 단계에서 발생하며, 해당 워크플로의 구성을 즉시 중단시킵니다.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// 잘못된 리소스 참조 (zone, region, 네트워크 등)
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// 선행 조건 위반 (네트워크 없이 alias IP 추가 등)
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// 스위트 셋업 실패
    #[error("suite setup failed: {suite}: {reason}")]
    Setup { suite: String, reason: String },
}

/// 워크플로 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// 외부 워크플로 엔진 실패
    #[error("engine failed: {0}")]
    Engine(String),

    /// 워크플로가 실행되지 않음 (종료 요청 등)
    #[error("workflow not launched: {0}")]
    NotLaunched(String),
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 파싱 실패
    #[error("parse failed at line {line}: {reason}")]
    Failed { line: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 객체 목록 조회 실패
    #[error("list failed: {0}")]
    List(String),

    /// 객체 다운로드 실패
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// 결과 보고서 에러
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// 보고서 직렬화 실패
    #[error("failed to serialize report: {0}")]
    Serialize(String),

    /// 보고서 파일 쓰기 실패
    #[error("failed to write report to {path}: {reason}")]
    Write { path: String, reason: String },
}
