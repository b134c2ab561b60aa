//! 설정 관리 — imagetest.toml 파싱 및 런타임 설정
//!
//! [`ImagetestConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IMAGETEST_SCHEDULER_PARALLEL_COUNT=10` 형식)
//! 3. 설정 파일 (`imagetest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), imagetest_core::error::ImagetestError> {
//! use imagetest_core::config::ImagetestConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ImagetestConfig::load("imagetest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ImagetestConfig::parse("[scheduler]\nparallel_count = 3")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ImagetestError};

/// 동시 실행 워크플로 최대 수 상한
const MAX_PARALLEL_COUNT: usize = 1000;
/// 실행 간격 상한 (1시간)
const MAX_STAGGER_MS: u64 = 60 * 60 * 1000;

/// imagetest 통합 설정
///
/// `imagetest.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagetestConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 외부 워크플로 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 아티팩트 스토리지 설정
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// 결과 리포트 설정
    #[serde(default)]
    pub report: ReportConfig,
}

impl ImagetestConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ImagetestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값으로 시작합니다.
    ///
    /// 파일이 존재하지만 파싱에 실패하면 에러를 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ImagetestError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(ImagetestError::Config(ConfigError::FileNotFound { .. })) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ImagetestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImagetestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ImagetestError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ImagetestError> {
        toml::from_str(toml_str).map_err(|e| {
            ImagetestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IMAGETEST_{SECTION}_{FIELD}`
    /// 예: `IMAGETEST_SCHEDULER_PARALLEL_COUNT=10`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IMAGETEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IMAGETEST_GENERAL_LOG_FORMAT");

        // Scheduler
        override_string(&mut self.scheduler.project, "IMAGETEST_SCHEDULER_PROJECT");
        override_csv(&mut self.scheduler.zones, "IMAGETEST_SCHEDULER_ZONES");
        override_csv(
            &mut self.scheduler.test_projects,
            "IMAGETEST_SCHEDULER_TEST_PROJECTS",
        );
        override_usize(
            &mut self.scheduler.parallel_count,
            "IMAGETEST_SCHEDULER_PARALLEL_COUNT",
        );
        override_u64(
            &mut self.scheduler.parallel_stagger_ms,
            "IMAGETEST_SCHEDULER_PARALLEL_STAGGER_MS",
        );

        // Engine
        override_string(&mut self.engine.program, "IMAGETEST_ENGINE_PROGRAM");
        override_csv(&mut self.engine.args, "IMAGETEST_ENGINE_ARGS");
        override_string(&mut self.engine.work_dir, "IMAGETEST_ENGINE_WORK_DIR");
        override_u64(
            &mut self.engine.step_timeout_secs,
            "IMAGETEST_ENGINE_STEP_TIMEOUT_SECS",
        );

        // Artifacts
        override_string(&mut self.artifacts.root, "IMAGETEST_ARTIFACTS_ROOT");
        override_string(&mut self.artifacts.prefix, "IMAGETEST_ARTIFACTS_PREFIX");
        override_string(
            &mut self.artifacts.local_path,
            "IMAGETEST_ARTIFACTS_LOCAL_PATH",
        );

        // Report
        override_string(&mut self.report.out_path, "IMAGETEST_REPORT_OUT_PATH");
        override_bool(
            &mut self.report.set_exit_status,
            "IMAGETEST_REPORT_SET_EXIT_STATUS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ImagetestError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.scheduler.parallel_count == 0 || self.scheduler.parallel_count > MAX_PARALLEL_COUNT
        {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.parallel_count".to_owned(),
                reason: format!("must be 1-{MAX_PARALLEL_COUNT}"),
            }
            .into());
        }

        if self.scheduler.parallel_stagger_ms > MAX_STAGGER_MS {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.parallel_stagger_ms".to_owned(),
                reason: format!("must be 0-{MAX_STAGGER_MS}"),
            }
            .into());
        }

        if self.scheduler.zones.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.zones".to_owned(),
                reason: "at least one zone is required".to_owned(),
            }
            .into());
        }

        if self.engine.step_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.step_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.report.out_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "report.out_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 워크플로를 실행할 프로젝트
    pub project: String,
    /// 라운드로빈으로 배정할 zone 목록
    pub zones: Vec<String>,
    /// 테스트 VM을 생성할 프로젝트 목록 (비어 있으면 `project` 사용)
    pub test_projects: Vec<String>,
    /// 동시 실행 워크플로 최대 수
    pub parallel_count: usize,
    /// 연속 실행 사이의 지연 (밀리초)
    pub parallel_stagger_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            zones: vec!["us-central1-a".to_owned()],
            test_projects: Vec::new(),
            parallel_count: 5,
            parallel_stagger_ms: 60_000,
        }
    }
}

/// 외부 워크플로 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 엔진 실행 파일
    pub program: String,
    /// 워크플로 파일 앞에 붙는 추가 인자
    pub args: Vec<String>,
    /// 워크플로 문서를 기록할 디렉토리
    pub work_dir: String,
    /// 스텝별 타임아웃 (초), 엔진이 강제합니다
    pub step_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "daisy".to_owned(),
            args: Vec::new(),
            work_dir: std::env::temp_dir()
                .join("imagetest")
                .display()
                .to_string(),
            step_timeout_secs: 45 * 60,
        }
    }
}

/// 아티팩트 스토리지 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// 스토리지 루트 (마운트된 버킷 디렉토리 등)
    pub root: String,
    /// 실행 결과가 기록되는 경로 접두사
    pub prefix: String,
    /// 아티팩트를 미러링할 로컬 경로 (비어 있으면 미러링 생략)
    pub local_path: String,
}

/// 결과 리포트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// JUnit XML 출력 경로
    pub out_path: String,
    /// 실패가 있으면 0이 아닌 종료 코드를 반환할지 여부
    pub set_exit_status: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            out_path: "junit.xml".to_owned(),
            set_exit_status: true,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
