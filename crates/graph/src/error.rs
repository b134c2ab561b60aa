//! 그래프 빌더 에러 타입
//!
//! [`GraphError`]는 워크플로 구성 중 발생하는 모든 에러를 표현합니다.
//! `From<GraphError> for ImagetestError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use imagetest_core::error::{BuildError, ImagetestError};

/// 그래프 빌더 도메인 에러
///
/// 모든 에러는 셋업 단계에서 동기적으로 반환되며, 에러를 반환한 연산은
/// 그래프를 변경하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// 구분자가 없거나 비어 있는 zone 문자열
    #[error("invalid zone '{zone}': {reason}")]
    InvalidZone {
        /// 입력된 zone
        zone: String,
        /// 실패 사유
        reason: String,
    },

    /// 유도할 수 없거나 형식이 잘못된 region
    #[error("invalid region '{0}'")]
    InvalidRegion(String),

    /// 이미 존재하는 리소스 이름
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// 리소스 종류 (vm, disk, step 등)
        kind: &'static str,
        /// 리소스 이름
        name: String,
    },

    /// 워크플로에 없는 VM
    #[error("unknown vm '{0}'")]
    UnknownVm(String),

    /// 워크플로에 없는 네트워크 또는 서브네트워크
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    /// 워크플로에 없는 스텝
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// 선행 호출 누락 (네트워크 생성 전 커스텀 네트워크 추가 등)
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// 커스텀 서브넷 모드 네트워크에 서브네트워크 미지정
    #[error("network '{0}' is in custom subnet mode, a subnetwork is required")]
    MissingSubnetwork(String),

    /// 잘못된 인자
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 의존성 순환
    #[error("dependency cycle detected at step '{0}'")]
    Cycle(String),
}

impl From<GraphError> for ImagetestError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Precondition(_) | GraphError::MissingSubnetwork(_) => {
                ImagetestError::Build(BuildError::Precondition(err.to_string()))
            }
            other => ImagetestError::Build(BuildError::InvalidReference(other.to_string())),
        }
    }
}
