//! imagetest 리소스 그래프 빌더
//!
//! (테스트 스위트, 이미지) 한 쌍마다 프로비저닝/실행 스텝의 의존성 그래프를 구성합니다.
//!
//! # 모듈 구성
//!
//! - [`workflow`]: 워크플로 빌더와 공유 스텝 연결
//! - [`vm`]: VM 수명주기 변경 API (reboot, resume, resize, derive 등)
//! - [`instance`]: 안정/프리뷰 인스턴스 스키마 capability
//! - [`network`]: 네트워크/서브네트워크 정의와 region 유도
//! - [`quota`]: 쿼터 요청 병합
//! - [`graph`]: 스텝/의존성 저장소, 위상 정렬
//! - [`step`]: 스텝 어휘와 게스트 신호 키
//! - [`document`]: 엔진 문서 렌더링
//! - [`error`]: 도메인 에러

pub mod document;
pub mod error;
pub mod graph;
pub mod instance;
pub mod network;
pub mod quota;
pub mod step;
pub mod vm;
pub mod workflow;

pub use document::WorkflowDocument;
pub use error::GraphError;
pub use graph::StepGraph;
pub use instance::{DiskKind, InstanceApi, InstanceSpec};
pub use network::{Network, Subnetwork, region_from_zone};
pub use quota::{QuotaRequest, QuotaSet, merge_quota_requests};
pub use step::{DiskSpec, Step, StepKind};
pub use vm::{Vm, VmHandle};
pub use workflow::{InstanceOverrides, Workflow};
