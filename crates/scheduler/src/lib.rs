//! imagetest 스케줄러
//!
//! 스위트 x 이미지 조합으로 워크플로를 구성하고, 동시 실행 수와 실행 간격을 지키며
//! 외부 엔진으로 실행한 뒤 테스트 로그를 집계합니다.
//!
//! # 모듈 구성
//!
//! - [`context`]: 실행 ID, zone/프로젝트 라운드로빈 배정
//! - [`suite`]: 스위트 레지스트리, 필터, 이미지 해석, 워크플로 구성
//! - [`engine`]: 외부 워크플로 엔진 트레이트와 실행 파일 구현
//! - [`artifacts`]: 아티팩트 저장소, 로그 수집, 로컬 미러링
//! - [`scheduler`]: 제한된 동시 실행과 결과 집계
//! - [`error`]: 도메인 에러

pub mod artifacts;
pub mod context;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod suite;

pub use artifacts::{ArtifactStore, LocalArtifactStore, MirrorReport, mirror_artifacts};
pub use context::{RoundRobin, RunContext};
pub use engine::{CommandEngine, WorkflowEngine};
pub use error::{EngineError, SchedulerError};
pub use scheduler::{RunMode, RunOutcome, ScheduleOptions, Scheduler, render_documents};
pub use suite::{ImageRef, SuiteFilter, SuiteRegistry, TestSuite, build_workflows, resolve_image};
