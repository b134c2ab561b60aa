//! 스텝 어휘 -- 워크플로 그래프의 노드 타입
//!
//! 각 [`Step`]은 워크플로 내에서 고유한 이름과 삽입 시점의 카운터 값을 가지며,
//! [`StepKind`]가 외부 실행 엔진이 이해하는 작업 종류와 페이로드를 표현합니다.
//!
//! # 게스트 신호
//!
//! 대기 스텝은 VM 내부 에이전트가 기록하는 게스트 속성(namespace/key)을 기다립니다.
//! 기본 완료 키는 [`DEFAULT_RESULT_KEY`]이고, 테스트 도중 재부팅하도록 표시된 VM은
//! 첫 재부팅 직전의 대기에만 [`FIRST_BOOT_RESULT_KEY`]를 사용합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::{Network, Subnetwork};
use crate::quota::QuotaSet;

/// 게스트 신호 namespace
pub const GUEST_SIGNAL_NAMESPACE: &str = "testing";

/// 기본 완료 키
pub const DEFAULT_RESULT_KEY: &str = "result";

/// 재부팅 이전(첫 부팅) 완료 키
pub const FIRST_BOOT_RESULT_KEY: &str = "first-boot-result";

/// 쿼터 대기 공유 스텝 이름
pub const WAIT_FOR_QUOTA_STEP: &str = "wait-for-quota";
/// 네트워크 생성 공유 스텝 이름
pub const CREATE_NETWORKS_STEP: &str = "create-networks";
/// 서브네트워크 생성 공유 스텝 이름
pub const CREATE_SUBNETWORKS_STEP: &str = "create-sub-networks";
/// 디스크 생성 공유 스텝 이름
pub const CREATE_DISKS_STEP: &str = "create-disks";
/// 인스턴스 생성 공유 스텝 이름
pub const CREATE_VMS_STEP: &str = "create-vms";

/// VM별 스텝 이름을 생성합니다. (`{kind}-{vm}-{counter}`)
pub fn vm_step_name(kind: &str, vm: &str, counter: u32) -> String {
    format!("{kind}-{vm}-{counter}")
}

/// VM의 최초 완료 대기 스텝 이름 (`wait-{vm}`)
pub fn initial_wait_name(vm: &str) -> String {
    format!("wait-{vm}")
}

/// 인스턴스 상태 (상태 기반 대기용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// 실행 중
    Running,
    /// 일시 중단됨
    Suspended,
    /// 정지됨
    Terminated,
}

/// 대기 조건
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitMode {
    /// 게스트 속성 기록 대기
    GuestAttribute {
        /// 속성 namespace
        namespace: String,
        /// 속성 키
        key: String,
    },
    /// 인스턴스 상태 전이 대기
    Status(InstanceStatus),
}

/// 단일 인스턴스 대기 신호
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSignal {
    /// 대상 인스턴스 이름
    pub instance: String,
    /// 대기 조건
    pub mode: WaitMode,
}

impl WaitSignal {
    /// 게스트 속성 대기 신호를 생성합니다.
    pub fn guest_attribute(instance: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            mode: WaitMode::GuestAttribute {
                namespace: GUEST_SIGNAL_NAMESPACE.to_owned(),
                key: key.into(),
            },
        }
    }

    /// 상태 전이 대기 신호를 생성합니다.
    pub fn status(instance: impl Into<String>, status: InstanceStatus) -> Self {
        Self {
            instance: instance.into(),
            mode: WaitMode::Status(status),
        }
    }

    /// 게스트 속성 대기라면 키를 반환합니다.
    pub fn guest_key(&self) -> Option<&str> {
        match &self.mode {
            WaitMode::GuestAttribute { key, .. } => Some(key),
            WaitMode::Status(_) => None,
        }
    }
}

/// 디스크 생성 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    /// 디스크 이름 (워크플로 내 고유)
    pub name: String,
    /// 원본 이미지 (부트 디스크가 아니면 보통 비어 있음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    /// 크기 (GB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<u64>,
    /// 디스크 타입 (예: `pd-balanced`, `hyperdisk-balanced`)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
}

impl DiskSpec {
    /// 이름만 지정한 디스크 요청을 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_image: None,
            size_gb: None,
            disk_type: None,
        }
    }

    /// 원본 이미지를 지정합니다.
    pub fn with_source_image(mut self, image: impl Into<String>) -> Self {
        self.source_image = Some(image.into());
        self
    }

    /// 크기를 지정합니다.
    pub fn with_size_gb(mut self, size_gb: u64) -> Self {
        self.size_gb = Some(size_gb);
        self
    }

    /// 디스크 타입을 지정합니다.
    pub fn with_type(mut self, disk_type: impl Into<String>) -> Self {
        self.disk_type = Some(disk_type.into());
        self
    }
}

/// 디스크 크기 변경 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskResize {
    /// 디스크 이름
    pub name: String,
    /// 새 크기 (GB)
    pub size_gb: u64,
}

/// 디스크 분리 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskDetach {
    /// 인스턴스 이름
    pub instance: String,
    /// 분리할 디스크 이름
    pub device_name: String,
}

/// 스텝 종류와 페이로드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// 쿼터 확보 대기
    WaitForAvailableQuota(QuotaSet),
    /// 네트워크 생성
    CreateNetworks(Vec<Network>),
    /// 서브네트워크 생성
    CreateSubnetworks(Vec<Subnetwork>),
    /// 디스크 생성
    CreateDisks(Vec<DiskSpec>),
    /// 인스턴스 생성 (VM 이름 목록, 페이로드는 렌더링 시 VM 스펙에서 생성)
    CreateInstances(Vec<String>),
    /// 인스턴스 신호 대기
    WaitForInstancesSignal(Vec<WaitSignal>),
    /// 인스턴스 정지
    StopInstances(Vec<String>),
    /// 인스턴스 시작
    StartInstances(Vec<String>),
    /// 인스턴스 재개
    ResumeInstances(Vec<String>),
    /// 디스크 크기 변경
    ResizeDisks(Vec<DiskResize>),
    /// 디스크 분리
    DetachDisks(Vec<DiskDetach>),
}

impl StepKind {
    /// 엔진 문서에서 사용하는 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::WaitForAvailableQuota(_) => "WaitForAvailableQuota",
            Self::CreateNetworks(_) => "CreateNetworks",
            Self::CreateSubnetworks(_) => "CreateSubnetworks",
            Self::CreateDisks(_) => "CreateDisks",
            Self::CreateInstances(_) => "CreateInstances",
            Self::WaitForInstancesSignal(_) => "WaitForInstancesSignal",
            Self::StopInstances(_) => "StopInstances",
            Self::StartInstances(_) => "StartInstances",
            Self::ResumeInstances(_) => "ResumeInstances",
            Self::ResizeDisks(_) => "ResizeDisks",
            Self::DetachDisks(_) => "DetachDisks",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitForAvailableQuota(_) => "wait-for-available-quota",
            Self::CreateNetworks(_) => "create-networks",
            Self::CreateSubnetworks(_) => "create-subnetwork",
            Self::CreateDisks(_) => "create-disks",
            Self::CreateInstances(_) => "create-instances",
            Self::WaitForInstancesSignal(_) => "wait-for-instances-signal",
            Self::StopInstances(_) => "stop-instances",
            Self::StartInstances(_) => "start-instances",
            Self::ResumeInstances(_) => "resume-instances",
            Self::ResizeDisks(_) => "resize-disks",
            Self::DetachDisks(_) => "detach-disks",
        };
        f.write_str(name)
    }
}

/// 워크플로 그래프의 단일 스텝
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// 워크플로 내 고유 이름
    pub name: String,
    /// 삽입 시점의 워크플로 카운터
    pub counter: u32,
    /// 종류와 페이로드
    pub kind: StepKind,
}

impl Step {
    /// 새 스텝을 생성합니다.
    pub fn new(name: impl Into<String>, counter: u32, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            counter,
            kind,
        }
    }

    /// 지정 VM의 게스트 속성 대기 키를 반환합니다.
    ///
    /// 게스트 속성 대기 스텝이 아니거나 해당 VM 신호가 없으면 `None`입니다.
    pub fn checkpoint_key(&self, vm: &str) -> Option<&str> {
        match &self.kind {
            StepKind::WaitForInstancesSignal(signals) => signals
                .iter()
                .filter(|s| s.instance == vm)
                .find_map(WaitSignal::guest_key),
            _ => None,
        }
    }

    /// 지정 VM의 게스트 속성 대기 키를 교체합니다.
    pub(crate) fn rewrite_checkpoint_key(&mut self, vm: &str, new_key: &str) {
        if let StepKind::WaitForInstancesSignal(signals) = &mut self.kind {
            for signal in signals.iter_mut().filter(|s| s.instance == vm) {
                if let WaitMode::GuestAttribute { key, .. } = &mut signal.mode {
                    new_key.clone_into(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_step_names_follow_kind_vm_counter() {
        assert_eq!(vm_step_name("stop", "vm1", 3), "stop-vm1-3");
        assert_eq!(initial_wait_name("vm1"), "wait-vm1");
    }

    #[test]
    fn checkpoint_key_only_for_guest_attribute_waits() {
        let guest = Step::new(
            "wait-vm1",
            0,
            StepKind::WaitForInstancesSignal(vec![WaitSignal::guest_attribute(
                "vm1",
                DEFAULT_RESULT_KEY,
            )]),
        );
        assert_eq!(guest.checkpoint_key("vm1"), Some(DEFAULT_RESULT_KEY));
        assert_eq!(guest.checkpoint_key("vm2"), None);

        let status = Step::new(
            "wait-suspended-vm1-1",
            1,
            StepKind::WaitForInstancesSignal(vec![WaitSignal::status(
                "vm1",
                InstanceStatus::Suspended,
            )]),
        );
        assert_eq!(status.checkpoint_key("vm1"), None);

        let stop = Step::new("stop-vm1-1", 1, StepKind::StopInstances(vec!["vm1".into()]));
        assert_eq!(stop.checkpoint_key("vm1"), None);
    }

    #[test]
    fn rewrite_changes_only_target_vm() {
        let mut step = Step::new(
            "wait-shared",
            0,
            StepKind::WaitForInstancesSignal(vec![
                WaitSignal::guest_attribute("vm1", DEFAULT_RESULT_KEY),
                WaitSignal::guest_attribute("vm2", DEFAULT_RESULT_KEY),
            ]),
        );
        step.rewrite_checkpoint_key("vm1", FIRST_BOOT_RESULT_KEY);
        assert_eq!(step.checkpoint_key("vm1"), Some(FIRST_BOOT_RESULT_KEY));
        assert_eq!(step.checkpoint_key("vm2"), Some(DEFAULT_RESULT_KEY));
    }

    #[test]
    fn kind_display_uses_vocabulary_names() {
        assert_eq!(StepKind::StopInstances(vec![]).to_string(), "stop-instances");
        assert_eq!(
            StepKind::WaitForAvailableQuota(QuotaSet::new()).to_string(),
            "wait-for-available-quota"
        );
        assert_eq!(StepKind::CreateDisks(vec![]).type_name(), "CreateDisks");
    }

    #[test]
    fn disk_spec_serializes_type_field() {
        let disk = DiskSpec::new("data").with_size_gb(100).with_type("pd-ssd");
        let json = serde_json::to_value(&disk).unwrap();
        assert_eq!(json["type"], "pd-ssd");
        assert_eq!(json["sizeGb"], 100);
        assert!(json.get("sourceImage").is_none());
    }
}
