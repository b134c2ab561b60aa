//! 인스턴스 스펙 -- 안정/프리뷰 스키마를 하나의 capability 트레이트로 추상화
//!
//! VM 변경 로직([`VmHandle`](crate::vm::VmHandle))은 [`InstanceSpec`] 트레이트만
//! 사용하므로 한 번만 작성됩니다. 두 구현체는 생성 시점에 [`InstanceApi`]로
//! 선택되며, 엔진 문서에 렌더링되는 필드 이름만 다릅니다.
//!
//! | API | 구현체 | shielded boot 필드 |
//! |-----|--------|-------------------|
//! | `Stable` | [`StableInstance`] | `shieldedInstanceConfig` |
//! | `Preview` | [`PreviewInstance`] | `shieldedVmConfig` |

use std::fmt;

use serde::{Deserialize, Serialize};

/// 인스턴스 스키마 선택
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceApi {
    /// 안정 API 스키마
    #[default]
    Stable,
    /// 프리뷰(베타) API 스키마
    Preview,
}

impl fmt::Display for InstanceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// 디스크 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskKind {
    /// 영구 디스크 (`create-disks` 스텝에서 생성)
    #[default]
    Persistent,
    /// 로컬 스크래치 디스크 (인스턴스와 함께 생성)
    Scratch,
}

/// 디스크 인터페이스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskInterface {
    /// SCSI
    Scsi,
    /// NVMe
    Nvme,
}

/// 인스턴스에 연결된 디스크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    /// 디스크 이름 (영구 디스크는 `create-disks`의 항목 이름)
    pub source: String,
    /// 부트 디스크 여부
    pub boot: bool,
    /// 디스크 종류
    #[serde(rename = "type")]
    pub kind: DiskKind,
    /// 인터페이스 (미지정 시 엔진 기본값)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<DiskInterface>,
    /// 인스턴스 삭제 시 함께 삭제
    pub auto_delete: bool,
}

impl AttachedDisk {
    /// 부트 디스크
    pub fn boot(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            boot: true,
            kind: DiskKind::Persistent,
            interface: None,
            auto_delete: true,
        }
    }

    /// 부트가 아닌 디스크
    pub fn secondary(source: impl Into<String>, kind: DiskKind) -> Self {
        Self {
            source: source.into(),
            boot: false,
            kind,
            interface: None,
            auto_delete: true,
        }
    }

    /// 인터페이스를 지정합니다.
    pub fn with_interface(mut self, interface: DiskInterface) -> Self {
        self.interface = Some(interface);
        self
    }
}

/// 별칭 IP 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasIpRange {
    /// CIDR
    pub ip_cidr_range: String,
    /// 서브네트워크 보조 범위 이름
    pub subnetwork_range_name: String,
}

/// 네트워크 인터페이스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// 네트워크 이름
    pub network: String,
    /// 서브네트워크 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    /// 별칭 IP 범위
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alias_ip_ranges: Vec<AliasIpRange>,
    /// NIC 타입 (예: `GVNIC`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic_type: Option<String>,
}

impl NetworkInterface {
    /// 새 인터페이스를 생성합니다.
    pub fn new(network: impl Into<String>, subnetwork: Option<String>) -> Self {
        Self {
            network: network.into(),
            subnetwork,
            alias_ip_ranges: Vec::new(),
            nic_type: None,
        }
    }
}

/// 메타데이터 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    /// 키
    pub key: String,
    /// 값
    pub value: String,
}

/// 삽입 순서를 유지하는 메타데이터 맵 (마지막 쓰기 우선)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// 항목 목록
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    /// 키가 있으면 값을 교체하고, 없으면 끝에 추가합니다.
    pub fn upsert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.items.iter_mut().find(|item| item.key == key) {
            Some(item) => item.value = value,
            None => self.items.push(MetadataItem { key, value }),
        }
    }

    /// 키로 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

/// 스케줄링 옵션
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    /// 호스트 유지보수 시 동작 (`MIGRATE` / `TERMINATE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_host_maintenance: Option<String>,
}

/// 인스턴스 capability 트레이트
///
/// VM 변경 로직이 필요로 하는 최소한의 필드 접근만 노출합니다.
/// 구현체는 자신의 스키마로 엔진 문서 페이로드를 렌더링합니다.
pub trait InstanceSpec: fmt::Debug + Send + Sync {
    /// 스키마 종류
    fn api(&self) -> InstanceApi;

    /// 인스턴스 이름
    fn name(&self) -> &str;

    /// 인스턴스 이름 변경 (파생 VM 생성용)
    fn set_name(&mut self, name: &str);

    /// 메타데이터
    fn metadata(&self) -> &Metadata;

    /// 메타데이터 (가변)
    fn metadata_mut(&mut self) -> &mut Metadata;

    /// 연결된 디스크 (부트 디스크가 인덱스 0)
    fn disks(&self) -> &[AttachedDisk];

    /// 연결된 디스크 (가변)
    fn disks_mut(&mut self) -> &mut Vec<AttachedDisk>;

    /// 네트워크 인터페이스
    fn network_interfaces(&self) -> &[NetworkInterface];

    /// 네트워크 인터페이스 (가변)
    fn network_interfaces_mut(&mut self) -> &mut Vec<NetworkInterface>;

    /// 머신 타입
    fn machine_type(&self) -> Option<&str>;

    /// 머신 타입 설정
    fn set_machine_type(&mut self, machine_type: &str);

    /// zone
    fn zone(&self) -> Option<&str>;

    /// zone 설정
    fn set_zone(&mut self, zone: &str);

    /// secure boot 활성화 여부
    fn secure_boot(&self) -> bool;

    /// secure boot 설정
    fn set_secure_boot(&mut self, enabled: bool);

    /// 호스트 유지보수 동작 설정
    fn set_on_host_maintenance(&mut self, policy: &str);

    /// 엔진 문서 페이로드로 렌더링합니다.
    fn to_document(&self) -> serde_json::Value;

    /// 박싱된 복제본
    fn clone_box(&self) -> Box<dyn InstanceSpec>;
}

impl Clone for Box<dyn InstanceSpec> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// 스키마에 맞는 빈 인스턴스 스펙을 생성합니다.
pub fn new_instance(api: InstanceApi, name: &str) -> Box<dyn InstanceSpec> {
    match api {
        InstanceApi::Stable => Box::new(StableInstance::new(name)),
        InstanceApi::Preview => Box::new(PreviewInstance::new(name)),
    }
}

/// 안정 API shielded boot 설정
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldedInstanceConfig {
    /// secure boot
    pub enable_secure_boot: bool,
}

/// 안정 API 인스턴스 스키마
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableInstance {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<String>,
    disks: Vec<AttachedDisk>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    network_interfaces: Vec<NetworkInterface>,
    metadata: Metadata,
    scheduling: Scheduling,
    #[serde(skip_serializing_if = "Option::is_none")]
    shielded_instance_config: Option<ShieldedInstanceConfig>,
}

impl StableInstance {
    /// 새 인스턴스 스펙을 생성합니다.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

impl InstanceSpec for StableInstance {
    fn api(&self) -> InstanceApi {
        InstanceApi::Stable
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn disks(&self) -> &[AttachedDisk] {
        &self.disks
    }

    fn disks_mut(&mut self) -> &mut Vec<AttachedDisk> {
        &mut self.disks
    }

    fn network_interfaces(&self) -> &[NetworkInterface] {
        &self.network_interfaces
    }

    fn network_interfaces_mut(&mut self) -> &mut Vec<NetworkInterface> {
        &mut self.network_interfaces
    }

    fn machine_type(&self) -> Option<&str> {
        self.machine_type.as_deref()
    }

    fn set_machine_type(&mut self, machine_type: &str) {
        self.machine_type = Some(machine_type.to_owned());
    }

    fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    fn set_zone(&mut self, zone: &str) {
        self.zone = Some(zone.to_owned());
    }

    fn secure_boot(&self) -> bool {
        self.shielded_instance_config
            .as_ref()
            .is_some_and(|c| c.enable_secure_boot)
    }

    fn set_secure_boot(&mut self, enabled: bool) {
        self.shielded_instance_config = Some(ShieldedInstanceConfig {
            enable_secure_boot: enabled,
        });
    }

    fn set_on_host_maintenance(&mut self, policy: &str) {
        self.scheduling.on_host_maintenance = Some(policy.to_owned());
    }

    fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn clone_box(&self) -> Box<dyn InstanceSpec> {
        Box::new(self.clone())
    }
}

/// 프리뷰 API shielded boot 설정
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldedVmConfig {
    /// secure boot
    pub enable_secure_boot: bool,
}

/// 프리뷰 API 인스턴스 스키마
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInstance {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<String>,
    disks: Vec<AttachedDisk>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    network_interfaces: Vec<NetworkInterface>,
    metadata: Metadata,
    scheduling: Scheduling,
    #[serde(skip_serializing_if = "Option::is_none")]
    shielded_vm_config: Option<ShieldedVmConfig>,
}

impl PreviewInstance {
    /// 새 인스턴스 스펙을 생성합니다.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

impl InstanceSpec for PreviewInstance {
    fn api(&self) -> InstanceApi {
        InstanceApi::Preview
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn disks(&self) -> &[AttachedDisk] {
        &self.disks
    }

    fn disks_mut(&mut self) -> &mut Vec<AttachedDisk> {
        &mut self.disks
    }

    fn network_interfaces(&self) -> &[NetworkInterface] {
        &self.network_interfaces
    }

    fn network_interfaces_mut(&mut self) -> &mut Vec<NetworkInterface> {
        &mut self.network_interfaces
    }

    fn machine_type(&self) -> Option<&str> {
        self.machine_type.as_deref()
    }

    fn set_machine_type(&mut self, machine_type: &str) {
        self.machine_type = Some(machine_type.to_owned());
    }

    fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    fn set_zone(&mut self, zone: &str) {
        self.zone = Some(zone.to_owned());
    }

    fn secure_boot(&self) -> bool {
        self.shielded_vm_config
            .as_ref()
            .is_some_and(|c| c.enable_secure_boot)
    }

    fn set_secure_boot(&mut self, enabled: bool) {
        self.shielded_vm_config = Some(ShieldedVmConfig {
            enable_secure_boot: enabled,
        });
    }

    fn set_on_host_maintenance(&mut self, policy: &str) {
        self.scheduling.on_host_maintenance = Some(policy.to_owned());
    }

    fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn clone_box(&self) -> Box<dyn InstanceSpec> {
        Box::new(self.clone())
    }
}
