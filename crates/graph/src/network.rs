//! 네트워크 모델 -- 네트워크/서브네트워크 정의와 zone/region 해석
//!
//! 네트워크와 서브네트워크는 워크플로마다 공유 스텝(`create-networks`,
//! `create-sub-networks`)에 모이며, 인스턴스 생성 스텝은 호출 순서와 관계없이
//! 두 스텝에 의존합니다. 의존성 연결은 [`Workflow`](crate::workflow::Workflow)가
//! 담당합니다.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// zone 문자열에서 region을 유도합니다.
///
/// `us-central1-a` -> `us-central1`. 마지막 `-` 구분자가 없거나
/// 양쪽이 비어 있으면 에러를 반환합니다.
pub fn region_from_zone(zone: &str) -> Result<String, GraphError> {
    let (region, suffix) = zone.rsplit_once('-').ok_or_else(|| GraphError::InvalidZone {
        zone: zone.to_owned(),
        reason: "missing '-' separator".to_owned(),
    })?;
    if region.is_empty() || suffix.is_empty() {
        return Err(GraphError::InvalidZone {
            zone: zone.to_owned(),
            reason: "empty region or zone suffix".to_owned(),
        });
    }
    validate_region(region)?;
    Ok(region.to_owned())
}

/// region 형식을 검증합니다. (`us-central1`처럼 `-`로 구분된 두 부분)
pub fn validate_region(region: &str) -> Result<(), GraphError> {
    match region.split_once('-') {
        Some((area, location)) if !area.is_empty() && !location.is_empty() => Ok(()),
        _ => Err(GraphError::InvalidRegion(region.to_owned())),
    }
}

/// 네트워크 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// 네트워크 이름
    pub name: String,
    /// 자동 서브넷 모드 여부 (false면 커스텀 서브넷 모드)
    pub auto_create_subnetworks: bool,
    /// MTU (미지정 시 엔진 기본값)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

impl Network {
    /// 새 네트워크 정의를 생성합니다.
    pub fn new(name: impl Into<String>, auto_create_subnetworks: bool) -> Self {
        Self {
            name: name.into(),
            auto_create_subnetworks,
            mtu: None,
        }
    }

    /// MTU를 설정합니다.
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }
}

/// 서브네트워크 보조 IP 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryRange {
    /// 범위 이름
    pub range_name: String,
    /// CIDR
    pub ip_cidr_range: String,
}

/// 서브네트워크 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnetwork {
    /// 서브네트워크 이름
    pub name: String,
    /// 소속 네트워크 이름
    pub network: String,
    /// 기본 CIDR
    pub ip_cidr_range: String,
    /// 리전 (비어 있으면 워크플로 zone에서 유도)
    pub region: String,
    /// 보조 IP 범위
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_ip_ranges: Vec<SecondaryRange>,
}

impl Subnetwork {
    /// 새 서브네트워크 정의를 생성합니다. region은 워크플로 zone에서 유도됩니다.
    pub fn new(
        name: impl Into<String>,
        network: impl Into<String>,
        ip_cidr_range: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            network: network.into(),
            ip_cidr_range: ip_cidr_range.into(),
            region: String::new(),
            secondary_ip_ranges: Vec::new(),
        }
    }

    /// region을 명시합니다.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// 보조 IP 범위를 추가합니다.
    pub fn with_secondary_range(
        mut self,
        range_name: impl Into<String>,
        ip_cidr_range: impl Into<String>,
    ) -> Self {
        self.secondary_ip_ranges.push(SecondaryRange {
            range_name: range_name.into(),
            ip_cidr_range: ip_cidr_range.into(),
        });
        self
    }
}
