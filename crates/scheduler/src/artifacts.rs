//! 아티팩트 스토리지 -- 테스트 로그 조회와 로컬 미러링
//!
//! 워크플로의 테스트 로그는 `{prefix}/{run_id}/{workflow}/outputs/` 아래의
//! `*.txt` 객체입니다. 미러링은 `sources` 경로 세그먼트를 가진 객체를 건너뛰며,
//! 개별 객체 실패는 기록만 하고 나머지를 계속 처리합니다.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;

/// 미러링에서 제외되는 경로 세그먼트
pub const RESERVED_SOURCES_SEGMENT: &str = "sources";

/// 테스트 로그 확장자
pub const LOG_EXTENSION: &str = ".txt";

/// 아티팩트 저장소
///
/// 경로는 `/`로 구분된 객체 키입니다.
pub trait ArtifactStore: Send + Sync + 'static {
    /// 접두사 아래의 모든 객체 키를 사전순으로 반환합니다.
    fn list(&self, prefix: &str)
    -> impl Future<Output = Result<Vec<String>, SchedulerError>> + Send;

    /// 객체 하나를 읽습니다.
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Bytes, SchedulerError>> + Send;
}

/// `/`로 객체 키를 연결합니다. 빈 조각은 건너뜁니다.
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 워크플로 출력 로그 접두사 (`{prefix}/{run_id}/{workflow}/outputs/`)
pub fn outputs_prefix(prefix: &str, run_id: &str, workflow: &str) -> String {
    format!("{}/", join_key(&[prefix, run_id, workflow, "outputs"]))
}

/// 디렉토리에 루트를 둔 로컬 저장소 (마운트된 버킷 등)
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 객체 키를 루트 아래의 경로로 변환합니다. 루트를 벗어나는 키는 거부합니다.
    fn resolve(&self, key: &str) -> Result<PathBuf, SchedulerError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SchedulerError::Fetch {
                path: key.to_owned(),
                reason: "key escapes the store root".to_owned(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ArtifactStore for LocalArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SchedulerError> {
        let list_err = |reason: String| SchedulerError::List {
            prefix: prefix.to_owned(),
            reason,
        };
        // 접두사의 디렉토리 부분부터 탐색한 뒤 문자열 접두사로 거른다
        let dir_key = match prefix.rfind('/') {
            Some(pos) => &prefix[..pos],
            None => "",
        };
        let start = self
            .resolve(dir_key)
            .map_err(|e| list_err(e.to_string()))?;

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(list_err(format!("{}: {e}", dir.display()))),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| list_err(e.to_string()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| list_err(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix.trim_start_matches('/')) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        debug!(prefix = %prefix, objects = keys.len(), "artifacts listed");
        Ok(keys)
    }

    async fn fetch(&self, path: &str) -> Result<Bytes, SchedulerError> {
        let file = self.resolve(path)?;
        tokio::fs::read(&file)
            .await
            .map(Bytes::from)
            .map_err(|e| SchedulerError::Fetch {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// 예약된 `sources` 세그먼트를 포함하는지 확인합니다.
pub fn is_reserved_path(key: &str) -> bool {
    key.split('/').any(|segment| segment == RESERVED_SOURCES_SEGMENT)
}

/// 미러링 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// 로컬로 복사한 객체 수
    pub copied: usize,
    /// 예약 경로라서 건너뛴 객체 수
    pub skipped: usize,
    /// 읽기나 쓰기에 실패한 객체 수
    pub failed: usize,
}

/// 접두사 아래의 객체를 로컬 디렉토리로 복사합니다.
///
/// 목록 조회 실패만 에러로 반환하고, 개별 객체 실패는 `failed`로 집계합니다.
pub async fn mirror_artifacts<S: ArtifactStore>(
    store: &S,
    prefix: &str,
    destination: &Path,
) -> Result<MirrorReport, SchedulerError> {
    let keys = store.list(prefix).await?;
    let base = prefix.trim_matches('/');
    let mut report = MirrorReport::default();

    for key in keys {
        if is_reserved_path(&key) {
            debug!(key = %key, "skipping reserved artifact");
            report.skipped += 1;
            continue;
        }
        let relative = key
            .strip_prefix(base)
            .unwrap_or(&key)
            .trim_start_matches('/');
        match copy_one(store, &key, &destination.join(relative)).await {
            Ok(()) => report.copied += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to mirror artifact");
                report.failed += 1;
            }
        }
    }

    info!(
        prefix = %prefix,
        destination = %destination.display(),
        copied = report.copied,
        skipped = report.skipped,
        failed = report.failed,
        "artifacts mirrored"
    );
    Ok(report)
}

async fn copy_one<S: ArtifactStore>(
    store: &S,
    key: &str,
    target: &Path,
) -> Result<(), SchedulerError> {
    let data = store.fetch(key).await?;
    let write_err = |e: std::io::Error| SchedulerError::Fetch {
        path: key.to_owned(),
        reason: format!("write {}: {e}", target.display()),
    };
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(target, &data).await.map_err(write_err)
}

/// 한 워크플로에서 수집한 테스트 로그
#[derive(Debug, Clone, Default)]
pub struct WorkflowLogs {
    /// 읽은 로그 본문 (키 순서)
    pub logs: Vec<String>,
    /// 읽지 못한 로그 수
    pub failed: usize,
}

/// 워크플로 출력 디렉토리의 `*.txt` 로그를 모두 읽습니다.
pub async fn collect_workflow_logs<S: ArtifactStore>(
    store: &S,
    prefix: &str,
    run_id: &str,
    workflow: &str,
) -> Result<WorkflowLogs, SchedulerError> {
    let outputs = outputs_prefix(prefix, run_id, workflow);
    let keys = store.list(&outputs).await?;
    let mut collected = WorkflowLogs::default();
    for key in keys.iter().filter(|k| k.ends_with(LOG_EXTENSION)) {
        match store.fetch(key).await {
            Ok(data) => collected
                .logs
                .push(String::from_utf8_lossy(&data).into_owned()),
            Err(e) => {
                warn!(workflow = %workflow, key = %key, error = %e, "failed to read test log");
                collected.failed += 1;
            }
        }
    }
    debug!(
        workflow = %workflow,
        logs = collected.logs.len(),
        failed = collected.failed,
        "test logs collected"
    );
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 지정한 키의 읽기만 실패시키는 저장소
    struct FlakyStore {
        inner: LocalArtifactStore,
        broken: Vec<String>,
    }

    impl ArtifactStore for FlakyStore {
        async fn list(&self, prefix: &str) -> Result<Vec<String>, SchedulerError> {
            self.inner.list(prefix).await
        }

        async fn fetch(&self, path: &str) -> Result<Bytes, SchedulerError> {
            if self.broken.iter().any(|k| k == path) {
                return Err(SchedulerError::Fetch {
                    path: path.to_owned(),
                    reason: "connection reset".to_owned(),
                });
            }
            self.inner.fetch(path).await
        }
    }

    fn flaky(root: &Path, broken: &[&str]) -> FlakyStore {
        FlakyStore {
            inner: LocalArtifactStore::new(root),
            broken: broken.iter().map(|k| (*k).to_owned()).collect(),
        }
    }

    fn write(root: &Path, key: &str, body: &str) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn join_key_trims_slashes_and_empty_parts() {
        assert_eq!(join_key(&["", "run", "/wf/", "outputs"]), "run/wf/outputs");
        assert_eq!(outputs_prefix("bucket/p/", "r1", "wf"), "bucket/p/r1/wf/outputs/");
        assert_eq!(outputs_prefix("", "r1", "wf"), "r1/wf/outputs/");
    }

    #[test]
    fn reserved_segment_detection() {
        assert!(is_reserved_path("r1/wf/sources/bin.tar"));
        assert!(!is_reserved_path("r1/wf/outputs/resources.txt"));
    }

    #[tokio::test]
    async fn list_returns_sorted_keys_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "r1/wf/outputs/b.txt", "b");
        write(dir.path(), "r1/wf/outputs/a.txt", "a");
        write(dir.path(), "r1/other/outputs/c.txt", "c");
        let store = LocalArtifactStore::new(dir.path());

        let keys = store.list("r1/wf/outputs/").await.unwrap();
        assert_eq!(keys, ["r1/wf/outputs/a.txt", "r1/wf/outputs/b.txt"]);
        assert!(store.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let err = store.fetch("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Fetch { .. }));
    }

    #[tokio::test]
    async fn mirror_skips_sources_and_counts() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "r1/wf/outputs/hostname.txt", "log");
        write(src.path(), "r1/wf/sources/startup.sh", "#!/bin/sh");
        write(src.path(), "r1/wf/logs/daisy.log", "x");
        let store = LocalArtifactStore::new(src.path());

        let report = mirror_artifacts(&store, "r1/", dst.path()).await.unwrap();
        assert_eq!(
            report,
            MirrorReport {
                copied: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert!(dst.path().join("wf/outputs/hostname.txt").exists());
        assert!(!dst.path().join("wf/sources").exists());
    }

    #[tokio::test]
    async fn collect_reads_only_text_logs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pre/r1/wf/outputs/amd64.txt", "=== RUN   TestA\n");
        write(dir.path(), "pre/r1/wf/outputs/arm64.txt", "=== RUN   TestB\n");
        write(dir.path(), "pre/r1/wf/outputs/junit.xml", "<xml/>");
        let store = LocalArtifactStore::new(dir.path());

        let logs = collect_workflow_logs(&store, "pre", "r1", "wf").await.unwrap();
        assert_eq!(logs.logs.len(), 2);
        assert_eq!(logs.failed, 0);
        assert!(logs.logs[0].contains("TestA"));
    }

    #[tokio::test]
    async fn mirror_continues_past_failed_object() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "r1/wf/outputs/amd64.txt", "a");
        write(src.path(), "r1/wf/outputs/arm64.txt", "b");
        write(src.path(), "r1/wf/outputs/serial.log", "c");
        let store = flaky(src.path(), &["r1/wf/outputs/arm64.txt"]);

        let report = mirror_artifacts(&store, "r1/", dst.path()).await.unwrap();
        assert_eq!(
            report,
            MirrorReport {
                copied: 2,
                skipped: 0,
                failed: 1
            }
        );
        assert!(dst.path().join("wf/outputs/amd64.txt").exists());
        assert!(dst.path().join("wf/outputs/serial.log").exists());
        assert!(!dst.path().join("wf/outputs/arm64.txt").exists());
    }

    #[tokio::test]
    async fn collect_counts_unreadable_logs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pre/r1/wf/outputs/amd64.txt", "=== RUN   TestA\n");
        write(dir.path(), "pre/r1/wf/outputs/arm64.txt", "=== RUN   TestB\n");
        let store = flaky(dir.path(), &["pre/r1/wf/outputs/amd64.txt"]);

        let logs = collect_workflow_logs(&store, "pre", "r1", "wf").await.unwrap();
        assert_eq!(logs.failed, 1);
        assert_eq!(logs.logs.len(), 1);
        assert!(logs.logs[0].contains("TestB"));
    }
}
