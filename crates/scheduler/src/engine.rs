//! 외부 워크플로 엔진 -- 렌더링된 워크플로 문서를 실행
//!
//! [`WorkflowEngine`] 트레이트 뒤에 엔진 호출을 격리하여 테스트에서는 mock으로
//! 대체합니다. 스텝별 타임아웃은 엔진이 강제하며, 스케줄러는 엔진 호출을
//! 하나의 블로킹 작업으로 취급합니다.
//!
//! # 구현체
//! - [`CommandEngine`]: 문서를 작업 디렉토리에 기록하고 실행 파일을 호출
//! - `MockEngine`: 테스트 전용 (tests 모듈)

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use imagetest_core::config::EngineConfig;
use imagetest_graph::WorkflowDocument;

use crate::error::EngineError;

/// stderr에서 보존할 최대 바이트 수
const STDERR_TAIL_BYTES: usize = 4096;

/// 엔진 인자에서 치환되는 자리표시자
pub const PLACEHOLDER_FILE: &str = "{file}";
pub const PLACEHOLDER_WORKFLOW: &str = "{workflow}";
pub const PLACEHOLDER_RUN_ID: &str = "{run_id}";

/// 워크플로 실행 엔진
///
/// `Send + Sync + 'static`이므로 `Arc`로 감싸 여러 실행 태스크가 공유합니다.
pub trait WorkflowEngine: Send + Sync + 'static {
    /// 워크플로 하나를 끝까지 실행합니다.
    fn run(
        &self,
        document: &WorkflowDocument,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// 실행 파일 기반 엔진
///
/// 인자에 `{file}`이 없으면 문서 경로가 마지막 인자로 붙습니다.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    run_id: String,
}

impl CommandEngine {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        work_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            run_id: run_id.into(),
        }
    }

    /// 엔진 설정에서 생성합니다.
    pub fn from_config(config: &EngineConfig, run_id: &str) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            &config.work_dir,
            run_id,
        )
    }

    /// 워크플로 문서 파일 경로
    pub fn document_path(&self, workflow: &str) -> PathBuf {
        self.work_dir.join(format!("{workflow}.json"))
    }

    /// 자리표시자를 치환한 실제 인자 목록
    pub fn command_args(&self, workflow: &str, file: &Path) -> Vec<String> {
        let file = file.display().to_string();
        let mut has_file = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                has_file |= arg.contains(PLACEHOLDER_FILE);
                arg.replace(PLACEHOLDER_FILE, &file)
                    .replace(PLACEHOLDER_WORKFLOW, workflow)
                    .replace(PLACEHOLDER_RUN_ID, &self.run_id)
            })
            .collect();
        if !has_file {
            args.push(file);
        }
        args
    }

    async fn write_document(&self, document: &WorkflowDocument) -> Result<PathBuf, EngineError> {
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source| EngineError::Io { path, source }
        };
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(io_err(&self.work_dir))?;
        let path = self.document_path(&document.name);
        let json = document
            .to_json_pretty()
            .map_err(|e| EngineError::Document(e.to_string()))?;
        tokio::fs::write(&path, json).await.map_err(io_err(&path))?;
        Ok(path)
    }
}

/// 바이트 열의 마지막 `max` 바이트를 UTF-8 문자열로 반환합니다.
fn tail(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).trim().to_owned()
}

impl WorkflowEngine for CommandEngine {
    async fn run(&self, document: &WorkflowDocument) -> Result<(), EngineError> {
        let path = self.write_document(document).await?;
        let args = self.command_args(&document.name, &path);
        debug!(
            workflow = %document.name,
            program = %self.program,
            args = ?args,
            "spawning engine"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            info!(workflow = %document.name, "engine finished");
            Ok(())
        } else {
            let stderr = tail(&output.stderr, STDERR_TAIL_BYTES);
            warn!(
                workflow = %document.name,
                code = ?output.status.code(),
                "engine failed"
            );
            Err(EngineError::Exited {
                code: output.status.code(),
                stderr,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    /// 테스트용 mock 엔진
    ///
    /// 호출 시각을 기록하고, 지정된 시간만큼 대기한 뒤 설정된 결과를 반환합니다.
    #[derive(Default)]
    pub(crate) struct MockEngine {
        pub(crate) duration: Duration,
        pub(crate) failing: Vec<String>,
        pub(crate) launches: Mutex<Vec<(String, Instant)>>,
        pub(crate) running: Mutex<usize>,
        pub(crate) max_running: Mutex<usize>,
    }

    impl MockEngine {
        pub(crate) fn new(duration: Duration) -> Self {
            Self {
                duration,
                ..Self::default()
            }
        }

        pub(crate) fn failing_on(mut self, workflow: &str) -> Self {
            self.failing.push(workflow.to_owned());
            self
        }

        pub(crate) fn launches(&self) -> Vec<(String, Instant)> {
            self.launches.lock().unwrap().clone()
        }

        pub(crate) fn max_running(&self) -> usize {
            *self.max_running.lock().unwrap()
        }
    }

    impl WorkflowEngine for MockEngine {
        async fn run(&self, document: &WorkflowDocument) -> Result<(), EngineError> {
            self.launches
                .lock()
                .unwrap()
                .push((document.name.clone(), Instant::now()));
            {
                let mut running = self.running.lock().unwrap();
                *running += 1;
                let mut max = self.max_running.lock().unwrap();
                *max = (*max).max(*running);
            }
            tokio::time::sleep(self.duration).await;
            *self.running.lock().unwrap() -= 1;

            if self.failing.contains(&document.name) {
                return Err(EngineError::Exited {
                    code: Some(1),
                    stderr: "mock failure".to_owned(),
                });
            }
            Ok(())
        }
    }

    fn document(name: &str) -> WorkflowDocument {
        WorkflowDocument {
            name: name.to_owned(),
            project: "p".to_owned(),
            zone: "us-central1-a".to_owned(),
            default_timeout: "2700s".to_owned(),
            steps: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    #[test]
    fn args_substitute_placeholders() {
        let engine = CommandEngine::new(
            "daisy",
            vec![
                "-gcs_path=gs://bucket/{run_id}/{workflow}".to_owned(),
                "{file}".to_owned(),
            ],
            "/tmp/wf",
            "run-1",
        );
        let args = engine.command_args("hostname-debian-12", Path::new("/tmp/wf/h.json"));
        assert_eq!(
            args,
            [
                "-gcs_path=gs://bucket/run-1/hostname-debian-12",
                "/tmp/wf/h.json"
            ]
        );
    }

    #[test]
    fn file_is_appended_without_placeholder() {
        let engine = CommandEngine::new("daisy", vec!["-print_perf".to_owned()], "/w", "r");
        let args = engine.command_args("wf", Path::new("/w/wf.json"));
        assert_eq!(args, ["-print_perf", "/w/wf.json"]);
    }

    #[test]
    fn stderr_tail_keeps_last_bytes() {
        assert_eq!(tail(b"first line\nlast line\n", 10), "last line");
        assert_eq!(tail(b"short", 100), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_engine_writes_document_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new("true", Vec::new(), dir.path(), "run");
        engine.run(&document("wf-ok")).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("wf-ok.json")).unwrap();
        assert!(written.contains(r#""Name": "wf-ok""#));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_engine_maps_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new("false", Vec::new(), dir.path(), "run");
        let err = engine.run(&document("wf-bad")).await.unwrap_err();
        assert!(matches!(err, EngineError::Exited { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn command_engine_reports_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            CommandEngine::new("imagetest-no-such-engine-binary", Vec::new(), dir.path(), "r");
        let err = engine.run(&document("wf")).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
