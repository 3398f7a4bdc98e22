//! Local filesystem result sink

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serverbench_core::{CellRollup, Manifest, Record, ResultSink, SinkError};
use tokio::io::AsyncWriteExt;

/// Per-server rollup file
pub const ROLLUP_FILE: &str = "rollup.json";

/// Run manifest file
pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes one run's artifacts under a timestamped directory
///
/// Directories are created on first write, so a run that never gets past
/// INIT leaves nothing but its manifest behind.
#[derive(Debug, Clone)]
pub struct LocalResultSink {
    run_dir: PathBuf,
}

impl LocalResultSink {
    /// Sink for a run started at `started_at`
    pub fn new(results_root: impl AsRef<Path>, started_at: DateTime<Utc>) -> Self {
        let run_dir = results_root
            .as_ref()
            .join(started_at.format("%Y%m%d-%H%M%S").to_string());
        Self { run_dir }
    }

    /// Directory for one server's files
    pub fn server_dir(&self, server: &str) -> PathBuf {
        self.run_dir.join(dir_name(server))
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        what: &str,
        value: &T,
    ) -> Result<(), SinkError> {
        let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| SinkError::Serialize {
            what: what.to_string(),
            message: e.to_string(),
        })?;
        bytes.push(b'\n');
        write_atomic(path, &bytes).await
    }
}

/// Keep server names from escaping the run directory
fn dir_name(server: &str) -> String {
    let name: String = server
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    match name.as_str() {
        "" | "." | ".." => format!("server{}", name.replace('.', "_")),
        _ => name,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `<path>.tmp`, fsync it, then rename over `path`
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(path, e));
    }
    Ok(())
}

#[async_trait]
impl ResultSink for LocalResultSink {
    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    async fn begin_server(&self, server: &str) -> Result<(), SinkError> {
        let dir = self.server_dir(server);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        tracing::debug!(server, dir = %dir.display(), "Created server directory");
        Ok(())
    }

    async fn write_records(
        &self,
        server: &str,
        file_name: &str,
        records: &[Record],
    ) -> Result<usize, SinkError> {
        let path = self.server_dir(server).join(file_name);
        let mut buf = Vec::with_capacity(records.len() * 128);
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| SinkError::Serialize {
                what: file_name.to_string(),
                message: e.to_string(),
            })?;
            buf.push(b'\n');
        }
        write_atomic(&path, &buf).await?;
        tracing::debug!(server, file = file_name, records = records.len(), "Wrote records");
        Ok(records.len())
    }

    async fn write_rollups(&self, server: &str, rollups: &[CellRollup]) -> Result<(), SinkError> {
        let path = self.server_dir(server).join(ROLLUP_FILE);
        self.write_json(&path, ROLLUP_FILE, rollups).await?;
        tracing::info!(server, cells = rollups.len(), path = %path.display(), "Wrote rollup");
        Ok(())
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), SinkError> {
        let path = self.run_dir.join(MANIFEST_FILE);
        self.write_json(&path, MANIFEST_FILE, manifest).await?;
        tracing::info!(path = %path.display(), "Wrote manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serverbench_core::metrics::{CellMeta, CellStatus};
    use serverbench_core::response::ErrorKind;
    use serverbench_core::{
        apply_runtime_options, Catalogue, ResourceClass, RunOutcome, RuntimeOptions, ServerReport,
    };
    use std::time::Duration;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    fn record(status: u16, kind: ErrorKind) -> Record {
        Record {
            started_at: started(),
            duration_nanos: 2_500_000,
            status,
            error_kind: kind,
            path: "/params/search?q=alpha&limit=3".to_string(),
        }
    }

    fn rollup(records: &[Record]) -> CellRollup {
        CellRollup::from_records(
            CellMeta {
                server: "chi".to_string(),
                resource: ResourceClass::Cpu,
                capacity: 4,
                status: CellStatus::Complete,
                started_at: started(),
                elapsed: Duration::from_secs(1),
            },
            records,
        )
    }

    #[test]
    fn test_run_dir_layout() {
        let sink = LocalResultSink::new("/data/results", started());
        assert_eq!(sink.run_dir(), Path::new("/data/results/20240309-070501"));
        assert_eq!(
            sink.server_dir("chi"),
            PathBuf::from("/data/results/20240309-070501/chi")
        );
    }

    #[test]
    fn test_server_names_stay_inside_run_dir() {
        assert_eq!(dir_name("go/chi"), "go_chi");
        assert_eq!(dir_name(".."), "server__");
        assert_eq!(dir_name("actix-web"), "actix-web");
    }

    #[tokio::test]
    async fn test_records_are_ndjson() {
        let root = tempfile::tempdir().unwrap();
        let sink = LocalResultSink::new(root.path(), started());
        sink.begin_server("chi").await.unwrap();

        let records = vec![
            record(200, ErrorKind::None),
            record(503, ErrorKind::Status),
            record(0, ErrorKind::Connect),
        ];
        let name = CellRollup::records_file_name(ResourceClass::Cpu, 4);
        let written = sink.write_records("chi", &name, &records).await.unwrap();
        assert_eq!(written, 3);

        let text = std::fs::read_to_string(sink.server_dir("chi").join(&name)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["status"], 503);
        assert_eq!(second["errorKind"], "STATUS");
        let parsed: Record = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(parsed, records[2]);
    }

    #[tokio::test]
    async fn test_empty_cell_writes_empty_file() {
        let root = tempfile::tempdir().unwrap();
        let sink = LocalResultSink::new(root.path(), started());
        let written = sink.write_records("chi", "records-io-c1.ndjson", &[]).await.unwrap();
        assert_eq!(written, 0);
        let path = sink.server_dir("chi").join("records-io-c1.ndjson");
        assert_eq!(std::fs::read(path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rollup_is_array_and_no_tmp_left() {
        let root = tempfile::tempdir().unwrap();
        let sink = LocalResultSink::new(root.path(), started());
        sink.begin_server("chi").await.unwrap();

        let records = vec![record(200, ErrorKind::None), record(200, ErrorKind::None)];
        sink.write_rollups("chi", &[rollup(&records)]).await.unwrap();

        let dir = sink.server_dir("chi");
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join(ROLLUP_FILE)).unwrap()).unwrap();
        let cells = value.as_array().unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0]["count"], 2);
        assert_eq!(cells[0]["resource"], "cpu");

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_file() {
        let root = tempfile::tempdir().unwrap();
        let sink = LocalResultSink::new(root.path(), started());
        sink.write_rollups("chi", &[]).await.unwrap();
        let records = vec![record(200, ErrorKind::None)];
        sink.write_rollups("chi", &[rollup(&records)]).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(
            &std::fs::read(sink.server_dir("chi").join(ROLLUP_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_manifest_written_at_run_root() {
        let root = tempfile::tempdir().unwrap();
        let catalogue = Catalogue::from_yaml(
            r#"
servers:
  - { name: chi, image: bench/chi:latest, hostPort: 8080, containerPort: 8080 }
"#,
        )
        .unwrap();
        let options = RuntimeOptions {
            results_dir: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let (plan, _) = apply_runtime_options(&catalogue, &options).unwrap();

        let sink = LocalResultSink::new(&plan.results_root, started());
        let manifest = Manifest {
            tool_version: "0.1.0".to_string(),
            engine_version: Some("27.1.1".to_string()),
            started_at: started(),
            ended_at: started() + chrono::Duration::seconds(30),
            plan,
            outcome: RunOutcome::Completed,
            servers: vec![ServerReport::skipped("chi")],
        };
        sink.write_manifest(&manifest).await.unwrap();

        let path = root.path().join("20240309-070501").join(MANIFEST_FILE);
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["outcome"], "COMPLETED");
        assert_eq!(value["engineVersion"], "27.1.1");
        assert_eq!(value["servers"][0]["name"], "chi");
        assert_eq!(value["plan"]["servers"][0]["image"], "bench/chi:latest");
    }

    #[tokio::test]
    async fn test_unwritable_root_reports_path() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = LocalResultSink::new(&blocker, started());
        let err = sink.begin_server("chi").await.unwrap_err();
        match err {
            SinkError::Io { path, .. } => assert!(path.contains("not-a-dir")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
