//! Persisted record format
//!
//! The store writes a [`CollectionRecord`] as a single JSON document.
//! Records carry only durable fields; the trigger handle and spinner frame
//! are process-local and rebuilt at runtime. Files in the older untyped
//! layout are read as well, see [`legacy`].

pub mod legacy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::health::HealthSignals;
use crate::domain::pipeline::{Pipeline, PipelineCollection, PipelineStatus, ScriptKind};
use legacy::StoredLog;

/// On-disk form of a single pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: u64,
    pub name: String,
    pub status: PipelineStatus,
    #[serde(default, deserialize_with = "legacy::optional_time")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "legacy::optional_time")]
    pub next_run: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub running: bool,
    #[serde(default)]
    pub logs: Vec<StoredLog>,
    /// Empty when unscheduled
    #[serde(default)]
    pub cron_expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptKind>,
    #[serde(default)]
    pub health: Option<HealthSignals>,
    /// Older files: `"byod"` for a custom script, anything else built-in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
}

/// On-disk form of the whole collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub pipelines: Vec<PipelineRecord>,
    pub next_id: u64,
}

impl From<&Pipeline> for PipelineRecord {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name.clone(),
            status: pipeline.status,
            last_run: pipeline.last_run,
            next_run: pipeline.next_run,
            healthy: pipeline.healthy(),
            running: pipeline.is_running(),
            logs: pipeline.logs.iter().cloned().map(StoredLog::from).collect(),
            cron_expr: pipeline.cron_expr.clone().unwrap_or_default(),
            script: Some(pipeline.script.clone()),
            health: Some(pipeline.health),
            script_type: None,
            script_path: None,
        }
    }
}

impl From<PipelineRecord> for Pipeline {
    fn from(record: PipelineRecord) -> Self {
        // Files without per-source signals only know the combined flag.
        let health = record.health.unwrap_or(HealthSignals {
            execution: (!record.healthy).then_some(false),
            liveness: None,
        });
        let cron_expr = Some(record.cron_expr.trim().to_string()).filter(|e| !e.is_empty());
        let script = record
            .script
            .or_else(|| {
                legacy::script_kind(record.script_type.as_deref(), record.script_path.as_deref())
            })
            .unwrap_or_default();

        Self {
            id: record.id,
            name: record.name,
            status: record.status,
            last_run: record.last_run,
            next_run: record.next_run,
            logs: legacy::into_entries(record.logs, record.last_run),
            cron_expr,
            script,
            health,
            trigger: None,
            animation_frame: 0,
        }
    }
}

impl From<&PipelineCollection> for CollectionRecord {
    fn from(collection: &PipelineCollection) -> Self {
        Self {
            pipelines: collection.iter().map(PipelineRecord::from).collect(),
            next_id: collection.next_id(),
        }
    }
}

impl From<CollectionRecord> for PipelineCollection {
    fn from(record: CollectionRecord) -> Self {
        PipelineCollection::from_parts(
            record.pipelines.into_iter().map(Pipeline::from),
            record.next_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::HealthSource;
    use crate::domain::log::LogLevel;
    use crate::domain::pipeline::TriggerHandle;

    fn sample_collection() -> PipelineCollection {
        let mut collection = PipelineCollection::new();
        collection.create("Sales", ScriptKind::Builtin);
        collection.create(
            "Custom",
            ScriptKind::Custom {
                path: "/tmp/ingest.py".into(),
            },
        );
        let p = collection.get_mut(1).unwrap();
        p.cron_expr = Some("*/5 * * * *".to_string());
        p.trigger = Some(TriggerHandle::new());
        p.health.record(HealthSource::Execution, false);
        collection
    }

    #[test]
    fn test_record_omits_process_local_fields() {
        let collection = sample_collection();
        let json = serde_json::to_value(CollectionRecord::from(&collection)).unwrap();
        let first = &json["pipelines"][0];

        for field in [
            "id", "name", "status", "last_run", "next_run", "healthy", "running", "logs",
            "cron_expr",
        ] {
            assert!(first.get(field).is_some(), "missing field {}", field);
        }
        assert!(first.get("trigger").is_none());
        assert!(first.get("animation_frame").is_none());
        assert_eq!(first["healthy"], false);
        assert_eq!(json["pipelines"][1]["cron_expr"], "");
    }

    #[test]
    fn test_collection_survives_json_round_trip() {
        let collection = sample_collection();
        let json = serde_json::to_string(&CollectionRecord::from(&collection)).unwrap();
        let record: CollectionRecord = serde_json::from_str(&json).unwrap();
        let restored = PipelineCollection::from(record);

        assert_eq!(restored.next_id(), collection.next_id());
        for (original, loaded) in collection.iter().zip(restored.iter()) {
            assert_eq!(loaded.id, original.id);
            assert_eq!(loaded.name, original.name);
            assert_eq!(loaded.status, original.status);
            assert_eq!(loaded.last_run, original.last_run);
            assert_eq!(loaded.next_run, original.next_run);
            assert_eq!(loaded.logs, original.logs);
            assert_eq!(loaded.cron_expr, original.cron_expr);
            assert_eq!(loaded.script, original.script);
            assert_eq!(loaded.health, original.health);
            assert!(loaded.trigger.is_none());
        }
    }

    #[test]
    fn test_legacy_record_without_signals() {
        let json = r#"{
            "id": 1,
            "name": "old",
            "status": "Failed",
            "last_run": null,
            "next_run": null,
            "healthy": false,
            "running": false,
            "logs": [],
            "cron_expr": "  "
        }"#;
        let record: PipelineRecord = serde_json::from_str(json).unwrap();
        let pipeline = Pipeline::from(record);

        assert!(!pipeline.healthy());
        assert_eq!(pipeline.health.execution, Some(false));
        assert_eq!(pipeline.script, ScriptKind::Builtin);
        assert!(pipeline.cron_expr.is_none());
    }

    #[test]
    fn test_untyped_format_file() {
        let json = r#"{
          "pipelines": [
            {
              "id": 1,
              "name": "Salesforce",
              "status": "Completed",
              "last_run": "2024-05-01T12:00:03.512345678+02:00",
              "next_run": "0001-01-01T00:00:00Z",
              "healthy": true,
              "running": false,
              "logs": [
                "[Pipeline Created.]",
                "[2024-05-01 12:00:03] Pipeline executed successfully"
              ],
              "cron_expr": "",
              "script_path": "",
              "script_type": "",
              "last_script_path": ""
            },
            {
              "id": 3,
              "name": "Upload",
              "status": "Failed",
              "last_run": "0001-01-01T00:00:00Z",
              "next_run": "2024-05-02T09:00:00+02:00",
              "healthy": false,
              "running": false,
              "logs": [
                "[Pipeline Created.]",
                "[2024-05-01 12:10:00] Pipeline execution failed: exit status 1"
              ],
              "cron_expr": "0 9 * * *",
              "script_path": "/home/me/upload.py",
              "script_type": "byod",
              "last_script_path": "/home/me/upload.py"
            }
          ],
          "next_id": 4
        }"#;

        let record: CollectionRecord = serde_json::from_str(json).unwrap();
        let collection = PipelineCollection::from(record);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.next_id(), 4);

        let sales = collection.get(1).unwrap();
        assert_eq!(sales.status, PipelineStatus::Completed);
        assert!(sales.last_run.is_some());
        assert!(sales.next_run.is_none());
        assert_eq!(sales.script, ScriptKind::Builtin);
        assert_eq!(sales.logs.len(), 2);
        assert_eq!(sales.logs[0].message, "Pipeline Created.");
        assert!(sales.healthy());

        let upload = collection.get(3).unwrap();
        assert!(upload.last_run.is_none());
        assert!(upload.next_run.is_some());
        assert_eq!(upload.cron_expr.as_deref(), Some("0 9 * * *"));
        assert_eq!(
            upload.script,
            ScriptKind::Custom {
                path: "/home/me/upload.py".into()
            }
        );
        assert_eq!(upload.logs[1].level, LogLevel::Error);
        assert_eq!(upload.health.execution, Some(false));

        // Saving again writes the typed layout only
        let json = serde_json::to_value(CollectionRecord::from(&collection)).unwrap();
        let upload = &json["pipelines"][1];
        assert!(upload.get("script_type").is_none());
        assert_eq!(upload["script"]["kind"], "custom");
        assert_eq!(upload["logs"][0]["message"], "Pipeline Created.");
    }
}
