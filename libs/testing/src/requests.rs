//! Valid request payloads for generated entities.

use converge_events::{DesiredLrp, ModificationTag, RunAction, TaskDefinition, TaskRequest};
use converge_id::{Domain, ProcessGuid, TaskGuid};

pub const DEFAULT_MEMORY_MB: i32 = 128;
pub const DEFAULT_DISK_MB: i32 = 128;
pub const DEFAULT_CPU_WEIGHT: u32 = 10;
pub const DEFAULT_PORT: u32 = 8080;

/// A task that runs `script` under `sh -c`.
pub fn task(guid: &TaskGuid, domain: &Domain, root_fs: &str, script: &str) -> TaskRequest {
    TaskRequest {
        task_guid: guid.clone(),
        domain: domain.clone(),
        definition: TaskDefinition {
            root_fs: root_fs.to_string(),
            action: RunAction::shell(script),
            memory_mb: DEFAULT_MEMORY_MB,
            disk_mb: DEFAULT_DISK_MB,
            cpu_weight: DEFAULT_CPU_WEIGHT,
            log_guid: guid.to_string(),
            annotation: String::new(),
            completion_callback_url: None,
            privileged: false,
            result_file: String::new(),
        },
    }
}

/// A desired LRP with `instances` copies of `script` listening on one port.
pub fn desired_lrp(
    guid: &ProcessGuid,
    domain: &Domain,
    root_fs: &str,
    instances: i32,
    script: &str,
) -> DesiredLrp {
    DesiredLrp {
        process_guid: guid.clone(),
        domain: domain.clone(),
        root_fs: root_fs.to_string(),
        instances,
        action: RunAction::shell(script),
        memory_mb: DEFAULT_MEMORY_MB,
        disk_mb: DEFAULT_DISK_MB,
        cpu_weight: DEFAULT_CPU_WEIGHT,
        ports: vec![DEFAULT_PORT],
        routes: serde_json::Map::new(),
        annotation: String::new(),
        log_guid: guid.to_string(),
        start_timeout_ms: 0,
        modification_tag: ModificationTag::default(),
    }
}
