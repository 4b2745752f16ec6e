//! Request validation.
//!
//! Limits follow the orchestrator's documented bounds: CPU weight 0..=100,
//! non-negative memory, disk and instance counts, annotations up to 10 KiB.

use converge_events::{DesiredLrp, DesiredLrpUpdate, ErrorKind, RunAction, TaskRequest};
use converge_id::validate_guid;

use crate::error::SimError;

pub const MAX_CPU_WEIGHT: u32 = 100;
pub const MAX_ANNOTATION_BYTES: usize = 10 * 1024;
pub const MAX_PORT: u32 = 65535;

pub fn validate_task(request: &TaskRequest) -> Result<(), SimError> {
    let kind = ErrorKind::InvalidTask;
    let def = &request.definition;

    guid(&kind, "task_guid", request.task_guid.as_str())?;
    guid(&kind, "domain", request.domain.as_str())?;
    not_empty(&kind, "root_fs", &def.root_fs)?;
    action(&kind, &def.action)?;
    non_negative(&kind, "memory_mb", def.memory_mb)?;
    non_negative(&kind, "disk_mb", def.disk_mb)?;
    cpu_weight(&kind, def.cpu_weight)?;
    annotation(&kind, &def.annotation)?;

    if let Some(url) = &def.completion_callback_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SimError::invalid(
                kind,
                "completion_callback_url",
                format!("completion_callback_url must be an http(s) URL, got {url:?}"),
            ));
        }
    }
    Ok(())
}

pub fn validate_desired_lrp(lrp: &DesiredLrp) -> Result<(), SimError> {
    let kind = ErrorKind::InvalidDesiredLrp;

    guid(&kind, "process_guid", lrp.process_guid.as_str())?;
    guid(&kind, "domain", lrp.domain.as_str())?;
    not_empty(&kind, "root_fs", &lrp.root_fs)?;
    action(&kind, &lrp.action)?;
    non_negative(&kind, "instances", lrp.instances)?;
    non_negative(&kind, "memory_mb", lrp.memory_mb)?;
    non_negative(&kind, "disk_mb", lrp.disk_mb)?;
    cpu_weight(&kind, lrp.cpu_weight)?;
    annotation(&kind, &lrp.annotation)?;

    if let Some(port) = lrp.ports.iter().find(|p| **p == 0 || **p > MAX_PORT) {
        return Err(SimError::invalid(
            kind,
            "ports",
            format!("port {port} is out of range"),
        ));
    }
    Ok(())
}

pub fn validate_update(update: &DesiredLrpUpdate) -> Result<(), SimError> {
    let kind = ErrorKind::InvalidRequest;
    if let Some(instances) = update.instances {
        non_negative(&kind, "instances", instances)?;
    }
    if let Some(value) = &update.annotation {
        annotation(&kind, value)?;
    }
    Ok(())
}

fn guid(kind: &ErrorKind, field: &str, value: &str) -> Result<(), SimError> {
    validate_guid(value).map_err(|e| SimError::invalid(kind.clone(), field, format!("{field}: {e}")))
}

fn not_empty(kind: &ErrorKind, field: &str, value: &str) -> Result<(), SimError> {
    if value.trim().is_empty() {
        return Err(SimError::invalid(
            kind.clone(),
            field,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn action(kind: &ErrorKind, action: &RunAction) -> Result<(), SimError> {
    not_empty(kind, "action", &action.path)
}

fn non_negative(kind: &ErrorKind, field: &str, value: i32) -> Result<(), SimError> {
    if value < 0 {
        return Err(SimError::invalid(
            kind.clone(),
            field,
            format!("{field} must not be negative, got {value}"),
        ));
    }
    Ok(())
}

fn cpu_weight(kind: &ErrorKind, value: u32) -> Result<(), SimError> {
    if value > MAX_CPU_WEIGHT {
        return Err(SimError::invalid(
            kind.clone(),
            "cpu_weight",
            format!("cpu_weight must be between 0 and {MAX_CPU_WEIGHT}, got {value}"),
        ));
    }
    Ok(())
}

fn annotation(kind: &ErrorKind, value: &str) -> Result<(), SimError> {
    if value.len() > MAX_ANNOTATION_BYTES {
        return Err(SimError::invalid(
            kind.clone(),
            "annotation",
            format!(
                "annotation is {} bytes, limit is {MAX_ANNOTATION_BYTES}",
                value.len()
            ),
        ));
    }
    Ok(())
}
