//! Custom Resource Definitions for the Cloud Backup Schedule Operator

mod cloud_backup_schedule;

pub use cloud_backup_schedule::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&CloudBackupSchedule::crd())?])
}
