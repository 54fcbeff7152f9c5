//! `qemu-img`-backed qcow2 overlay creation.
//!
//! Empty disks and the cloud-init ISO are generated in-process
//! ([`crate::qcow2`], [`crate::iso9660`]) — but a qcow2 *backing file*
//! overlay needs the real qcow2 reference-counting/L1-table machinery
//! `qemu-img` already implements correctly, so disk volumes with a
//! `backing_volume` shell out to it rather than reimplementing that format
//! detail by hand.

use std::path::Path;

use crate::error::RomulusError;

/// Create a qcow2 overlay at `overlay_path` backed by `base_image`.
pub async fn create_overlay(base_image: &Path, overlay_path: &Path) -> Result<(), RomulusError> {
    if let Some(parent) = overlay_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| RomulusError::Io {
            context: format!("creating directory {}", parent.display()),
            source: e,
        })?;
    }

    let output = tokio::process::Command::new("qemu-img")
        .args(["create", "-f", "qcow2", "-b"])
        .arg(base_image)
        .args(["-F", "qcow2"])
        .arg(overlay_path)
        .output()
        .await
        .map_err(|e| RomulusError::Io { context: "running qemu-img".into(), source: e })?;

    if !output.status.success() {
        return Err(RomulusError::ExternalCommand {
            command: "qemu-img".into(),
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    tracing::info!(path = %overlay_path.display(), base = %base_image.display(), "created qcow2 overlay");
    Ok(())
}
