use std::path::{Path, PathBuf};

use crate::error::RomulusError;

/// Base image download cache: `~/.cache/romulus/images/`.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("romulus")
        .join("images")
}

/// On-disk location of a volume within its storage pool.
pub fn volume_path(pool_path: &str, volume_name: &str) -> PathBuf {
    Path::new(pool_path).join(volume_name)
}

/// Read an operator-supplied SSH public key from disk, trimmed of trailing
/// whitespace so it drops cleanly into a cloud-init `ssh_authorized_keys`
/// entry.
pub fn read_public_key(path: &Path) -> Result<String, RomulusError> {
    let contents = std::fs::read_to_string(path).map_err(|e| RomulusError::Io {
        context: format!("reading SSH public key from {}", path.display()),
        source: e,
    })?;
    Ok(contents.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_path_joins_pool_and_name() {
        assert_eq!(
            volume_path("/var/lib/romulus/pool", "k8s-master-1-disk"),
            PathBuf::from("/var/lib/romulus/pool/k8s-master-1-disk")
        );
    }

    #[test]
    fn read_public_key_trims_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519.pub");
        std::fs::write(&path, "ssh-ed25519 AAAA...\n").unwrap();
        assert_eq!(read_public_key(&path).unwrap(), "ssh-ed25519 AAAA...");
    }

    #[test]
    fn read_public_key_missing_file_is_io_error() {
        assert!(read_public_key(Path::new("/nonexistent/path")).is_err());
    }
}
