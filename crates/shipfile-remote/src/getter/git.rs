//! git fetch backend
//!
//! Clones a repository into the destination using the system `git` binary.
//! Serves both `git::https://...` and `ssh://...` addresses. Recognized query
//! parameters:
//!
//! - `ref` — branch or tag to check out (`--branch`)
//! - `depth` — shallow clone depth
//! - `sshkey` — base64-encoded private key, passed to git via
//!   `GIT_SSH_COMMAND` and a key file readable only by the owner

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::source;

use super::{Getter, GetterError};

#[derive(Debug, Default, Clone, Copy)]
pub struct GitGetter;

impl GitGetter {
    pub fn new() -> Self {
        Self
    }
}

impl Getter for GitGetter {
    fn get(&self, wd: &Path, src: &str, dst: &Path) -> Result<(), GetterError> {
        let parsed =
            source::parse(src).map_err(|e| GetterError::InvalidAddress(e.to_string()))?;

        // clone address: credentials kept, getter hint and query dropped
        let repo = if parsed.user.is_empty() {
            format!("{}://{}{}", parsed.scheme, parsed.host, parsed.dir)
        } else {
            format!("{}://{}@{}{}", parsed.scheme, parsed.user, parsed.host, parsed.dir)
        };

        let mut refspec = None;
        let mut depth = None;
        let mut sshkey = None;
        for (key, value) in url::form_urlencoded::parse(parsed.query.as_bytes()) {
            match key.as_ref() {
                "ref" => refspec = Some(value.into_owned()),
                "depth" => depth = Some(value.into_owned()),
                "sshkey" => sshkey = Some(value.into_owned()),
                _ => {}
            }
        }

        fs::create_dir_all(wd)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut cmd = Command::new("git");
        cmd.arg("clone");
        cmd.current_dir(wd);
        if let Some(depth) = &depth {
            cmd.arg("--depth").arg(depth);
        }
        if let Some(refspec) = &refspec {
            cmd.arg("--branch").arg(refspec);
        }
        cmd.arg(&repo);
        cmd.arg(dst);

        let key_file = match &sshkey {
            Some(encoded) => {
                let path = write_ssh_key(dst, encoded)?;
                cmd.env(
                    "GIT_SSH_COMMAND",
                    format!(
                        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                        path.display()
                    ),
                );
                Some(path)
            }
            None => None,
        };

        debug!(repo = %repo, dst = %dst.display(), "cloning git repository");

        let output = cmd.output();

        if let Some(path) = key_file {
            let _ = fs::remove_file(path);
        }

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GetterError::Git {
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Decode the base64 private key next to the destination, owner-readable only
fn write_ssh_key(dst: &Path, encoded: &str) -> Result<PathBuf, GetterError> {
    let decoded = BASE64.decode(encoded.trim()).map_err(|e| GetterError::Git {
        message: format!("invalid sshkey parameter: {e}"),
    })?;

    let dir = dst.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let path = dir.join(".sshkey");
    fs::write(&path, decoded)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_ssh_key_decodes_base64() {
        let temp = tempfile::tempdir().unwrap();
        let dst = temp.path().join("entry").join("origin");
        let encoded = BASE64.encode(b"-----BEGIN KEY-----");

        let path = write_ssh_key(&dst, &encoded).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"-----BEGIN KEY-----");
        assert_eq!(path.parent(), dst.parent());
    }

    #[test]
    fn test_write_ssh_key_rejects_bad_base64() {
        let temp = tempfile::tempdir().unwrap();
        let dst = temp.path().join("origin");

        let err = write_ssh_key(&dst, "not base64 at all!!!").unwrap_err();
        assert!(matches!(err, GetterError::Git { .. }));
    }

    #[test]
    fn test_clone_failure_reports_stderr() {
        let temp = tempfile::tempdir().unwrap();
        let getter = GitGetter::new();

        // nonexistent local repository forces a clone failure without network
        let err = getter
            .get(
                temp.path(),
                "git::file://localhost/no/such/repo.git",
                &temp.path().join("origin"),
            )
            .unwrap_err();

        // Io covers environments without a git binary on PATH
        assert!(matches!(err, GetterError::Git { .. } | GetterError::Io(_)));
    }
}
