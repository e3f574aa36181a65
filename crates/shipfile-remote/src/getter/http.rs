//! HTTP(S) fetch backend
//!
//! Downloads a single file or a tar.gz archive. Archives are unpacked into the
//! destination directory with the archive's top-level directory stripped;
//! anything else is written to the destination path as a file.

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tar::Archive;
use tracing::debug;

use crate::source;

use super::{Getter, GetterError};

/// Maximum size for a downloaded artifact (50 MB)
pub const MAX_CONTENT_SIZE: u64 = 50 * 1024 * 1024;

/// HTTP client timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpGetter {
    client: Client,
    max_size: u64,
}

impl Default for HttpGetter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGetter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("shipfile-remote/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            max_size: MAX_CONTENT_SIZE,
        }
    }

    pub fn with_max_size(max_size: u64) -> Self {
        let mut getter = Self::new();
        getter.max_size = max_size;
        getter
    }
}

impl Getter for HttpGetter {
    fn get(&self, _wd: &Path, src: &str, dst: &Path) -> Result<(), GetterError> {
        let parsed =
            source::parse(src).map_err(|e| GetterError::InvalidAddress(e.to_string()))?;

        // request address: userinfo moves into basic auth, getter hint dropped
        let mut address = format!("{}://{}{}", parsed.scheme, parsed.host, parsed.dir);
        if !parsed.query.is_empty() {
            address.push('?');
            address.push_str(&parsed.query);
        }

        let mut request = self.client.get(&address);
        if !parsed.user.is_empty() {
            let (name, password) = match parsed.user.split_once(':') {
                Some((name, password)) => (name.to_string(), Some(password.to_string())),
                None => (parsed.user.clone(), None),
            };
            request = request.basic_auth(name, password);
        }

        debug!(address = %address, dst = %dst.display(), "downloading over http");

        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(GetterError::BadResponseCode {
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_size {
                return Err(GetterError::ContentTooLarge {
                    size: len,
                    max: self.max_size,
                });
            }
        }

        let mut content = Vec::new();
        let mut reader = response.take(self.max_size + 1);
        reader.read_to_end(&mut content)?;

        if content.len() as u64 > self.max_size {
            return Err(GetterError::ContentTooLarge {
                size: content.len() as u64,
                max: self.max_size,
            });
        }

        if is_archive_path(&parsed.dir) {
            std::fs::create_dir_all(dst)?;
            extract_tar_gz(&content, dst)
        } else {
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dst, &content)?;
            Ok(())
        }
    }
}

/// Whether the URL path names a tar.gz archive
fn is_archive_path(path: &str) -> bool {
    path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

/// Unpack a tar.gz archive into `dest`, stripping the archive's single
/// top-level directory when all entries share one
fn extract_tar_gz(content: &[u8], dest: &Path) -> Result<(), GetterError> {
    let strip_root = has_single_root(content)?;

    let decoder = GzDecoder::new(Cursor::new(content));
    let mut archive = Archive::new(decoder);

    let entries = archive.entries().map_err(|e| GetterError::Extraction {
        message: format!("failed to read tar entries: {e}"),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| GetterError::Extraction {
            message: format!("failed to read entry: {e}"),
        })?;

        let entry_path = entry
            .path()
            .map_err(|e| GetterError::Extraction {
                message: format!("invalid entry path: {e}"),
            })?
            .into_owned();

        let components: Vec<_> = entry_path.components().collect();
        let dest_path = if strip_root {
            if components.len() <= 1 {
                // the shared root directory itself
                continue;
            }
            let rest: std::path::PathBuf = components[1..].iter().collect();
            dest.join(rest)
        } else {
            dest.join(&entry_path)
        };

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&dest_path).map_err(|e| GetterError::Extraction {
                message: format!("failed to extract {}: {e}", dest_path.display()),
            })?;
        }
    }

    Ok(())
}

/// Whether every archive entry sits beneath one shared top-level directory
///
/// A top-level plain file, or a second distinct top-level name, means the
/// archive root must be preserved as-is.
fn has_single_root(content: &[u8]) -> Result<bool, GetterError> {
    let decoder = GzDecoder::new(Cursor::new(content));
    let mut archive = Archive::new(decoder);

    let entries = archive.entries().map_err(|e| GetterError::Extraction {
        message: format!("failed to read tar entries: {e}"),
    })?;

    let mut root: Option<std::ffi::OsString> = None;
    for entry in entries {
        let entry = entry.map_err(|e| GetterError::Extraction {
            message: format!("failed to read entry: {e}"),
        })?;

        let entry_path = entry
            .path()
            .map_err(|e| GetterError::Extraction {
                message: format!("invalid entry path: {e}"),
            })?
            .into_owned();

        let mut components = entry_path.components();
        let first = match components.next() {
            Some(c) => c.as_os_str().to_os_string(),
            None => continue,
        };

        if components.next().is_none() && !entry.header().entry_type().is_dir() {
            return Ok(false);
        }

        match &root {
            None => root = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return Ok(false),
        }
    }

    Ok(root.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn make_tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_is_archive_path() {
        assert!(is_archive_path("/charts/app-1.0.0.tar.gz"));
        assert!(is_archive_path("/charts/app.tgz"));
        assert!(!is_archive_path("/values/prod.yaml"));
    }

    #[test]
    fn test_extract_strips_top_level_dir() {
        let temp = tempfile::tempdir().unwrap();
        let archive = make_tar_gz(&[
            ("repo-1.0.0/Chart.yaml", b"name: app"),
            ("repo-1.0.0/templates/deploy.yaml", b"kind: Deployment"),
        ]);

        extract_tar_gz(&archive, temp.path()).unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("Chart.yaml")).unwrap(),
            b"name: app"
        );
        assert_eq!(
            std::fs::read(temp.path().join("templates/deploy.yaml")).unwrap(),
            b"kind: Deployment"
        );
    }

    #[test]
    fn test_extract_preserves_distinct_top_level_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let archive = make_tar_gz(&[
            ("charts/app/Chart.yaml", b"name: app"),
            ("docs/README.md", b"# docs"),
        ]);

        extract_tar_gz(&archive, temp.path()).unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("charts/app/Chart.yaml")).unwrap(),
            b"name: app"
        );
        assert_eq!(
            std::fs::read(temp.path().join("docs/README.md")).unwrap(),
            b"# docs"
        );
    }

    #[test]
    fn test_extract_preserves_top_level_file() {
        let temp = tempfile::tempdir().unwrap();
        let archive = make_tar_gz(&[
            ("values.yaml", b"replicas: 2"),
            ("templates/deploy.yaml", b"kind: Deployment"),
        ]);

        extract_tar_gz(&archive, temp.path()).unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("values.yaml")).unwrap(),
            b"replicas: 2"
        );
        assert_eq!(
            std::fs::read(temp.path().join("templates/deploy.yaml")).unwrap(),
            b"kind: Deployment"
        );
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let temp = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(b"definitely not a tarball", temp.path()).unwrap_err();
        assert!(matches!(
            err,
            GetterError::Extraction { .. } | GetterError::Io(_)
        ));
    }
}
