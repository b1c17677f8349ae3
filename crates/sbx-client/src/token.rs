//! Session token persisted between CLI invocations

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use sbx_core::{SbxError, SbxResult};

use crate::store::write_private;

pub const TOKEN_FILE: &str = "session.token";

/// The session token file, owner-read/write only.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(dir: &Path) -> Self {
        TokenFile {
            path: dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, token: &SecretString) -> SbxResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SbxError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        write_private(&self.path, token.expose_secret().as_bytes())
    }

    /// The saved token, or `None` when logged out.
    pub fn load(&self) -> SbxResult<Option<SecretString>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let content = Zeroizing::new(content);
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SecretString::from(token.to_string())))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SbxError::Storage(format!(
                "reading {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Remove the token. Missing file is not an error.
    pub fn remove(&self) -> SbxResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SbxError::Storage(format!(
                "removing {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path());
        assert!(file.load().unwrap().is_none());

        file.save(&SecretString::from("header.payload.sig".to_string()))
            .unwrap();
        assert_eq!(
            file.load().unwrap().unwrap().expose_secret(),
            "header.payload.sig"
        );

        file.remove().unwrap();
        assert!(file.load().unwrap().is_none());
        file.remove().unwrap();
    }

    #[test]
    fn test_save_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(&dir.path().join("nested/strongbox"));
        file.save(&SecretString::from("t".to_string())).unwrap();
        assert!(file.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path());
        std::fs::write(file.path(), "old").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        file.save(&SecretString::from("new".to_string())).unwrap();
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
