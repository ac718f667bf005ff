//! Remote store synchronization for cache artifacts.
//!
//! A remote store is a flat keyed blob space, typically a shared
//! directory. Pull takes a remote artifact only when its stamp is
//! strictly newer than the local one, and push uploads only when the
//! local stamp is ahead, so neither direction can downgrade state.

use super::timestamps::Timestamps;
use crate::config::Settings;
use crate::encoder::EncoderKind;
use crate::error::{EngineError, EngineResult, SyncError, SyncResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Keyed blob storage for artifacts.
pub trait RemoteStore: Send + Sync {
    /// Whether a key exists remotely.
    fn exists(&self, key: &str) -> SyncResult<bool>;

    /// Fetches a key's bytes.
    fn get(&self, key: &str) -> SyncResult<Vec<u8>>;

    /// Stores bytes under a key, replacing any previous value.
    fn put(&self, key: &str, bytes: &[u8]) -> SyncResult<()>;
}

/// Remote store backed by a directory, typically a network mount.
pub struct DirRemoteStore {
    root: PathBuf,
}

impl DirRemoteStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn transfer_error(key: &str, e: impl std::fmt::Display) -> SyncError {
        SyncError::Transfer {
            key: key.to_string(),
            reason: e.to_string(),
        }
    }
}

impl RemoteStore for DirRemoteStore {
    fn exists(&self, key: &str) -> SyncResult<bool> {
        Ok(self.key_path(key).exists())
    }

    fn get(&self, key: &str) -> SyncResult<Vec<u8>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Err(SyncError::RemoteMissing {
                key: key.to_string(),
            });
        }
        fs::read(&path).map_err(|e| Self::transfer_error(key, e))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> SyncResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| Self::transfer_error(key, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| Self::transfer_error(key, e))?;
        tmp.write_all(bytes)
            .map_err(|e| Self::transfer_error(key, e))?;
        tmp.persist(self.key_path(key))
            .map_err(|e| Self::transfer_error(key, e.error))?;
        Ok(())
    }
}

/// What a push or pull actually moved.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Kinds whose artifacts were transferred.
    pub transferred: Vec<EncoderKind>,
    /// Kinds skipped because the destination was already current.
    pub skipped: Vec<EncoderKind>,
    /// Kinds skipped because the source had no artifact.
    pub missing: Vec<EncoderKind>,
}

impl SyncReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.transferred.is_empty()
    }
}

/// Moves artifacts between the local cache directory and a remote store.
pub struct SyncClient<'a> {
    store: &'a dyn RemoteStore,
    cache_dir: PathBuf,
}

impl<'a> SyncClient<'a> {
    #[must_use]
    pub fn new(store: &'a dyn RemoteStore, settings: &Settings) -> Self {
        Self {
            store,
            cache_dir: settings.cache_dir(),
        }
    }

    fn artifact_key(kind: EncoderKind) -> String {
        format!("{}.pmat", kind.key())
    }

    fn sidecar_key(kind: EncoderKind) -> String {
        format!("{}.meta.json", kind.key())
    }

    fn remote_timestamps(&self) -> EngineResult<Timestamps> {
        if !self
            .store
            .exists(Timestamps::FILE_NAME)
            .map_err(|e| remote_error("probe timestamps", &e))?
        {
            return Ok(Timestamps::new());
        }
        let bytes = self
            .store
            .get(Timestamps::FILE_NAME)
            .map_err(|e| remote_error("fetch timestamps", &e))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| remote_error("decode timestamps", &e))?;
        Timestamps::from_json(&raw).map_err(|e| remote_error("parse timestamps", &e))
    }

    /// Downloads artifacts whose remote stamp is strictly newer than the
    /// local one. An artifact missing locally is taken regardless of the
    /// stamp comparison.
    pub fn pull(&self, kinds: &[EncoderKind]) -> EngineResult<SyncReport> {
        let remote_stamps = self.remote_timestamps()?;
        let ts_path = self.cache_dir.join(Timestamps::FILE_NAME);
        let mut local_stamps = Timestamps::load(&ts_path)?;

        let mut report = SyncReport::default();
        for &kind in kinds {
            let key = kind.key();
            let Some(remote_at) = remote_stamps.get(key) else {
                report.missing.push(kind);
                continue;
            };
            let newer = match local_stamps.get(key) {
                Some(local_at) => remote_at > local_at,
                None => true,
            };
            let local_artifact = self.cache_dir.join(Self::artifact_key(kind));
            if !newer && local_artifact.exists() {
                report.skipped.push(kind);
                continue;
            }

            tracing::info!(kind = %kind, "pulling artifact from remote");
            let bytes = self
                .store
                .get(&Self::artifact_key(kind))
                .map_err(|e| remote_error(&format!("pull {key}"), &e))?;
            write_atomic(&local_artifact, &bytes)?;

            // The sidecar is informational; a missing one is not an error.
            if let Ok(bytes) = self.store.get(&Self::sidecar_key(kind)) {
                write_atomic(&self.cache_dir.join(Self::sidecar_key(kind)), &bytes)?;
            }

            local_stamps.copy_from(&remote_stamps, key);
            report.transferred.push(kind);
        }

        if !report.transferred.is_empty() {
            local_stamps.save(&ts_path)?;
        }
        Ok(report)
    }

    /// Uploads local artifacts whose stamp is ahead of the remote, then
    /// advances the remote stamps to the local values.
    pub fn push(&self, kinds: &[EncoderKind]) -> EngineResult<SyncReport> {
        let ts_path = self.cache_dir.join(Timestamps::FILE_NAME);
        let local_stamps = Timestamps::load(&ts_path)?;
        let mut remote_stamps = self.remote_timestamps()?;

        let mut report = SyncReport::default();
        for &kind in kinds {
            let key = kind.key();
            let local_artifact = self.cache_dir.join(Self::artifact_key(kind));
            if !local_artifact.exists() {
                report.missing.push(kind);
                continue;
            }
            let remote_current = match (local_stamps.get(key), remote_stamps.get(key)) {
                (Some(local_at), Some(remote_at)) => remote_at >= local_at,
                _ => false,
            };
            if remote_current {
                report.skipped.push(kind);
                continue;
            }

            tracing::info!(kind = %kind, "pushing artifact to remote");
            let bytes = fs::read(&local_artifact).map_err(|e| EngineError::FileRead {
                path: local_artifact.clone(),
                source: e,
            })?;
            self.store
                .put(&Self::artifact_key(kind), &bytes)
                .map_err(|e| remote_error(&format!("push {key}"), &e))?;

            let sidecar = self.cache_dir.join(Self::sidecar_key(kind));
            if sidecar.exists() {
                let bytes = fs::read(&sidecar).map_err(|e| EngineError::FileRead {
                    path: sidecar.clone(),
                    source: e,
                })?;
                self.store
                    .put(&Self::sidecar_key(kind), &bytes)
                    .map_err(|e| remote_error(&format!("push {key} sidecar"), &e))?;
            }

            if local_stamps.raw(key).is_some() {
                remote_stamps.copy_from(&local_stamps, key);
            } else {
                // An artifact that was never stamped locally gets one now
                remote_stamps.stamp(key);
            }
            report.transferred.push(kind);
        }

        if !report.transferred.is_empty() {
            let json = serde_json::to_string_pretty(&remote_stamps)
                .map_err(|e| EngineError::General(format!("Failed to serialize timestamps: {e}")))?;
            self.store
                .put(Timestamps::FILE_NAME, json.as_bytes())
                .map_err(|e| remote_error("push timestamps", &e))?;
        }
        Ok(report)
    }
}

fn remote_error(operation: &str, e: &dyn std::fmt::Display) -> EngineError {
    EngineError::RemoteError {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| EngineError::FileWrite {
        path: parent.to_path_buf(),
        source: e,
    })?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| EngineError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    tmp.write_all(bytes).map_err(|e| EngineError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| EngineError::FileWrite {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KIND: EncoderKind = EncoderKind::Sentence;

    fn settings_at(temp: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.workspace_root = Some(temp.path().to_path_buf());
        settings
    }

    fn seed_local(settings: &Settings, bytes: &[u8], stamp: Option<&str>) {
        let dir = settings.cache_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sentence.pmat"), bytes).unwrap();
        if let Some(raw) = stamp {
            let mut stamps = Timestamps::new();
            stamps.set_raw(KIND.key(), raw);
            stamps.save(&dir.join(Timestamps::FILE_NAME)).unwrap();
        }
    }

    fn seed_remote(store: &DirRemoteStore, bytes: &[u8], stamp: Option<&str>) {
        store.put("sentence.pmat", bytes).unwrap();
        if let Some(raw) = stamp {
            let mut stamps = Timestamps::new();
            stamps.set_raw(KIND.key(), raw);
            let json = serde_json::to_string_pretty(&stamps).unwrap();
            store.put(Timestamps::FILE_NAME, json.as_bytes()).unwrap();
        }
    }

    fn local_artifact(settings: &Settings) -> Vec<u8> {
        fs::read(settings.cache_dir().join("sentence.pmat")).unwrap()
    }

    #[test]
    fn test_pull_takes_strictly_newer_remote() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"old-local", Some("2024-01-01 00:00:00"));
        seed_remote(&store, b"new-remote", Some("2024-06-01 00:00:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.pull(&[KIND]).unwrap();

        assert_eq!(report.transferred, vec![KIND]);
        assert_eq!(local_artifact(&settings), b"new-remote");

        // The local stamp now matches the remote one
        let stamps =
            Timestamps::load(&settings.cache_dir().join(Timestamps::FILE_NAME)).unwrap();
        assert_eq!(stamps.raw(KIND.key()), Some("2024-06-01 00:00:00"));
    }

    #[test]
    fn test_pull_never_downgrades() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"newer-local", Some("2024-06-01 00:00:00"));
        seed_remote(&store, b"older-remote", Some("2024-01-01 00:00:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.pull(&[KIND]).unwrap();

        assert_eq!(report.skipped, vec![KIND]);
        assert!(report.is_noop());
        assert_eq!(local_artifact(&settings), b"newer-local");
    }

    #[test]
    fn test_pull_skips_on_equal_stamps() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"same-local", Some("2024-03-01 12:00:00"));
        seed_remote(&store, b"same-remote", Some("2024-03-01 12:00:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.pull(&[KIND]).unwrap();

        assert_eq!(report.skipped, vec![KIND]);
        assert_eq!(local_artifact(&settings), b"same-local");
    }

    #[test]
    fn test_pull_with_malformed_local_stamp_takes_remote() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"local", Some("not a timestamp"));
        seed_remote(&store, b"remote", Some("2024-01-01 00:00:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.pull(&[KIND]).unwrap();

        assert_eq!(report.transferred, vec![KIND]);
        assert_eq!(local_artifact(&settings), b"remote");
    }

    #[test]
    fn test_pull_reports_missing_remote_kinds() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        let client = SyncClient::new(&store, &settings);
        let report = client.pull(&[KIND, EncoderKind::TopicModel]).unwrap();
        assert_eq!(report.missing.len(), 2);
    }

    #[test]
    fn test_push_uploads_artifact_and_stamps() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"fresh", Some("2024-05-01 08:30:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.push(&[KIND]).unwrap();

        assert_eq!(report.transferred, vec![KIND]);
        assert_eq!(store.get("sentence.pmat").unwrap(), b"fresh");

        let raw = String::from_utf8(store.get(Timestamps::FILE_NAME).unwrap()).unwrap();
        let remote_stamps = Timestamps::from_json(&raw).unwrap();
        assert_eq!(remote_stamps.raw(KIND.key()), Some("2024-05-01 08:30:00"));
    }

    #[test]
    fn test_push_skips_when_remote_is_newer() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        seed_local(&settings, b"stale-local", Some("2024-01-01 00:00:00"));
        seed_remote(&store, b"current-remote", Some("2024-06-01 00:00:00"));

        let client = SyncClient::new(&store, &settings);
        let report = client.push(&[KIND]).unwrap();

        assert_eq!(report.skipped, vec![KIND]);
        assert_eq!(store.get("sentence.pmat").unwrap(), b"current-remote");
    }

    #[test]
    fn test_push_without_local_artifact_reports_missing() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let settings = settings_at(&local);
        let store = DirRemoteStore::new(remote_dir.path());

        let client = SyncClient::new(&store, &settings);
        let report = client.push(&[KIND]).unwrap();
        assert_eq!(report.missing, vec![KIND]);
    }

    #[test]
    fn test_round_trip_to_fresh_machine() {
        let machine_a = TempDir::new().unwrap();
        let machine_b = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let store = DirRemoteStore::new(remote_dir.path());

        let settings_a = settings_at(&machine_a);
        seed_local(&settings_a, b"matrix-bytes", Some("2024-02-02 02:02:02"));
        SyncClient::new(&store, &settings_a).push(&[KIND]).unwrap();

        let settings_b = settings_at(&machine_b);
        let report = SyncClient::new(&store, &settings_b).pull(&[KIND]).unwrap();

        assert_eq!(report.transferred, vec![KIND]);
        assert_eq!(local_artifact(&settings_b), b"matrix-bytes");
    }
}
