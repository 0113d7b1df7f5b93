//! Session cookie configuration derived from [`AppSettings`].
//!
//! Release builds refuse ephemeral keys, short key files and
//! `SameSite=None` without a secure cookie. Debug builds log a warning and
//! fall back to a safe default instead.

pub mod fingerprint;

use std::path::PathBuf;

use actix_web::cookie::{Key, SameSite};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::settings::AppSettings;
use fingerprint::key_fingerprint;

const SESSION_KEY_MIN_LEN: usize = 64;
const SAMESITE_EXPECTED: &str = "Strict|Lax|None";

/// Build mode for session configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Debug builds tolerate defaults and emit warnings.
    Debug,
    /// Release builds require a readable key and consistent cookie flags.
    Release,
}

impl BuildMode {
    /// Determine the build mode from `cfg!(debug_assertions)`.
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Validated session cookie settings.
pub struct SessionSettings {
    pub key: Key,
    pub cookie_secure: bool,
    pub same_site: SameSite,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    #[error("invalid session same-site value '{value}'; expected {expected}")]
    InvalidSameSite {
        value: String,
        expected: &'static str,
    },
    #[error("failed to read session key at {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session key at {path} too short: need >= {min_len} bytes, got {length}")]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
    #[error("SameSite=None requires a secure session cookie")]
    InsecureSameSiteNone,
    #[error("ephemeral session keys are not allowed in release builds")]
    EphemeralNotAllowed,
}

/// Derive session settings, logging the fingerprint of the active key.
pub fn session_settings(
    settings: &AppSettings,
    mode: BuildMode,
) -> Result<SessionSettings, SessionConfigError> {
    if settings.session_allow_ephemeral && !mode.is_debug() {
        return Err(SessionConfigError::EphemeralNotAllowed);
    }
    let cookie_secure = settings.session_cookie_secure;
    let same_site = same_site(settings.session_same_site.as_deref(), mode, cookie_secure)?;
    let key = session_key(
        settings.session_key_file(),
        mode,
        settings.session_allow_ephemeral,
    )?;
    info!(fingerprint = %key_fingerprint(&key), "session key loaded");

    Ok(SessionSettings {
        key,
        cookie_secure,
        same_site,
    })
}

fn same_site(
    raw: Option<&str>,
    mode: BuildMode,
    cookie_secure: bool,
) -> Result<SameSite, SessionConfigError> {
    let Some(value) = raw else {
        return Ok(SameSite::Lax);
    };
    match value.to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" if cookie_secure => Ok(SameSite::None),
        "none" if mode.is_debug() => {
            warn!("SameSite=None without a secure cookie; browsers may reject it");
            Ok(SameSite::None)
        }
        "none" => Err(SessionConfigError::InsecureSameSiteNone),
        _ if mode.is_debug() => {
            warn!(value = %value, "invalid session same-site value, using Lax");
            Ok(SameSite::Lax)
        }
        _ => Err(SessionConfigError::InvalidSameSite {
            value: value.to_owned(),
            expected: SAMESITE_EXPECTED,
        }),
    }
}

fn session_key(
    path: PathBuf,
    mode: BuildMode,
    allow_ephemeral: bool,
) -> Result<Key, SessionConfigError> {
    match std::fs::read(&path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            if mode == BuildMode::Release && length < SESSION_KEY_MIN_LEN {
                bytes.zeroize();
                return Err(SessionConfigError::KeyTooShort {
                    path,
                    length,
                    min_len: SESSION_KEY_MIN_LEN,
                });
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(error) => {
            if mode.is_debug() || allow_ephemeral {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "using temporary session key (dev only)"
                );
                Ok(Key::generate())
            } else {
                Err(SessionConfigError::KeyRead {
                    path,
                    source: error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::io::Write;

    use env_lock::lock_env;
    use rstest::rstest;
    use tempfile::NamedTempFile;
    use ortho_config::OrthoConfig;

    fn key_file(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp key file");
        file.write_all(&vec![b'a'; len]).expect("write key");
        file
    }

    fn settings_for(key: &NamedTempFile, secure: bool, same_site: Option<&str>) -> AppSettings {
        let _guard = lock_env([
            ("BEACON_SESSION_COOKIE_SECURE", None::<String>),
            ("BEACON_SESSION_ALLOW_EPHEMERAL", None),
            ("BEACON_SESSION_SAME_SITE", None),
            ("BEACON_SESSION_KEY_FILE", None),
        ]);
        let mut settings = AppSettings::load_from_iter([OsString::from("beacon")])
            .expect("config should load");
        settings.session_key_file = Some(key.path().to_path_buf());
        settings.session_cookie_secure = secure;
        settings.session_same_site = same_site.map(str::to_owned);
        settings
    }

    #[test]
    fn release_accepts_a_long_key_file() {
        let key = key_file(SESSION_KEY_MIN_LEN);
        let settings = settings_for(&key, true, Some("Strict"));

        let session = session_settings(&settings, BuildMode::Release).expect("valid settings");
        assert!(session.cookie_secure);
        assert_eq!(session.same_site, SameSite::Strict);
    }

    #[test]
    fn release_rejects_a_short_key_file() {
        let key = key_file(SESSION_KEY_MIN_LEN - 1);
        let settings = settings_for(&key, true, None);

        let error = session_settings(&settings, BuildMode::Release)
            .err()
            .expect("short key rejected");
        assert!(matches!(
            error,
            SessionConfigError::KeyTooShort { length, .. } if length == SESSION_KEY_MIN_LEN - 1
        ));
    }

    #[test]
    fn release_rejects_a_missing_key_file() {
        let key = key_file(SESSION_KEY_MIN_LEN);
        let mut settings = settings_for(&key, true, None);
        settings.session_key_file = Some(key.path().with_extension("missing"));

        let error = session_settings(&settings, BuildMode::Release)
            .err()
            .expect("missing key rejected");
        assert!(matches!(error, SessionConfigError::KeyRead { .. }));
    }

    #[test]
    fn release_rejects_ephemeral_keys() {
        let key = key_file(SESSION_KEY_MIN_LEN);
        let mut settings = settings_for(&key, true, None);
        settings.session_allow_ephemeral = true;

        let error = session_settings(&settings, BuildMode::Release)
            .err()
            .expect("ephemeral rejected");
        assert!(matches!(error, SessionConfigError::EphemeralNotAllowed));
    }

    #[test]
    fn debug_generates_a_key_when_the_file_is_missing() {
        let key = key_file(SESSION_KEY_MIN_LEN);
        let mut settings = settings_for(&key, false, None);
        settings.session_key_file = Some(key.path().with_extension("missing"));

        let session = session_settings(&settings, BuildMode::Debug).expect("debug fallback");
        assert_eq!(session.same_site, SameSite::Lax);
    }

    #[rstest]
    #[case(Some("lax"), true, BuildMode::Release, SameSite::Lax)]
    #[case(Some("NONE"), true, BuildMode::Release, SameSite::None)]
    #[case(Some("none"), false, BuildMode::Debug, SameSite::None)]
    #[case(Some("bogus"), true, BuildMode::Debug, SameSite::Lax)]
    #[case(None, false, BuildMode::Release, SameSite::Lax)]
    fn resolves_same_site(
        #[case] raw: Option<&str>,
        #[case] secure: bool,
        #[case] mode: BuildMode,
        #[case] expected: SameSite,
    ) {
        assert_eq!(same_site(raw, mode, secure).expect("valid"), expected);
    }

    #[test]
    fn release_rejects_insecure_same_site_none() {
        let error = same_site(Some("None"), BuildMode::Release, false).expect_err("rejected");
        assert!(matches!(error, SessionConfigError::InsecureSameSiteNone));
    }

    #[test]
    fn release_rejects_unknown_same_site() {
        let error = same_site(Some("bogus"), BuildMode::Release, true).expect_err("rejected");
        assert!(matches!(error, SessionConfigError::InvalidSameSite { .. }));
    }
}
