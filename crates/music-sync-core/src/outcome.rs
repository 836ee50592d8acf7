use std::fmt;

/// Result of processing one version of one source file.
///
/// `tag()` is the string stored in the operation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    CopySuccess,
    DedrmSuccess,
    /// Already ingested at this path and mtime. Never persisted.
    SkipPathMtimeExists,
    /// Content already in the incoming tree. Not persisted by default.
    SkipMusicHashExists,
    /// Duplicate content recorded durably (`persist_hash_skips`).
    SkipMusicHashRecorded,
    UnsupportedType,
    DedrmNoMusicFound,
    Md5FailDedrm,
    Md5FailCopy,
    DedrmFailPluginError(i32),
    PluginScriptNotFound,
    DedrmTimeout,
    DedrmUnexpectedError(String),
    CopyFail(String),
    /// The file could not be stat'ed, so there is no mtime to key a record on.
    StatFail(String),
    /// The ledger itself failed; nothing reliable can be recorded.
    LedgerFail,
}

pub const SUCCESS_TAGS: [&str; 3] = ["copy_success", "dedrm_success", "skip_music_hash_recorded"];

impl Outcome {
    pub fn tag(&self) -> String {
        match self {
            Outcome::CopySuccess => "copy_success".to_string(),
            Outcome::DedrmSuccess => "dedrm_success".to_string(),
            Outcome::SkipPathMtimeExists => "skip_path_mtime_exists".to_string(),
            Outcome::SkipMusicHashExists => "skip_music_hash_exists".to_string(),
            Outcome::SkipMusicHashRecorded => "skip_music_hash_recorded".to_string(),
            Outcome::UnsupportedType => "unsupported_type".to_string(),
            Outcome::DedrmNoMusicFound => "dedrm_no_music_found".to_string(),
            Outcome::Md5FailDedrm => "md5_fail_dedrm".to_string(),
            Outcome::Md5FailCopy => "md5_fail_copy".to_string(),
            Outcome::DedrmFailPluginError(code) => format!("dedrm_fail_plugin_error_{}", code),
            Outcome::PluginScriptNotFound => "plugin_script_not_found".to_string(),
            Outcome::DedrmTimeout => "dedrm_timeout".to_string(),
            Outcome::DedrmUnexpectedError(kind) => format!("dedrm_unexpected_error_{}", kind),
            Outcome::CopyFail(kind) => format!("copy_fail_{}", kind),
            Outcome::StatFail(kind) => format!("stat_fail_{}", kind),
            Outcome::LedgerFail => "ledger_fail".to_string(),
        }
    }

    /// Whether this outcome goes to the operation log. `persist_hash_skips`
    /// only matters for duplicate content.
    pub fn is_persisted(&self) -> bool {
        !matches!(
            self,
            Outcome::SkipPathMtimeExists
                | Outcome::SkipMusicHashExists
                | Outcome::StatFail(_)
                | Outcome::LedgerFail
        )
    }
}

/// Stored tags that end processing of a path/mtime for good.
pub fn is_success_tag(tag: &str) -> bool {
    SUCCESS_TAGS.contains(&tag)
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Outcome::CopySuccess.tag(), "copy_success");
        assert_eq!(Outcome::DedrmFailPluginError(1).tag(), "dedrm_fail_plugin_error_1");
        assert_eq!(Outcome::DedrmFailPluginError(-9).tag(), "dedrm_fail_plugin_error_-9");
        assert_eq!(Outcome::CopyFail("PermissionDenied".into()).to_string(), "copy_fail_PermissionDenied");
    }

    #[test]
    fn test_success_tags_match_outcomes() {
        for outcome in [Outcome::CopySuccess, Outcome::DedrmSuccess, Outcome::SkipMusicHashRecorded] {
            assert!(is_success_tag(&outcome.tag()));
        }
        assert!(!is_success_tag("skip_music_hash_exists"));
        assert!(!is_success_tag("md5_fail_copy"));
    }

    #[test]
    fn test_skips_are_not_persisted() {
        assert!(!Outcome::SkipPathMtimeExists.is_persisted());
        assert!(!Outcome::SkipMusicHashExists.is_persisted());
        assert!(Outcome::SkipMusicHashRecorded.is_persisted());
        assert!(Outcome::UnsupportedType.is_persisted());
        assert!(!is_success_tag(&Outcome::DedrmTimeout.tag()));
        assert!(!Outcome::StatFail("NotFound".into()).is_persisted());
    }
}
