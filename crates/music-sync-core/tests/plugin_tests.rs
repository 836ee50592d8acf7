use music_sync_core::config::DrmPluginConfig;
use music_sync_core::plugins::{
    decrypt, DecryptError, DrmPlugin, PluginRegistry, ProcessPluginRunner,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn plugin_config(name: &str, enabled: bool, exts: &[&str]) -> DrmPluginConfig {
    DrmPluginConfig {
        name: name.to_string(),
        enabled,
        extensions: exts.iter().map(|e| e.to_string()).collect(),
    }
}

fn write_script(dir: &Path, file_name: &str, body: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn music_exts() -> Vec<String> {
    vec![".flac".to_string(), ".mp3".to_string()]
}

#[test]
fn test_resolve_searches_dirs_in_order() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    write_script(second.path(), "ncmdump.sh", "exit 0");
    write_script(first.path(), "kgm", "exit 0");
    write_script(second.path(), "kgm.bash", "exit 0");

    let registry = PluginRegistry::resolve(
        &[
            plugin_config("ncmdump", true, &["NCM"]),
            plugin_config("kgm", true, &[".kgm", ".vpr"]),
            plugin_config("qmc", false, &[".qmc0"]),
            plugin_config("missing", true, &[".xm"]),
        ],
        &[first.path().to_path_buf(), second.path().to_path_buf()],
    );

    assert_eq!(
        registry.lookup(".ncm").unwrap().executable,
        second.path().join("ncmdump.sh")
    );
    assert_eq!(registry.lookup(".vpr").unwrap().executable, first.path().join("kgm"));
    assert!(registry.lookup(".qmc0").is_none());
    assert!(registry.lookup(".xm").is_none());
    assert_eq!(registry.unresolved(), &["missing".to_string()]);
    assert_eq!(registry.plugins().count(), 2);
}

#[cfg(unix)]
#[test]
fn test_resolve_ignores_non_executable_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("ncmdump.sh"), "#!/bin/sh\nexit 0\n").unwrap();

    let registry = PluginRegistry::resolve(
        &[plugin_config("ncmdump", true, &[".ncm"])],
        &[dir.path().to_path_buf()],
    );
    assert!(registry.is_empty());
    assert_eq!(registry.unresolved(), &["ncmdump".to_string()]);
}

#[cfg(unix)]
mod scripts {
    use super::*;

    fn plugin(executable: PathBuf) -> DrmPlugin {
        DrmPlugin {
            name: "ncmdump".to_string(),
            extensions: [".ncm".to_string()].into_iter().collect(),
            executable,
        }
    }

    fn source_file(dir: &Path) -> PathBuf {
        let source = dir.join("song.ncm");
        fs::write(&source, b"encrypted").unwrap();
        source
    }

    #[test]
    fn test_decrypt_picks_best_output_and_cleans_up() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "ncmdump.sh",
            "printf 'mp3' > \"$2/song.mp3\"\nmkdir -p \"$2/sub\"\nprintf 'flac' > \"$2/sub/song.flac\"\nprintf 'jpg' > \"$2/cover.jpg\"",
        );
        let source = source_file(dir.path());

        let decrypted = decrypt(
            &ProcessPluginRunner::default(),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap()
        .unwrap();

        assert!(decrypted.path().ends_with("sub/song.flac"));
        assert_eq!(decrypted.extension(), ".flac");
        let scratch = decrypted.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());

        let dest = dir.path().join("incoming/song.flac");
        decrypted.stage_to(&dest).unwrap().commit().unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "flac");
        assert!(!scratch.exists());
        assert!(source.exists());
    }

    #[test]
    fn test_decrypt_receives_source_and_output_dir() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "ncmdump", "cp \"$1\" \"$2/out.mp3\"");
        let source = source_file(dir.path());

        let decrypted = decrypt(
            &ProcessPluginRunner::default(),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(fs::read_to_string(decrypted.path()).unwrap(), "encrypted");

        let scratch = decrypted.scratch_dir().to_path_buf();
        drop(decrypted);
        assert!(!scratch.exists());
    }

    /// Script prefix that records the scratch directory it was handed.
    fn record_scratch(marker: &Path) -> String {
        format!("echo \"$2\" > '{}'\n", marker.display())
    }

    fn assert_scratch_removed(marker: &Path) {
        let recorded = fs::read_to_string(marker).unwrap();
        let scratch = Path::new(recorded.trim());
        assert!(scratch.is_absolute());
        assert!(!scratch.exists(), "{} left behind", scratch.display());
    }

    #[test]
    fn test_decrypt_without_music_output() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("scratch.txt");
        let script = write_script(
            dir.path(),
            "ncmdump.sh",
            &format!("{}printf 'x' > \"$2/readme.txt\"", record_scratch(&marker)),
        );
        let source = source_file(dir.path());

        let result = decrypt(
            &ProcessPluginRunner::default(),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap();
        assert!(result.is_none());
        assert_scratch_removed(&marker);
    }

    #[test]
    fn test_decrypt_plugin_error() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("scratch.txt");
        let script = write_script(
            dir.path(),
            "ncmdump.sh",
            &format!(
                "{}printf 'partial' > \"$2/half.mp3\"\necho 'bad key' >&2\nexit 3",
                record_scratch(&marker)
            ),
        );
        let source = source_file(dir.path());

        let err = decrypt(
            &ProcessPluginRunner::default(),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap_err();
        match &err {
            DecryptError::PluginError { code, stderr } => {
                assert_eq!(*code, 3);
                assert_eq!(stderr, "bad key");
            }
            other => panic!("expected plugin error, got {:?}", other),
        }
        assert_eq!(err.outcome().tag(), "dedrm_fail_plugin_error_3");
        assert_scratch_removed(&marker);
    }

    #[test]
    fn test_decrypt_timeout() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("scratch.txt");
        let script = write_script(
            dir.path(),
            "ncmdump.sh",
            &format!("{}sleep 5", record_scratch(&marker)),
        );
        let source = source_file(dir.path());

        let err = decrypt(
            &ProcessPluginRunner::with_timeout(Duration::from_millis(500)),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap_err();
        assert!(matches!(err, DecryptError::Timeout(_)));
        assert_eq!(err.outcome().tag(), "dedrm_timeout");
        assert_scratch_removed(&marker);
    }

    #[test]
    fn test_background_child_cannot_outlast_timeout() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("scratch.txt");
        let script = write_script(
            dir.path(),
            "ncmdump.sh",
            &format!(
                "{}sleep 4 &\nprintf 'x' > \"$2/out.mp3\"\nexit 0",
                record_scratch(&marker)
            ),
        );
        let source = source_file(dir.path());

        let start = Instant::now();
        let err = decrypt(
            &ProcessPluginRunner::with_timeout(Duration::from_millis(500)),
            &plugin(script),
            &source,
            &music_exts(),
        )
        .unwrap_err();
        assert!(matches!(err, DecryptError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_scratch_removed(&marker);
    }

    #[test]
    fn test_decrypt_missing_script() {
        let dir = tempdir().unwrap();
        let source = source_file(dir.path());

        let err = decrypt(
            &ProcessPluginRunner::default(),
            &plugin(dir.path().join("does-not-exist.sh")),
            &source,
            &music_exts(),
        )
        .unwrap_err();
        assert!(matches!(err, DecryptError::ScriptNotFound(_)));
        assert_eq!(err.outcome().tag(), "plugin_script_not_found");
    }
}
