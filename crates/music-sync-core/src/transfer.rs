//! Destination layout and file moves/copies into the incoming tree.

use filetime::{set_file_times, FileTime};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

const STAGING_PREFIX: &str = ".music-sync-";
const STAGING_SUFFIX: &str = ".part";

/// Directory of `path` relative to `source_root`; empty when `path` is not under it.
pub fn relative_dir(path: &Path, source_root: &Path) -> PathBuf {
    path.strip_prefix(source_root)
        .ok()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// `<incoming>/<relative dir>/<file name>` for plain copies.
pub fn copy_destination(incoming: &Path, path: &Path, source_root: &Path) -> PathBuf {
    let target_dir = incoming.join(relative_dir(path, source_root));
    match path.file_name() {
        Some(name) => target_dir.join(name),
        None => target_dir,
    }
}

/// `<incoming>/<relative dir>/<stem of source><extension of decrypted output>`.
pub fn decrypted_destination(
    incoming: &Path,
    path: &Path,
    source_root: &Path,
    output_ext: &str,
) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    incoming
        .join(relative_dir(path, source_root))
        .join(format!("{}{}", stem, output_ext))
}

fn ensure_parent(dest: &Path) -> io::Result<()> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Copy with permissions, access time and modification time preserved.
pub fn copy_preserving_times(src: &Path, dest: &Path) -> io::Result<()> {
    ensure_parent(dest)?;
    let metadata = fs::metadata(src)?;
    fs::copy(src, dest)?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    let atime = FileTime::from_last_access_time(&metadata);
    set_file_times(dest, atime, mtime)
}

/// Rename, falling back to copy + remove when `src` and `dest` are on different filesystems.
pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    ensure_parent(dest)?;
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_preserving_times(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Content waiting next to its destination under a unique temporary name.
/// Dropping it without [`StagedFile::commit`] removes only the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp: TempPath,
    dest: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Rename into the destination, replacing whatever is there.
    pub fn commit(self) -> io::Result<()> {
        self.temp.persist(&self.dest).map_err(|e| e.error)
    }
}

fn staging_path(dest: &Path) -> io::Result<TempPath> {
    ensure_parent(dest)?;
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(dir)?
        .into_temp_path())
}

/// Copy `src` (times preserved) to a staging file beside `dest`.
pub fn stage_copy(src: &Path, dest: &Path) -> io::Result<StagedFile> {
    let temp = staging_path(dest)?;
    copy_preserving_times(src, &temp)?;
    Ok(StagedFile {
        temp,
        dest: dest.to_path_buf(),
    })
}

/// Move `src` to a staging file beside `dest`.
pub fn stage_move(src: &Path, dest: &Path) -> io::Result<StagedFile> {
    let temp = staging_path(dest)?;
    move_file(src, &temp)?;
    Ok(StagedFile {
        temp,
        dest: dest.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_dir() {
        let root = Path::new("/backup/phone");
        assert_eq!(
            relative_dir(Path::new("/backup/phone/Artist/Album/01.mp3"), root),
            PathBuf::from("Artist/Album")
        );
        assert_eq!(relative_dir(Path::new("/backup/phone/01.mp3"), root), PathBuf::new());
        assert_eq!(relative_dir(Path::new("/elsewhere/01.mp3"), root), PathBuf::new());
    }

    #[test]
    fn test_destinations() {
        let incoming = Path::new("/srv/incoming");
        let root = Path::new("/backup");
        assert_eq!(
            copy_destination(incoming, Path::new("/backup/A/song.mp3"), root),
            PathBuf::from("/srv/incoming/A/song.mp3")
        );
        assert_eq!(
            decrypted_destination(incoming, Path::new("/backup/A/song.ncm"), root, ".flac"),
            PathBuf::from("/srv/incoming/A/song.flac")
        );
    }

    #[test]
    fn test_copy_preserves_mtime_and_creates_dirs() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        fs::write(&src, b"audio").unwrap();
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, stamp).unwrap();

        let dest = dir.path().join("out/nested/src.mp3");
        copy_preserving_times(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"audio");
        let copied = fs::metadata(&dest).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied), stamp);
        assert!(src.exists());
    }

    #[test]
    fn test_move_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("decrypted.flac");
        fs::write(&src, b"flac").unwrap();
        let dest = dir.path().join("incoming/a/b/song.flac");

        move_file(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"flac");
    }

    #[test]
    fn test_staged_copy_is_invisible_until_committed() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        fs::write(&src, b"audio").unwrap();
        let dest = dir.path().join("incoming/a/src.mp3");

        let staged = stage_copy(&src, &dest).unwrap();
        assert!(staged.path().exists());
        assert_eq!(staged.path().parent(), dest.parent());
        assert!(!dest.exists());

        staged.commit().unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"audio");
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_stage_leaves_existing_destination_alone() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("incoming/song.mp3");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"winner").unwrap();
        let src = dir.path().join("decrypted.mp3");
        fs::write(&src, b"loser").unwrap();

        let staged = stage_move(&src, &dest).unwrap();
        let temp = staged.path().to_path_buf();
        drop(staged);

        assert!(!temp.exists());
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"winner");
    }
}
