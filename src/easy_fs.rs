use std::{fs::{self, File},
          io::{self, BufWriter, Write},
          path::{Path, PathBuf},
          time::UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    File,
    Other
}

/// The entries of directory `path` as (full path, kind), in
/// unspecified order. Symlinks are followed.
pub fn easy_filepaths_in_dir(
    path: &Path
) -> io::Result<impl Iterator<Item = io::Result<(PathBuf, FileKind)>>>
{
    Ok(fs::read_dir(path)?.map(
        |entry| -> io::Result<(PathBuf, FileKind)> {
            let entry = entry?;
            let path = entry.path();
            let md = fs::metadata(&path)?;
            let kind =
                if md.is_dir() {
                    FileKind::Dir
                } else if md.is_file() {
                    FileKind::File
                } else {
                    FileKind::Other
                };
            Ok((path, kind))
        }))
}

/// Modification time of `path` in milliseconds since the epoch, None
/// if it can't be stat'ed.
pub fn mtime_millis(path: &Path) -> Option<i64> {
    let t = fs::metadata(path).ok()?.modified().ok()?;
    Some(t.duration_since(UNIX_EPOCH).ok()?.as_millis() as i64)
}

/// Replace the file at `path` with `content` so that readers see
/// either the old or the new version, never a partial one. Concurrent
/// writers don't clash; the last rename wins.
pub fn write_file_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}-{:x}", std::process::id(), rand::random::<u64>()));
    let tmp = PathBuf::from(tmp);
    let res = (|| {
        let mut f = File::create(&tmp)?;
        f.write_all(content)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}

/// Open a log file for appending, creating its directory if missing.
pub fn open_log_output(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = File::options().append(true).create(true).open(path)?;
    Ok(BufWriter::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_write_file_atomic() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("f.json");
        write_file_atomic(&p, b"one")?;
        write_file_atomic(&p, b"two")?;
        assert_eq!(fs::read(&p)?, b"two");
        // no temporary files left behind
        assert_eq!(easy_filepaths_in_dir(dir.path())?.count(), 1);
        assert!(mtime_millis(&p).is_some());
        assert!(mtime_millis(&dir.path().join("nope")).is_none());
        Ok(())
    }
}
