//! Assorted utility functions shared across components.

use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::Error;

/// Current wall-clock time as Unix epoch seconds, used by the RTC and by
/// the `.sav` last-saved-time field.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn read_file(path: &str) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|error| Error::CustomError(format!("{}: {}", path, error)))
}

/// Writes `data` to `path` following the atomic save policy: the new
/// content lands in a sibling `.tmp` file first, the previous file (if
/// any) is preserved as `.bak`, and only then is the `.tmp` renamed into
/// place. If the final rename fails the `.bak` is restored so a partially
/// written save is never left as the active file.
pub fn write_file_atomic(path: &str, data: &[u8]) -> Result<(), Error> {
    if data.is_empty() {
        return Err(Error::SaveWriteFailed(String::from("refusing to write an empty save")));
    }

    let tmp_path = format!("{}.tmp", path);
    let bak_path = format!("{}.bak", path);

    fs::write(&tmp_path, data)?;

    let had_previous = Path::new(path).exists();
    if had_previous {
        fs::rename(path, &bak_path)?;
    }

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(error) => {
            if had_previous {
                // best-effort restore; if this also fails the `.bak` is
                // still there for the host to recover manually
                let _ = fs::rename(&bak_path, path);
            }
            Err(Error::SaveWriteFailed(error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_file_atomic_round_trip() {
        let dir = std::env::temp_dir().join(format!("dmgcore-test-{}", get_timestamp()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("game.sav");
        let path = path.to_str().unwrap();

        write_file_atomic(path, &[1, 2, 3]).unwrap();
        assert_eq!(read_file(path).unwrap(), vec![1, 2, 3]);

        write_file_atomic(path, &[4, 5, 6]).unwrap();
        assert_eq!(read_file(path).unwrap(), vec![4, 5, 6]);
        assert!(Path::new(&format!("{}.bak", path)).exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_file_atomic_rejects_empty() {
        let dir = std::env::temp_dir().join(format!("dmgcore-test-empty-{}", get_timestamp()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("game.sav");
        let path = path.to_str().unwrap();

        assert!(write_file_atomic(path, &[]).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
