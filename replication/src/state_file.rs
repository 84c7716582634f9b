use common::error::MygramResult;
use common::gtid::Gtid;
use std::path::Path;

/// Rewrites the replication GTID state file via temp-file + atomic rename,
/// matching the snapshot directory's write discipline (spec §4.9, §6
/// "Persisted state").
pub fn write(path: &Path, gtid: &Gtid) -> MygramResult<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, gtid.as_str())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read(path: &Path) -> MygramResult<Gtid> {
    let contents = std::fs::read_to_string(path)?;
    Ok(Gtid::from(contents.trim().to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_atomic_rename() {
        let dir = std::env::temp_dir().join(format!("mygramdb_state_file_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gtid.state");
        write(&path, &Gtid::from("uuid:1-5")).unwrap();
        assert_eq!(read(&path).unwrap(), Gtid::from("uuid:1-5"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
