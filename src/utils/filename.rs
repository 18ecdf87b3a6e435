use std::path::{Path, PathBuf};

use crate::error::{ProcessingError, Result};
use crate::models::StationId;
use crate::utils::constants::ARCHIVE_SUFFIX;

/// Derive the station id from a per-station file name.
///
/// # Examples
/// ```
/// use isd_loader::utils::station_id_from_path;
/// use std::path::Path;
///
/// let id = station_id_from_path(Path::new("/data/2004/032040-99999-2004.gz")).unwrap();
/// assert_eq!(id.to_string(), "032040:99999");
/// ```
pub fn station_id_from_path(path: &Path) -> Result<StationId> {
    let malformed = || ProcessingError::MalformedFileName {
        path: path.to_path_buf(),
    };

    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;

    // Extensions are not part of either token: 032040-99999.gz -> 032040-99999
    let base = file_name.split('.').next().unwrap_or_default();

    let mut tokens = base.split('-');
    match (tokens.next(), tokens.next()) {
        (Some(usaf), Some(wban)) if !usaf.is_empty() && !wban.is_empty() => {
            Ok(StationId::new(usaf, wban))
        }
        _ => Err(malformed()),
    }
}

/// Yearly archive path: `<output_dir>/<year_dir name>.csv.gz`
pub fn archive_path_for(year_dir: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let name = year_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ProcessingError::InvalidInput(format!(
                "Directory has no usable name: {}",
                year_dir.display()
            ))
        })?;

    let parent = output_dir.unwrap_or(year_dir);
    Ok(parent.join(format!("{}{}", name, ARCHIVE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_id_with_year_suffix() {
        let id = station_id_from_path(Path::new(
            "/Users/patrick/projects/weather_data/2004/032040-99999-2004.gz",
        ))
        .unwrap();
        assert_eq!(id.to_string(), "032040:99999");
    }

    #[test]
    fn test_station_id_without_year_suffix() {
        let id = station_id_from_path(Path::new("2005/032040-99999.gz")).unwrap();
        assert_eq!(id.to_string(), "032040:99999");
    }

    #[test]
    fn test_malformed_file_names() {
        for name in ["2005.csv.gz", "-99999.gz", "032040-.gz", "stations"] {
            let err = station_id_from_path(Path::new(name)).unwrap_err();
            assert!(
                matches!(err, ProcessingError::MalformedFileName { .. }),
                "{} should be malformed",
                name
            );
        }
    }

    #[test]
    fn test_archive_path_defaults_to_year_dir() {
        let path = archive_path_for(Path::new("/data/2005"), None).unwrap();
        assert_eq!(path, PathBuf::from("/data/2005/2005.csv.gz"));
    }

    #[test]
    fn test_archive_path_with_output_dir() {
        let path = archive_path_for(Path::new("/data/2005"), Some(Path::new("/out"))).unwrap();
        assert_eq!(path, PathBuf::from("/out/2005.csv.gz"));
    }
}
