use std::path::Path;

use crate::{Error, Result};

pub fn create_directory_for_file(p: &Path) -> Result {
    if let Some(parent_dir) = p.parent() {
        std::fs::create_dir_all(parent_dir).map_err(|e| {
            Error::Runtime(format!(
                "Failed to create output directory for file '{}' ({e})",
                p.to_string_lossy()
            ))
        })?;
    }

    Ok(())
}

/// Remove the file if it exists, reports whether a file was removed
pub fn remove_file_if_exists(p: &Path) -> Result<bool> {
    if p.exists() {
        std::fs::remove_file(p)
            .map_err(|e| Error::Runtime(format!("Failed to remove '{}' ({e})", p.to_string_lossy())))?;
        return Ok(true);
    }

    Ok(false)
}

/// Remove a file together with its companion sidecar files
/// (e.g. the `.aux.xml` statistics file gdal writes next to a raster)
pub fn remove_with_sidecars(p: &Path, sidecar_suffixes: &[&str]) -> Result {
    remove_file_if_exists(p)?;
    for suffix in sidecar_suffixes {
        let mut sidecar = p.as_os_str().to_os_string();
        sidecar.push(suffix);
        if remove_file_if_exists(Path::new(&sidecar))? {
            log::debug!("Removed sidecar '{}'", Path::new(&sidecar).to_string_lossy());
        }
    }

    Ok(())
}

pub fn check_file_exists(p: &Path) -> Result {
    if !p.is_file() {
        return Err(Error::InvalidPath(p.to_path_buf()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_with_sidecars_removes_companions() {
        let dir = std::env::temp_dir().join(format!("inf_fs_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let raster = dir.join("data.tif");
        let sidecar = dir.join("data.tif.aux.xml");
        std::fs::write(&raster, b"").unwrap();
        std::fs::write(&sidecar, b"").unwrap();

        remove_with_sidecars(&raster, &[".aux.xml"]).unwrap();
        assert!(!raster.exists());
        assert!(!sidecar.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        assert!(!remove_file_if_exists(Path::new("/nonexistent/__nope__.tif")).unwrap());
    }
}
