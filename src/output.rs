/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Saving and showing captured images

use chrono::NaiveDateTime;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::CaptureResult;
use crate::driver::ImageFormat;
use crate::error::Error;

/// `capture_<YYYYmmdd>_<HHMMSS>.<ext>`
pub fn default_filename(format: ImageFormat, now: NaiveDateTime) -> String {
    format!(
        "capture_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Where to write a capture
///
/// A name without extension gets the one of `format`, relative paths are
/// placed in `directory` when one is configured.
pub fn output_path(
    filename: Option<&str>,
    directory: Option<&Path>,
    format: ImageFormat,
    now: NaiveDateTime,
) -> PathBuf {
    let mut path = match filename {
        Some(name) if !name.is_empty() => PathBuf::from(name),
        _ => PathBuf::from(default_filename(format, now)),
    };

    if path.extension().is_none() {
        path.set_extension(format.extension());
    }

    match directory {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

pub fn save(result: &CaptureResult, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &result.image)?;
    debug!("wrote {} bytes to {}", result.image.len(), path.display());
    Ok(())
}

/// Open the image with the system default viewer
pub fn view(path: &Path) -> Result<(), Error> {
    opener::open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(12, 4, 5))
            .unwrap()
    }

    #[test]
    fn timestamped_default() {
        assert_eq!(
            output_path(None, None, ImageFormat::Png, noon()),
            PathBuf::from("capture_20240309_120405.png")
        );
        assert_eq!(
            output_path(Some(""), None, ImageFormat::Bmp, noon()),
            PathBuf::from("capture_20240309_120405.bmp")
        );
    }

    #[test]
    fn explicit_name() {
        assert_eq!(
            output_path(Some("scope"), None, ImageFormat::Bmp, noon()),
            PathBuf::from("scope.bmp")
        );
        assert_eq!(
            output_path(Some("scope.jpg"), None, ImageFormat::Png, noon()),
            PathBuf::from("scope.jpg")
        );
    }

    #[test]
    fn directory_only_for_relative_paths() {
        let dir = Path::new("/data/captures");
        assert_eq!(
            output_path(Some("a.png"), Some(dir), ImageFormat::Png, noon()),
            PathBuf::from("/data/captures/a.png")
        );
        assert_eq!(
            output_path(Some("/tmp/b.png"), Some(dir), ImageFormat::Png, noon()),
            PathBuf::from("/tmp/b.png")
        );
    }

    #[test]
    fn save_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("shot.png");
        let result = CaptureResult {
            image: vec![1, 2, 3],
            format: ImageFormat::Png,
        };

        save(&result, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
    }
}
