use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Returns the first file under `root` whose extension is in `extensions`.
///
/// Entries are visited in file-name order so repeated scans pick the same file.
pub fn find_first_video(root: &Path, extensions: &[String]) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| has_video_extension(entry.path(), extensions))
        .map(|entry| entry.into_path())
}

pub fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_ascii_lowercase();
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}
