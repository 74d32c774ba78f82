use std::path::Path;

/// Lower-case extension of a path, empty when missing
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Check if a file is an audio file based on its extension
pub fn is_audio_file(path: &Path) -> bool {
    matches!(
        extension_of(path).as_str(),
        "mp3" | "m4b" | "m4a" | "aac" | "flac" | "wav" | "ogg" | "opus"
    )
}

/// Whether files with this extension can be merged by appending their bytes
///
/// MPEG audio is a sequence of self-contained frames, so byte concatenation
/// yields a playable stream. Container formats (MP4, Ogg, FLAC) cannot be
/// joined this way.
pub fn supports_raw_concat(extension: &str) -> bool {
    extension.eq_ignore_ascii_case("mp3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_audio_formats() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("book.M4B")));
        assert!(is_audio_file(Path::new("track.flac")));
    }

    #[test]
    fn test_rejects_non_audio() {
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("test")));
    }

    #[test]
    fn test_raw_concat_only_for_mpeg_audio() {
        assert!(supports_raw_concat("mp3"));
        assert!(supports_raw_concat("MP3"));
        assert!(!supports_raw_concat("m4b"));
        assert!(!supports_raw_concat("flac"));
        assert!(!supports_raw_concat(""));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/a/b/Part 01.MP3")), "mp3");
        assert_eq!(extension_of(Path::new("noext")), "");
    }
}
