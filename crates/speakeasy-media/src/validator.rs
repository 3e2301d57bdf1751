//! Video artifact validation.

use std::path::Path;

use speakeasy_types::{ArtifactSource, UploadCandidate};

use crate::error::AnalysisError;

/// Accept only `video/*` artifacts.
pub fn validate(candidate: &UploadCandidate) -> Result<(), AnalysisError> {
    if candidate.mime_type.starts_with("video/") {
        Ok(())
    } else {
        Err(AnalysisError::Validation {
            mime_type: candidate.mime_type.clone(),
        })
    }
}

/// Guess a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Describe a file on disk as an upload candidate.
///
/// This only inspects metadata; call [`validate`] before accepting it.
pub async fn candidate_from_path(path: &Path) -> std::io::Result<UploadCandidate> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        ));
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Ok(UploadCandidate {
        source: ArtifactSource::File {
            path: path.to_path_buf(),
        },
        file_name,
        size_bytes: metadata.len(),
        mime_type: mime_for_path(path).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(mime: &str) -> UploadCandidate {
        UploadCandidate {
            source: ArtifactSource::File {
                path: "speech.mp4".into(),
            },
            file_name: "speech.mp4".into(),
            size_bytes: 10,
            mime_type: mime.into(),
        }
    }

    #[test]
    fn test_accepts_video() {
        assert!(validate(&candidate("video/mp4")).is_ok());
        assert!(validate(&candidate("video/webm")).is_ok());
    }

    #[test]
    fn test_rejects_non_video() {
        for mime in ["audio/mpeg", "text/plain", "", "application/octet-stream", "Video/mp4"] {
            let err = validate(&candidate(mime)).unwrap_err();
            assert_eq!(err.user_message(), "Please upload a valid video file.");
        }
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/speech.MP4")), "video/mp4");
        assert_eq!(mime_for_path(Path::new("talk.mov")), "video/quicktime");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_candidate_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.mp4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let c = candidate_from_path(&path).await.unwrap();
        assert_eq!(c.file_name, "speech.mp4");
        assert_eq!(c.size_bytes, 2048);
        assert_eq!(c.mime_type, "video/mp4");
        assert!(validate(&c).is_ok());
    }

    #[tokio::test]
    async fn test_candidate_from_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(candidate_from_path(dir.path()).await.is_err());
    }
}
