//! Upload validation and naming.
//!
//! Uploads are accepted by extension allow-list and size. The stored name is
//! a fresh UUID plus the lowercased extension, so user-supplied names never
//! reach the filesystem.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::defaults;

/// Extensions rendered inline as images in markdown snippets.
static IMAGE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["png", "jpg", "jpeg", "gif", "svg", "webp"]
        .into_iter()
        .collect()
});

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No extension, or one outside the allow-list.
    Extension(String),
    /// File larger than the configured limit.
    TooLarge { size: u64, limit: u64 },
    /// Zero-byte upload or missing filename.
    Empty,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Extension(name) => write!(f, "File type not allowed: {}", name),
            Rejection::TooLarge { size, limit } => write!(
                f,
                "File too large: {} bytes (limit {} bytes)",
                size, limit
            ),
            Rejection::Empty => write!(f, "Empty file"),
        }
    }
}

/// Allow-list and size limit applied to every upload.
#[derive(Debug, Clone)]
pub struct FileRules {
    allowed_extensions: HashSet<String>,
    max_file_bytes: u64,
}

impl FileRules {
    /// `extensions` is a comma-separated list; case and leading dots are ignored.
    pub fn new(extensions: &str, max_file_bytes: u64) -> Self {
        let allowed_extensions = extensions
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            allowed_extensions,
            max_file_bytes,
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        extension_of(filename)
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn check(&self, filename: &str, size: u64) -> Result<(), Rejection> {
        if filename.trim().is_empty() || size == 0 {
            return Err(Rejection::Empty);
        }
        if !self.is_allowed(filename) {
            return Err(Rejection::Extension(filename.to_string()));
        }
        if size > self.max_file_bytes {
            return Err(Rejection::TooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }
}

impl Default for FileRules {
    fn default() -> Self {
        Self::new(
            defaults::ALLOWED_FILE_EXTENSIONS,
            defaults::MAX_FILE_SIZE_MB * 1024 * 1024,
        )
    }
}

/// Lowercased extension after the last dot, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Strip path components and characters that are unsafe in file names.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    // Keep the extension when truncating.
    if sanitized.chars().count() > 255 {
        let ext = extension_of(sanitized)
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let keep = 255 - ext.chars().count();
        let stem: String = sanitized.chars().take(keep).collect();
        return format!("{}{}", stem, ext);
    }

    sanitized.to_string()
}

/// Fresh on-disk name for an upload: `<uuid hex>.<ext>`.
pub fn stored_filename_for(filename: &str) -> String {
    let id = Uuid::new_v4().simple();
    match extension_of(filename) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// MIME type guessed from the extension.
pub fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(defaults::FALLBACK_MIME_TYPE)
        .to_string()
}

pub fn is_image(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| IMAGE_EXTENSIONS.contains(ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_allow_documents_and_images() {
        let rules = FileRules::default();
        assert!(rules.is_allowed("report.PDF"));
        assert!(rules.is_allowed("photo.jpeg"));
        assert!(rules.is_allowed("notes.md"));
        assert!(!rules.is_allowed("setup.exe"));
        assert!(!rules.is_allowed("README"));
    }

    #[test]
    fn test_custom_extension_list_normalized() {
        let rules = FileRules::new(" .TXT, csv ,,", 10);
        assert!(rules.is_allowed("a.txt"));
        assert!(rules.is_allowed("b.CSV"));
        assert!(!rules.is_allowed("c.png"));
    }

    #[test]
    fn test_check_reports_reason() {
        let rules = FileRules::new("txt", 10);
        assert_eq!(rules.check("a.txt", 5), Ok(()));
        assert_eq!(
            rules.check("a.txt", 11),
            Err(Rejection::TooLarge { size: 11, limit: 10 })
        );
        assert_eq!(
            rules.check("a.bin", 5),
            Err(Rejection::Extension("a.bin".to_string()))
        );
        assert_eq!(rules.check("a.txt", 0), Err(Rejection::Empty));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.tar.GZ"), Some("gz".to_string()));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_sanitize_strips_paths_and_bad_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\a?b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
    }

    #[test]
    fn test_sanitize_truncates_multibyte_names_safely() {
        let long = format!("{}.png", "é".repeat(300));
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), 255);
        assert!(out.ends_with(".png"));
    }

    #[test]
    fn test_stored_filename_is_uuid_with_lowercased_ext() {
        let name = stored_filename_for("Holiday.JPG");
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, stored_filename_for("Holiday.JPG"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("a.png"), "image/png");
        assert_eq!(guess_mime("a.pdf"), "application/pdf");
        assert_eq!(guess_mime("a.unknownext"), "application/octet-stream");
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("a.PNG"));
        assert!(!is_image("a.pdf"));
    }
}
