use std::path::Path;

const TRANSIENT_EXTENSIONS: [&str; 3] = ["tmp", "part", "swp"];

/// Editor backups and in-progress downloads, which never become artifacts.
pub fn is_transient(name: &str) -> bool {
    if name.starts_with('~') {
        return true;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TRANSIENT_EXTENSIONS
                .iter()
                .any(|t| ext.eq_ignore_ascii_case(t))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_names() {
        for name in ["~draft.txt", "upload.tmp", "x.part", "y.swp", ".notes.md.swp", "big.iso.PART"] {
            assert!(is_transient(name), "{name} should be filtered");
        }
    }

    #[test]
    fn real_files_pass() {
        for name in ["report.pdf", "notes.txt", "tmp", "part.docx", "archive.tar.gz", "draft~.txt"] {
            assert!(!is_transient(name), "{name} should pass");
        }
    }
}
