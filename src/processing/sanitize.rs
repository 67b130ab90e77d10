//! Helpers for normalizing client-supplied values.

/// Name used when the client sends no usable filename.
pub const FALLBACK_DOCUMENT_NAME: &str = "upload";

/// Reduce a client filename to its final path component, without control characters.
///
/// The result is only used as document metadata and in logs; it never names a file on disk.
pub fn document_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_DOCUMENT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(document_name("report.pdf"), "report.pdf");
        assert_eq!(document_name("  spaced name.txt "), "spaced name.txt");
    }

    #[test]
    fn strips_directories() {
        assert_eq!(document_name("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(document_name(r"C:\Users\me\notes.docx"), "notes.docx");
    }

    #[test]
    fn drops_control_characters() {
        assert_eq!(document_name("evil\n\u{7}.csv"), "evil.csv");
    }

    #[test]
    fn falls_back_when_nothing_is_left() {
        assert_eq!(document_name(""), FALLBACK_DOCUMENT_NAME);
        assert_eq!(document_name("dir/"), FALLBACK_DOCUMENT_NAME);
        assert_eq!(document_name(".."), FALLBACK_DOCUMENT_NAME);
    }
}
