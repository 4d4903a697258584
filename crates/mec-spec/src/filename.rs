//! Filename splitting for volume files.
//!
//! Separates a dataset filename into a logical prefix and a filetype
//! suffix. Legacy volume-container names carry a `+space` view tag
//! (`anat+orig.HEAD`); native names carry an extension, recognized as a
//! two-part extension when the file is compressed (`rest.nii.gz`).

use serde::{Deserialize, Serialize};

/// Filetype suffix carried by a volume filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum FileType {
    /// Legacy container view tag, stored without the leading `+`
    /// (`orig`, `tlrc`, `mni`).
    View(String),
    /// Native extension including the leading dot; compressed files keep
    /// both parts (`.nii.gz`).
    Ext(String),
    /// The filename carried no dot at all.
    None,
}

impl FileType {
    /// Renders the suffix exactly as it appeared in the filename.
    pub fn as_suffix(&self) -> String {
        match self {
            FileType::View(view) => format!("+{view}"),
            FileType::Ext(ext) => ext.clone(),
            FileType::None => String::new(),
        }
    }

    /// True for legacy container view tags.
    pub fn is_view(&self) -> bool {
        matches!(self, FileType::View(_))
    }

    /// True for native volume extensions (`.nii` or `.nii.gz`).
    pub fn is_nifti(&self) -> bool {
        matches!(self, FileType::Ext(ext) if ext == ".nii" || ext == ".nii.gz")
    }
}

/// A filename split into logical prefix and filetype suffix.
///
/// `prefix + ftype.as_suffix()` round-trips the original filename for
/// extension forms; view forms reassemble the container dataset name
/// (`anat+orig`), without the companion-file suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedName {
    /// Filename without its filetype suffix.
    pub prefix: String,
    /// The filetype suffix.
    pub ftype: FileType,
}

impl ParsedName {
    /// Reassembles the original filename.
    pub fn original(&self) -> String {
        format!("{}{}", self.prefix, self.ftype.as_suffix())
    }
}

/// Splits `fname` into prefix and filetype suffix.
///
/// A name containing `+` is treated as a legacy container reference and
/// split at the view tag; otherwise the extension is taken after the last
/// dot, or the last two dots for compressed files. Dot-free names return
/// an empty filetype.
pub fn parse_name(fname: &str) -> ParsedName {
    if !fname.contains('.') {
        return ParsedName {
            prefix: fname.to_string(),
            ftype: FileType::None,
        };
    }
    if let Some(plus) = fname.find('+') {
        let prefix = fname[..plus].to_string();
        let suffix = fname.rsplit('+').next().unwrap_or("");
        let view = suffix.split('.').next().unwrap_or("").to_string();
        return ParsedName {
            prefix,
            ftype: FileType::View(view),
        };
    }
    let parts: Vec<&str> = fname.split('.').collect();
    if fname.ends_with(".gz") && parts.len() >= 3 {
        let prefix = parts[..parts.len() - 2].join(".");
        let ext = format!(".{}", parts[parts.len() - 2..].join("."));
        ParsedName {
            prefix,
            ftype: FileType::Ext(ext),
        }
    } else {
        let prefix = parts[..parts.len() - 1].join(".");
        let ext = format!(".{}", parts[parts.len() - 1]);
        ParsedName {
            prefix,
            ftype: FileType::Ext(ext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_extension() {
        let parsed = parse_name("rest_e1.nii");
        assert_eq!(parsed.prefix, "rest_e1");
        assert_eq!(parsed.ftype, FileType::Ext(".nii".to_string()));
        assert_eq!(parsed.original(), "rest_e1.nii");
    }

    #[test]
    fn splits_compressed_extension_in_two_parts() {
        let parsed = parse_name("rest_e1.nii.gz");
        assert_eq!(parsed.prefix, "rest_e1");
        assert_eq!(parsed.ftype, FileType::Ext(".nii.gz".to_string()));
        assert_eq!(parsed.original(), "rest_e1.nii.gz");
    }

    #[test]
    fn splits_legacy_view_tag() {
        let parsed = parse_name("anat+orig.HEAD");
        assert_eq!(parsed.prefix, "anat");
        assert_eq!(parsed.ftype, FileType::View("orig".to_string()));
        assert_eq!(parsed.ftype.as_suffix(), "+orig");
    }

    #[test]
    fn dot_free_name_has_empty_filetype() {
        let parsed = parse_name("restdata");
        assert_eq!(parsed.prefix, "restdata");
        assert_eq!(parsed.ftype, FileType::None);
        assert_eq!(parsed.original(), "restdata");
    }

    #[test]
    fn multi_dot_basename_keeps_inner_dots() {
        let parsed = parse_name("sub.01.rest.nii.gz");
        assert_eq!(parsed.prefix, "sub.01.rest");
        assert_eq!(parsed.original(), "sub.01.rest.nii.gz");
    }
}
