use unicode_normalization::UnicodeNormalization;

/// Width of the `YYYYMMDDHHMMSS` version prefix.
pub const VERSION_PREFIX_DIGITS: usize = 14;

/// Result of validating a flat filename.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    /// Filename is empty or whitespace-only.
    Empty,
    /// Filename contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Filename contains path traversal patterns (`..`).
    PathTraversal,
    /// Filename contains null bytes.
    NullByte,
    /// Filename starts with a dot (hidden file).
    Hidden,
    /// Filename contains control characters (CR, LF, etc.).
    ControlCharacter,
    /// Filename has no extension to infer the audio container from.
    MissingExtension,
    /// Filename already carries a version prefix.
    Versioned,
}

impl FilenameError {
    /// Returns a human-readable error message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::PathTraversal => "Invalid filename: '..' is not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::Hidden => "Invalid filename: hidden files (starting with '.') are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
            Self::MissingExtension => "Invalid filename: an extension such as '.mp3' is required",
            Self::Versioned => "Invalid filename: names starting with a 14-digit version prefix are reserved",
        }
    }
}

/// Validates a flat filename (no directory components allowed).
pub fn validate_flat_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }

    if trimmed.contains('\0') {
        return Err(FilenameError::NullByte);
    }

    if trimmed.chars().any(|c| c.is_ascii_control()) {
        return Err(FilenameError::ControlCharacter);
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if trimmed == ".." {
        return Err(FilenameError::PathTraversal);
    }

    if trimmed.starts_with('.') {
        return Err(FilenameError::Hidden);
    }

    Ok(trimmed)
}

/// Validates the name of a new lineage: a flat filename with an extension
/// and no version prefix.
pub fn validate_logical_name(name: &str) -> Result<&str, FilenameError> {
    let name = validate_flat_filename(name)?;
    if split_extension(name).1.is_empty() {
        return Err(FilenameError::MissingExtension);
    }
    if split_version_prefix(name).0.is_some() {
        return Err(FilenameError::Versioned);
    }
    Ok(name)
}

/// Folds an uploaded filename to plain ASCII: accents are decomposed and
/// dropped, spaces become underscores.
pub fn normalize_upload_name(name: &str) -> String {
    name.trim()
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Splits `YYYYMMDDHHMMSS_rest` into its digit prefix and the remainder.
///
/// Names without a well-formed prefix come back unchanged with `None`.
pub fn split_version_prefix(name: &str) -> (Option<&str>, &str) {
    let bytes = name.as_bytes();
    if bytes.len() > VERSION_PREFIX_DIGITS
        && bytes[..VERSION_PREFIX_DIGITS].iter().all(u8::is_ascii_digit)
        && bytes[VERSION_PREFIX_DIGITS] == b'_'
    {
        (
            Some(&name[..VERSION_PREFIX_DIGITS]),
            &name[VERSION_PREFIX_DIGITS + 1..],
        )
    } else {
        (None, name)
    }
}

pub fn strip_version_prefix(name: &str) -> &str {
    split_version_prefix(name).1
}

pub fn has_version_prefix(name: &str) -> bool {
    split_version_prefix(name).0.is_some()
}

/// Splits a filename into stem and extension (extension keeps its dot).
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Lineage name of a mix of `a` and `b`, in `a`'s container format.
pub fn merged_lineage_name(a: &str, b: &str) -> String {
    let (stem_a, ext_a) = split_extension(strip_version_prefix(a));
    let (stem_b, _) = split_extension(strip_version_prefix(b));
    format!("{stem_a}_and_{stem_b}{ext_a}")
}
