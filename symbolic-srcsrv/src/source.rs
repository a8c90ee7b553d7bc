use std::fmt;

/// Where the source of a compiled file can be retrieved from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceInformation {
    original_file: String,
    target_path: Option<String>,
}

impl SourceInformation {
    /// Creates a mapping for a file.
    pub fn new(original_file: impl Into<String>, target_path: Option<String>) -> Self {
        Self {
            original_file: original_file.into(),
            target_path,
        }
    }

    /// The absolute path of the file at build time.
    pub fn original_file(&self) -> &str {
        &self.original_file
    }

    /// The resolved retrieval location, if the stream computes one.
    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }
}

/// Formats as `original*target`, the record layout of the source files section.
impl fmt::Display for SourceInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}*{}",
            self.original_file,
            self.target_path.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let info = SourceInformation::new("c:\\a.cs", Some("http://x/a.cs".into()));
        assert_eq!(info.to_string(), "c:\\a.cs*http://x/a.cs");
        assert_eq!(SourceInformation::new("", None).to_string(), "*");
    }
}
