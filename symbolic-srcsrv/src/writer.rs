use std::io::Write;

use crate::error::{SrcSrvError, SrcSrvErrorKind};
use crate::source::SourceInformation;
use crate::stream::TARGET_VARIABLE;

const NEWLINE: &str = "\r\n";

/// Renders a SRCSRV stream that maps every file directly to its target.
///
/// Each record has two fields, the original file and the target, and `SRCSRVTRG`
/// expands to the second field. Interpreting the output with
/// [`SrcSrvStream`](crate::SrcSrvStream) yields the same list of files.
///
/// # Example
///
/// ```
/// use symbolic_srcsrv::{SourceInformation, SrcSrvWriter};
///
/// let files = [SourceInformation::new("c:\\a.cs", Some("http://x/a.cs".into()))];
/// let text = SrcSrvWriter::new().render(&files).unwrap();
///
/// let parsed = symbolic_srcsrv::parse_source_information(&text).unwrap();
/// assert_eq!(parsed, files);
/// ```
#[derive(Clone, Debug)]
pub struct SrcSrvWriter {
    version_control: String,
}

impl SrcSrvWriter {
    /// Creates a writer declaring `http` version control.
    pub fn new() -> Self {
        Self {
            version_control: "http".to_owned(),
        }
    }

    /// Sets the `VERCTRL` value of the ini section.
    pub fn version_control(mut self, version_control: impl Into<String>) -> Self {
        self.version_control = version_control.into();
        self
    }

    /// Writes the stream.
    ///
    /// Fails with [`SrcSrvErrorKind::InvalidRecord`] if a path contains a `*` or a line
    /// break, or if the version control name contains a `%` or a line break.
    pub fn write<W: Write>(
        &self,
        files: &[SourceInformation],
        mut writer: W,
    ) -> Result<(), SrcSrvError> {
        if self.version_control.contains(['%', '\r', '\n']) {
            return Err(SrcSrvError::new(
                SrcSrvErrorKind::InvalidRecord,
                format!("cannot encode version control {:?}", self.version_control),
            ));
        }

        for file in files {
            check_field(file.original_file())?;
            check_field(file.target_path().unwrap_or_default())?;
        }

        write!(writer, "SRCSRV: ini ------------------------------------------------{NEWLINE}")?;
        write!(writer, "VERSION=2{NEWLINE}")?;
        write!(writer, "VERCTRL={}{NEWLINE}", self.version_control)?;
        write!(writer, "SRCSRV: variables ------------------------------------------{NEWLINE}")?;
        write!(writer, "SRCSRVVERCTRL={}{NEWLINE}", self.version_control)?;
        write!(writer, "{TARGET_VARIABLE}=%var2%{NEWLINE}")?;
        write!(writer, "SRCSRV: source files ---------------------------------------{NEWLINE}")?;
        for file in files {
            write!(writer, "{file}{NEWLINE}")?;
        }
        write!(writer, "SRCSRV: end ------------------------------------------------{NEWLINE}")?;

        writer.flush()?;
        Ok(())
    }

    /// Renders the stream into a string.
    pub fn render(&self, files: &[SourceInformation]) -> Result<String, SrcSrvError> {
        let mut out = Vec::new();
        self.write(files, &mut out)?;
        String::from_utf8(out).map_err(|e| SrcSrvError::new(SrcSrvErrorKind::Io, e))
    }
}

impl Default for SrcSrvWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn check_field(value: &str) -> Result<(), SrcSrvError> {
    if value.contains(['*', '\r', '\n']) {
        return Err(SrcSrvError::new(
            SrcSrvErrorKind::InvalidRecord,
            format!("cannot encode path {value:?}"),
        ));
    }
    Ok(())
}
