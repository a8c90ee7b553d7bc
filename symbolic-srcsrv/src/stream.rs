use std::io::BufRead;

use indexmap::IndexMap;

use symbolic_common::CancellationToken;

use crate::error::{SrcSrvError, SrcSrvErrorKind};
use crate::expr::{Evaluator, Expression, Variable};
use crate::source::SourceInformation;

/// The variable that computes the target of each source file.
pub const TARGET_VARIABLE: &str = "SRCSRVTRG";

const INI_MARKER: &str = "SRCSRV: ini";
const VARIABLES_MARKER: &str = "SRCSRV: variables";
const SOURCE_FILES_MARKER: &str = "SRCSRV: source files";
const END_MARKER: &str = "SRCSRV: end";

/// Options for [`SrcSrvStream::parse_with`] and [`SrcSrvStream::parse_reader`].
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// How deeply variables may reference each other while evaluating a target.
    pub max_depth: usize,
    /// Checked once per line.
    pub cancel: CancellationToken,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Start,
    Ini,
    Variables,
    SourceFiles,
    End,
}

/// An interpreted SRCSRV stream.
///
/// The stream consists of an `ini` section, a `variables` section and a `source files`
/// section, each introduced by a marker line. Every line of the source files section
/// is a `*` separated record whose fields are available to expressions as `%var1%`,
/// `%var2%` and so on. The `SRCSRVTRG` variable is evaluated for each record to
/// compute where the file can be retrieved from.
#[derive(Clone, Debug, Default)]
pub struct SrcSrvStream {
    ini: IndexMap<String, String>,
    variables: IndexMap<String, Variable>,
    source_files: Vec<SourceInformation>,
}

impl SrcSrvStream {
    /// Parses a stream with default options.
    pub fn parse(text: &str) -> Result<Self, SrcSrvError> {
        Self::parse_with(text, &ParseOptions::default())
    }

    /// Parses a stream.
    pub fn parse_with(text: &str, options: &ParseOptions) -> Result<Self, SrcSrvError> {
        let mut parser = Parser::new(options);
        for line in text.lines() {
            parser.feed(line)?;
        }
        Ok(parser.finish())
    }

    /// Parses a stream line by line from a reader.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn parse_reader<R: BufRead>(
        mut reader: R,
        options: &ParseOptions,
    ) -> Result<Self, SrcSrvError> {
        let mut parser = Parser::new(options);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            parser.feed(line.trim_end_matches(['\r', '\n']))?;
        }
        Ok(parser.finish())
    }

    /// Key value pairs of the `ini` section, such as `VERSION` or `VERCTRL`.
    pub fn ini(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ini.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Looks up a value of the `ini` section, ignoring ASCII case.
    pub fn ini_value(&self, key: &str) -> Option<&str> {
        self.ini
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The version control system named by the `ini` section.
    pub fn version_control(&self) -> Option<&str> {
        self.ini_value("VERCTRL")
    }

    /// The raw variable definitions in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .values()
            .map(|variable| (variable.name.as_str(), variable.value.as_str()))
    }

    /// The parsed value of a variable, ignoring ASCII case.
    pub fn variable(&self, name: &str) -> Option<&Expression> {
        self.variables
            .get(&name.to_ascii_uppercase())
            .map(|variable| &variable.expression)
    }

    /// The source files in stream order.
    pub fn source_files(&self) -> &[SourceInformation] {
        &self.source_files
    }

    /// Consumes the stream, returning its source files.
    pub fn into_source_files(self) -> Vec<SourceInformation> {
        self.source_files
    }
}

struct Parser<'o> {
    options: &'o ParseOptions,
    section: Section,
    stream: SrcSrvStream,
}

impl<'o> Parser<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            section: Section::Start,
            stream: SrcSrvStream::default(),
        }
    }

    fn feed(&mut self, line: &str) -> Result<(), SrcSrvError> {
        self.options.cancel.check()?;

        match self.section {
            Section::Start => {
                if line.starts_with(INI_MARKER) {
                    self.section = Section::Ini;
                }
            }
            Section::Ini => {
                if line.starts_with(VARIABLES_MARKER) {
                    self.section = Section::Variables;
                } else if let Some((key, value)) = split_definition(line) {
                    self.stream.ini.insert(key.to_owned(), value.to_owned());
                }
            }
            Section::Variables => {
                if line.starts_with(SOURCE_FILES_MARKER) {
                    if !self.stream.variables.contains_key(TARGET_VARIABLE) {
                        return Err(SrcSrvErrorKind::MissingTarget.into());
                    }
                    self.section = Section::SourceFiles;
                } else if let Some((name, value)) = split_definition(line) {
                    self.define(name, value)?;
                }
            }
            Section::SourceFiles => {
                if line.starts_with(END_MARKER) {
                    self.section = Section::End;
                } else if !line.trim().is_empty() {
                    self.add_source_file(line)?;
                }
            }
            Section::End => {}
        }

        Ok(())
    }

    fn define(&mut self, name: &str, value: &str) -> Result<(), SrcSrvError> {
        let expression = Expression::parse(value)?;
        let key = name.to_ascii_uppercase();
        if self.stream.variables.contains_key(&key) {
            tracing::debug!(name, "redefined SRCSRV variable");
        }

        let variable = Variable {
            name: name.to_owned(),
            value: value.to_owned(),
            expression,
        };
        self.stream.variables.insert(key, variable);
        Ok(())
    }

    fn add_source_file(&mut self, line: &str) -> Result<(), SrcSrvError> {
        let fields: Vec<&str> = line.split('*').collect();
        let evaluator = Evaluator::new(&self.stream.variables, &fields, self.options.max_depth);
        let target = evaluator.evaluate(TARGET_VARIABLE)?;

        let target = Some(target).filter(|target| !target.is_empty());
        let info = SourceInformation::new(fields[0], target);
        self.stream.source_files.push(info);
        Ok(())
    }

    fn finish(self) -> SrcSrvStream {
        if self.section != Section::SourceFiles && self.section != Section::End {
            tracing::debug!(section = ?self.section, "SRCSRV stream without source files");
        }
        self.stream
    }
}

/// Splits `NAME=value`. Lines without a name are ignored.
fn split_definition(line: &str) -> Option<(&str, &str)> {
    line.split_once('=').filter(|(name, _)| !name.is_empty())
}

/// Interprets a SRCSRV stream and returns its source file mappings.
///
/// Returns `None` if the stream is malformed: when `SRCSRVTRG` is not defined, when a
/// variable is not a valid expression, or when variables reference each other in a cycle.
///
/// # Example
///
/// ```
/// let text = "SRCSRV: ini ------\n\
///             SRCSRV: variables ------\n\
///             SRCSRVTRG=http://x/%var2%\n\
///             SRCSRV: source files ------\n\
///             c:\\a.cs*a.cs\n";
///
/// let files = symbolic_srcsrv::parse_source_information(text).unwrap();
/// assert_eq!(files[0].original_file(), "c:\\a.cs");
/// assert_eq!(files[0].target_path(), Some("http://x/a.cs"));
/// ```
pub fn parse_source_information(text: &str) -> Option<Vec<SourceInformation>> {
    match SrcSrvStream::parse(text) {
        Ok(stream) => Some(stream.into_source_files()),
        Err(error) => {
            tracing::debug!(%error, "discarding malformed SRCSRV stream");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_definition() {
        assert_eq!(split_definition("A=b=c"), Some(("A", "b=c")));
        assert_eq!(split_definition("A="), Some(("A", "")));
        assert_eq!(split_definition("=b"), None);
        assert_eq!(split_definition("no value"), None);
    }

    #[test]
    fn test_last_definition_wins() {
        let text = "SRCSRV: ini\nSRCSRV: variables\nSRCSRVTRG=a\nsrcsrvtrg=b\n\
                    SRCSRV: source files\nfile\n";
        let stream = SrcSrvStream::parse(text).unwrap();
        assert_eq!(stream.source_files()[0].target_path(), Some("b"));
        assert_eq!(stream.variables().count(), 1);
    }

    #[test]
    fn test_cancelled() {
        let options = ParseOptions::default();
        options.cancel.cancel();
        let error = SrcSrvStream::parse_with("SRCSRV: ini", &options).unwrap_err();
        assert_eq!(error.kind(), SrcSrvErrorKind::Cancelled);
    }
}
