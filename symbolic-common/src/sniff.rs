/// The outcome of probing a source for a specific format.
///
/// Recognition failure is not an error: the source is handed back unchanged so
/// that the caller can offer it to the next candidate format.
#[derive(Debug)]
pub enum Sniff<T, S> {
    /// The source was recognized and successfully parsed.
    Recognized(T),
    /// The source is not in this format. Contains the original source.
    NotRecognized(S),
}

impl<T, S> Sniff<T, S> {
    /// Returns `true` if the source was recognized.
    pub fn is_recognized(&self) -> bool {
        matches!(self, Sniff::Recognized(_))
    }

    /// Returns the parsed value, discarding the source otherwise.
    pub fn recognized(self) -> Option<T> {
        match self {
            Sniff::Recognized(value) => Some(value),
            Sniff::NotRecognized(_) => None,
        }
    }

    /// Maps the recognized value, leaving an unrecognized source untouched.
    pub fn map<U, F>(self, f: F) -> Sniff<U, S>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Sniff::Recognized(value) => Sniff::Recognized(f(value)),
            Sniff::NotRecognized(source) => Sniff::NotRecognized(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_recognized_keeps_source() {
        let sniff: Sniff<u32, &str> = Sniff::NotRecognized("source");
        assert!(!sniff.is_recognized());

        match sniff.map(|value| value * 2) {
            Sniff::NotRecognized(source) => assert_eq!(source, "source"),
            Sniff::Recognized(_) => panic!("unexpectedly recognized"),
        }
    }

    #[test]
    fn test_recognized() {
        let sniff: Sniff<u32, &str> = Sniff::Recognized(21);
        assert!(sniff.is_recognized());
        assert_eq!(sniff.map(|value| value * 2).recognized(), Some(42));
    }
}
