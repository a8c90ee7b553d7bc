//! The expression language of SRCSRV variable values.
//!
//! A value is a sequence of literal text and `%name%` tokens. The tokens `%fnvar%`,
//! `%fnbksl%` and `%fnfile%` are functions and must be followed by a parenthesized
//! argument, which is an expression itself. Any other token references a variable.

use std::mem;

use indexmap::IndexMap;

use crate::error::{SrcSrvError, SrcSrvErrorKind};

/// A built-in function of the expression language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    /// `%fnvar%(name)`: the value of the variable whose name the argument evaluates to.
    Var,
    /// `%fnbksl%(path)`: the argument with forward slashes turned into backslashes and
    /// runs of separators collapsed.
    Backslash,
    /// `%fnfile%(path)`: the file name component of the argument.
    File,
}

impl Function {
    /// Resolves a token name to a function, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Var, Self::Backslash, Self::File]
            .into_iter()
            .find(|function| function.name().eq_ignore_ascii_case(name))
    }

    /// The token name of this function.
    pub fn name(self) -> &'static str {
        match self {
            Self::Var => "fnvar",
            Self::Backslash => "fnbksl",
            Self::File => "fnfile",
        }
    }
}

/// A node of a parsed [`Expression`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// Text that is copied verbatim.
    Literal(String),
    /// A `%name%` reference to another variable or to a field of the source file record.
    Reference(String),
    /// A function applied to the concatenation of its arguments.
    Function(Function, Vec<Expr>),
}

/// The parsed value of a SRCSRV variable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expression {
    nodes: Vec<Expr>,
}

struct Frame {
    function: Function,
    nodes: Vec<Expr>,
}

enum State {
    Literal,
    Token,
    FunctionOpen,
}

fn top<'a>(root: &'a mut Vec<Expr>, stack: &'a mut [Frame]) -> &'a mut Vec<Expr> {
    match stack.last_mut() {
        Some(frame) => &mut frame.nodes,
        None => root,
    }
}

fn flush_literal(nodes: &mut Vec<Expr>, text: &mut String) {
    if !text.is_empty() {
        nodes.push(Expr::Literal(mem::take(text)));
    }
}

fn invalid(message: &'static str) -> SrcSrvError {
    SrcSrvError::new(SrcSrvErrorKind::InvalidExpression, message)
}

impl Expression {
    /// Parses a variable value.
    ///
    /// A `)` closes the innermost open function and is literal text outside of one.
    pub fn parse(value: &str) -> Result<Self, SrcSrvError> {
        let mut root = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut text = String::new();
        let mut state = State::Literal;

        for c in value.chars() {
            match state {
                State::Literal => match c {
                    '%' => {
                        flush_literal(top(&mut root, &mut stack), &mut text);
                        state = State::Token;
                    }
                    ')' if !stack.is_empty() => {
                        flush_literal(top(&mut root, &mut stack), &mut text);
                        if let Some(frame) = stack.pop() {
                            let node = Expr::Function(frame.function, frame.nodes);
                            top(&mut root, &mut stack).push(node);
                        }
                    }
                    _ => text.push(c),
                },
                State::Token => match c {
                    '%' => {
                        let name = mem::take(&mut text);
                        if name.is_empty() {
                            return Err(invalid("empty variable name"));
                        }

                        match Function::from_name(&name) {
                            Some(function) => {
                                stack.push(Frame {
                                    function,
                                    nodes: Vec::new(),
                                });
                                state = State::FunctionOpen;
                            }
                            None => {
                                top(&mut root, &mut stack).push(Expr::Reference(name));
                                state = State::Literal;
                            }
                        }
                    }
                    _ => text.push(c),
                },
                State::FunctionOpen => {
                    if c != '(' {
                        return Err(invalid("expected an opening parenthesis after function"));
                    }
                    state = State::Literal;
                }
            }
        }

        match state {
            State::Literal => flush_literal(top(&mut root, &mut stack), &mut text),
            // An unterminated token, such as the `%` in `50%`, is dropped.
            State::Token => tracing::trace!(token = %text, "dropping unterminated token"),
            State::FunctionOpen => return Err(invalid("missing function argument")),
        }

        if !stack.is_empty() {
            return Err(invalid("unbalanced parentheses"));
        }

        Ok(Self { nodes: root })
    }

    /// The top-level nodes of this expression.
    pub fn nodes(&self) -> &[Expr] {
        &self.nodes
    }
}

/// A variable definition from the variables section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Variable {
    pub name: String,
    pub value: String,
    pub expression: Expression,
}

/// Evaluates expressions against the variables of a stream and the fields of one
/// source file record.
pub(crate) struct Evaluator<'a> {
    variables: &'a IndexMap<String, Variable>,
    fields: &'a [&'a str],
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    /// `variables` must be keyed by upper case names.
    pub fn new(
        variables: &'a IndexMap<String, Variable>,
        fields: &'a [&'a str],
        max_depth: usize,
    ) -> Self {
        Self {
            variables,
            fields,
            max_depth,
        }
    }

    /// Evaluates the variable `name` into a new string.
    pub fn evaluate(&self, name: &str) -> Result<String, SrcSrvError> {
        let mut out = String::new();
        self.lookup(name, &mut out, 0)?;
        Ok(out)
    }

    fn lookup(&self, name: &str, out: &mut String, depth: usize) -> Result<(), SrcSrvError> {
        let key = name.to_ascii_uppercase();

        if let Some(variable) = self.variables.get(&key) {
            if depth >= self.max_depth {
                return Err(SrcSrvError::new(
                    SrcSrvErrorKind::RecursionLimit,
                    format!("while expanding {}", variable.name),
                ));
            }
            return self.eval(variable.expression.nodes(), out, depth + 1);
        }

        if let Some(field) = self.field(&key) {
            out.push_str(field);
        }

        Ok(())
    }

    /// Resolves `VAR1`, `VAR2`, ... to the fields of the record.
    fn field(&self, key: &str) -> Option<&'a str> {
        let number = key.strip_prefix("VAR")?;
        if number.starts_with('0') || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = number.parse::<usize>().ok()?;
        self.fields.get(index.checked_sub(1)?).copied()
    }

    fn eval(&self, nodes: &[Expr], out: &mut String, depth: usize) -> Result<(), SrcSrvError> {
        for node in nodes {
            match node {
                Expr::Literal(text) => out.push_str(text),
                Expr::Reference(name) => self.lookup(name, out, depth)?,
                Expr::Function(Function::Var, args) => {
                    let mut name = String::new();
                    self.eval(args, &mut name, depth)?;
                    self.lookup(&name, out, depth)?;
                }
                Expr::Function(Function::Backslash, args) => {
                    let start = out.len();
                    self.eval(args, out, depth)?;
                    let converted = to_backslashes(&out[start..]);
                    out.truncate(start);
                    out.push_str(&converted);
                }
                Expr::Function(Function::File, args) => {
                    let mut path = String::new();
                    self.eval(args, &mut path, depth)?;
                    out.push_str(file_name(&path));
                }
            }
        }

        Ok(())
    }
}

fn to_backslashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut separator = false;
    for c in path.chars() {
        if c == '/' || c == '\\' {
            if !separator {
                out.push('\\');
            }
            separator = true;
        } else {
            out.push(c);
            separator = false;
        }
    }
    out
}

fn file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(text: &str) -> Expr {
        Expr::Literal(text.to_owned())
    }

    fn reference(name: &str) -> Expr {
        Expr::Reference(name.to_owned())
    }

    fn variables(definitions: &[(&str, &str)]) -> IndexMap<String, Variable> {
        definitions
            .iter()
            .map(|&(name, value)| {
                let variable = Variable {
                    name: name.to_owned(),
                    value: value.to_owned(),
                    expression: Expression::parse(value).unwrap(),
                };
                (name.to_ascii_uppercase(), variable)
            })
            .collect()
    }

    #[test]
    fn test_parse_literal_and_references() {
        let expression = Expression::parse("%alias%/%var3% (x)").unwrap();
        assert_eq!(
            expression.nodes(),
            &[
                reference("alias"),
                literal("/"),
                reference("var3"),
                literal(" (x)"),
            ]
        );
    }

    #[test]
    fn test_parse_nested_functions() {
        let expression = Expression::parse("%fnbksl%(a/%fnfile%(%var1%))!").unwrap();
        assert_eq!(
            expression.nodes(),
            &[
                Expr::Function(
                    Function::Backslash,
                    vec![
                        literal("a/"),
                        Expr::Function(Function::File, vec![reference("var1")]),
                    ]
                ),
                literal("!"),
            ]
        );
    }

    #[test]
    fn test_parse_literal_before_close() {
        let expression = Expression::parse("%fnfile%(x/y.cs)").unwrap();
        assert_eq!(
            expression.nodes(),
            &[Expr::Function(Function::File, vec![literal("x/y.cs")])]
        );
    }

    #[test]
    fn test_function_names_ignore_case() {
        let expression = Expression::parse("%FnFile%(%var1%)").unwrap();
        assert_eq!(
            expression.nodes(),
            &[Expr::Function(Function::File, vec![reference("var1")])]
        );
    }

    #[test]
    fn test_parse_errors() {
        for value in ["a%%b", "%fnvar%x", "%fnvar%", "%fnbksl%(a"] {
            let error = Expression::parse(value).unwrap_err();
            assert_eq!(error.kind(), SrcSrvErrorKind::InvalidExpression, "{value}");
        }
    }

    #[test]
    fn test_unterminated_token_dropped() {
        let expression = Expression::parse("echo 50%").unwrap();
        assert_eq!(expression.nodes(), &[literal("echo 50")]);

        let expression = Expression::parse("%var1%/%name").unwrap();
        assert_eq!(expression.nodes(), &[reference("var1"), literal("/")]);

        let expression = Expression::parse("%fnfile%(%var1%)%").unwrap();
        assert_eq!(
            expression.nodes(),
            &[Expr::Function(Function::File, vec![reference("var1")])]
        );
    }

    #[test]
    fn test_evaluate_lookup_order() {
        let variables = variables(&[("TRG", "%var2%-%other%-%missing%"), ("OTHER", "o")]);
        let fields = ["one", "two"];
        let evaluator = Evaluator::new(&variables, &fields, 64);
        assert_eq!(evaluator.evaluate("trg").unwrap(), "two-o-");
    }

    #[test]
    fn test_evaluate_fnvar() {
        let variables = variables(&[("TRG", "%fnvar%(%var2%)"), ("SERVER", "http://x")]);
        let fields = ["a.cs", "server"];
        let evaluator = Evaluator::new(&variables, &fields, 64);
        assert_eq!(evaluator.evaluate("TRG").unwrap(), "http://x");
    }

    #[test]
    fn test_evaluate_path_functions() {
        let variables = variables(&[("TRG", "%fnbksl%(%var1%) %fnfile%(%var1%)")]);
        let fields = ["//a\\/b//c.cs"];
        let evaluator = Evaluator::new(&variables, &fields, 64);
        assert_eq!(evaluator.evaluate("TRG").unwrap(), "\\a\\b\\c.cs c.cs");
    }

    #[test]
    fn test_field_names() {
        let variables = IndexMap::new();
        let fields = ["a", "b"];
        let evaluator = Evaluator::new(&variables, &fields, 64);
        assert_eq!(evaluator.field("VAR2"), Some("b"));
        assert_eq!(evaluator.field("VAR0"), None);
        assert_eq!(evaluator.field("VAR02"), None);
        assert_eq!(evaluator.field("VAR3"), None);
        assert_eq!(evaluator.field("VARX"), None);
    }

    #[test]
    fn test_evaluate_cycle() {
        let variables = variables(&[("A", "%b%"), ("B", "x%a%")]);
        let evaluator = Evaluator::new(&variables, &[], 64);
        let error = evaluator.evaluate("A").unwrap_err();
        assert_eq!(error.kind(), SrcSrvErrorKind::RecursionLimit);
    }
}
