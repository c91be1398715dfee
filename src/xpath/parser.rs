//! The XPath lexer: expression text to a stream of position-stamped
//! tokens. `*` and the named operators are disambiguated by what the
//! previous token was, string literals keep their quotes out of the value,
//! and anything unscannable becomes an `InvalidExpression` carrying the
//! offending offset.

use crate::error::XPathError;
use crate::name;
use crate::xpath::tokens::{AxisName, ExprToken, NameTest, NodeTypeTest, Operator, Token};

pub type Id<T> = (&'static str, T);

pub static DOUBLE_CHAR_TOKENS: [Id<ExprToken>; 5] = [
    ("<=", ExprToken::Operator(Operator::LessThanOrEqual)),
    (">=", ExprToken::Operator(Operator::GreaterThanOrEqual)),
    ("!=", ExprToken::Operator(Operator::DoesNotEqual)),
    ("//", ExprToken::Operator(Operator::DoubleForwardSlash)),
    ("..", ExprToken::ParentNode),
];

pub static SINGLE_CHAR_TOKENS: [Id<ExprToken>; 13] = [
    ("/", ExprToken::Operator(Operator::ForwardSlash)),
    ("(", ExprToken::LeftParen),
    (")", ExprToken::RightParen),
    ("[", ExprToken::LeftBracket),
    ("]", ExprToken::RightBracket),
    ("@", ExprToken::AtSign),
    ("+", ExprToken::Operator(Operator::Plus)),
    ("-", ExprToken::Operator(Operator::Minus)),
    ("|", ExprToken::Operator(Operator::Pipe)),
    ("=", ExprToken::Operator(Operator::Equal)),
    ("<", ExprToken::Operator(Operator::LessThan)),
    (">", ExprToken::Operator(Operator::GreaterThan)),
    (",", ExprToken::Comma),
];

pub static NAMED_OPERATORS: [Id<Operator>; 4] = [
    ("and", Operator::And),
    ("or", Operator::Or),
    ("mod", Operator::Mod),
    ("div", Operator::Div),
];

pub static AXES: [Id<AxisName>; 13] = [
    ("ancestor-or-self", AxisName::AncestorOrSelf),
    ("ancestor", AxisName::Ancestor),
    ("attribute", AxisName::Attribute),
    ("child", AxisName::Child),
    ("descendant-or-self", AxisName::DescendantOrSelf),
    ("descendant", AxisName::Descendant),
    ("following-sibling", AxisName::FollowingSibling),
    ("following", AxisName::Following),
    ("namespace", AxisName::Namespace),
    ("parent", AxisName::Parent),
    ("preceding-sibling", AxisName::PrecedingSibling),
    ("preceding", AxisName::Preceding),
    ("self", AxisName::SelfAxis),
];

pub static NODE_TYPES: [Id<NodeTypeTest>; 4] = [
    ("comment", NodeTypeTest::Comment),
    ("text", NodeTypeTest::Text),
    ("processing-instruction", NodeTypeTest::ProcessingInstruction),
    ("node", NodeTypeTest::Node),
];

pub type TokenResult = Result<Token, XPathError>;

pub struct Tokenizer {
    xpath: Vec<char>,
    pos: usize,
    /// The previously emitted token decides whether `*` / `and` / `or` /
    /// `div` / `mod` read as operators.
    prev_ends_operand: bool,
}

impl Tokenizer {
    pub fn new<S: Into<String>>(xpath: S) -> Tokenizer {
        Tokenizer {
            xpath: xpath.into().chars().collect(),
            pos: 0,
            prev_ends_operand: false,
        }
    }

    pub fn is_finished(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.xpath.len()
    }

    /// Drains the whole expression; the first scan error aborts.
    pub fn collect_tokens(mut self) -> Result<Vec<Token>, XPathError> {
        let mut tokens = Vec::new();
        while !self.is_finished() {
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self
            .xpath
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.xpath.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, at: usize, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.xpath.get(at + i) == Some(&c))
    }

    pub fn next_token(&mut self) -> TokenResult {
        self.skip_whitespace();
        let position = self.pos;

        let kind = self
            .scan_double_char()
            .map(Ok)
            .or_else(|| self.scan_literal().transpose())
            .or_else(|| self.scan_number().map(Ok))
            .or_else(|| self.scan_star().map(Ok))
            .or_else(|| self.scan_single_char().map(Ok))
            .or_else(|| self.scan_variable_reference().transpose())
            .or_else(|| self.scan_name(position).transpose())
            .unwrap_or_else(|| {
                self.pos = self.xpath.len();
                Err(XPathError::invalid(position, "unrecognized character"))
            })?;

        self.prev_ends_operand = kind.ends_operand();
        Ok(Token { kind, position })
    }

    fn scan_double_char(&mut self) -> Option<ExprToken> {
        for (pattern, token) in &DOUBLE_CHAR_TOKENS {
            if self.starts_with(self.pos, pattern) {
                self.pos += 2;
                return Some(token.clone());
            }
        }
        None
    }

    fn scan_single_char(&mut self) -> Option<ExprToken> {
        let c = self.peek(0)?;
        if c == '.' {
            self.pos += 1;
            return Some(ExprToken::Period);
        }
        for (pattern, token) in &SINGLE_CHAR_TOKENS {
            if pattern.chars().next() == Some(c) {
                self.pos += 1;
                return Some(token.clone());
            }
        }
        None
    }

    fn scan_star(&mut self) -> Option<ExprToken> {
        if self.peek(0)? != '*' {
            return None;
        }
        self.pos += 1;
        if self.prev_ends_operand {
            Some(ExprToken::Operator(Operator::Multiply))
        } else {
            Some(ExprToken::NameTest(NameTest::any()))
        }
    }

    // "[^"]*" | '[^']*'
    fn scan_literal(&mut self) -> Result<Option<ExprToken>, XPathError> {
        let quote = match self.peek(0) {
            Some(c @ ('"' | '\'')) => c,
            _ => return Ok(None),
        };
        let start = self.pos;
        let mut end = self.pos + 1;
        while let Some(c) = self.xpath.get(end) {
            if *c == quote {
                let value: String = self.xpath[self.pos + 1..end].iter().collect();
                self.pos = end + 1;
                return Ok(Some(ExprToken::Literal(value)));
            }
            end += 1;
        }
        self.pos = self.xpath.len();
        Err(XPathError::invalid(start, "unterminated string literal"))
    }

    // Digits ('.' Digits?)? | '.' Digits
    fn scan_number(&mut self) -> Option<ExprToken> {
        let first = self.peek(0)?;
        let starts_number = first.is_ascii_digit()
            || (first == '.' && self.peek(1).is_some_and(|c| c.is_ascii_digit()));
        if !starts_number {
            return None;
        }

        let start = self.pos;
        let mut seen_dot = false;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.xpath[start..self.pos].iter().collect();
        text.parse().ok().map(ExprToken::Number)
    }

    // '$' QName
    fn scan_variable_reference(&mut self) -> Result<Option<ExprToken>, XPathError> {
        if self.peek(0) != Some('$') {
            return Ok(None);
        }
        let position = self.pos;
        self.pos += 1;
        match self.scan_qname() {
            Some((prefix, local)) => {
                let qname = match prefix {
                    Some(prefix) => format!("{prefix}:{local}"),
                    None => local,
                };
                Ok(Some(ExprToken::VariableReference(qname)))
            }
            None => {
                self.pos = self.xpath.len();
                Err(XPathError::invalid(position, "'$' without a variable name"))
            }
        }
    }

    fn scan_ncname(&mut self) -> Option<String> {
        let first = self.peek(0)?;
        if first == ':' || !name::is_name_start_char(first) {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        while self
            .peek(0)
            .is_some_and(|c| c != ':' && name::is_name_char(c))
        {
            self.pos += 1;
        }
        Some(self.xpath[start..self.pos].iter().collect())
    }

    /// `NCName (':' (NCName | '*'))?`; the wildcard local comes back as
    /// a literal `*`.
    fn scan_qname(&mut self) -> Option<(Option<String>, String)> {
        let first = self.scan_ncname()?;
        if self.peek(0) != Some(':') || self.peek(1) == Some(':') {
            return Some((None, first));
        }
        // Only consume the colon when a local part actually follows.
        if self.peek(1) == Some('*') {
            self.pos += 2;
            return Some((Some(first), "*".into()));
        }
        let checkpoint = self.pos;
        self.pos += 1;
        match self.scan_ncname() {
            Some(local) => Some((Some(first), local)),
            None => {
                self.pos = checkpoint;
                Some((None, first))
            }
        }
    }

    /// NCName-led tokens: named operators, axis specifiers, node types,
    /// function names and name tests, in that precedence.
    fn scan_name(&mut self, position: usize) -> Result<Option<ExprToken>, XPathError> {
        if self.prev_ends_operand {
            for (pattern, op) in &NAMED_OPERATORS {
                if self.starts_with(self.pos, pattern) {
                    let after = self.peek(pattern.len());
                    if !after.is_some_and(name::is_name_char) {
                        self.pos += pattern.len();
                        return Ok(Some(ExprToken::Operator(*op)));
                    }
                }
            }
        }

        let Some((prefix, local)) = self.scan_qname() else {
            return Ok(None);
        };

        // Whitespace may separate the name from a following '::' or '('.
        let mut lookahead = self.pos;
        while self
            .xpath
            .get(lookahead)
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            lookahead += 1;
        }

        if self.starts_with(lookahead, "::") {
            if prefix.is_some() {
                return Err(XPathError::invalid(position, "axis names have no prefix"));
            }
            let axis = AXES
                .iter()
                .find(|(pattern, _)| *pattern == local)
                .map(|(_, axis)| *axis)
                .ok_or_else(|| {
                    XPathError::invalid(position, format!("unknown axis '{local}'"))
                })?;
            self.pos = lookahead + 2;
            return Ok(Some(ExprToken::Axis(axis)));
        }

        if self.xpath.get(lookahead) == Some(&'(') {
            if prefix.is_none() {
                if let Some((_, node_type)) =
                    NODE_TYPES.iter().find(|(pattern, _)| *pattern == local)
                {
                    return Ok(Some(ExprToken::NodeType(*node_type)));
                }
            }
            let qname = match prefix {
                Some(prefix) => format!("{prefix}:{local}"),
                None => local,
            };
            return Ok(Some(ExprToken::FunctionName(qname)));
        }

        Ok(Some(ExprToken::NameTest(NameTest { prefix, local })))
    }
}

impl Iterator for Tokenizer {
    type Item = TokenResult;

    fn next(&mut self) -> Option<TokenResult> {
        if self.is_finished() {
            None
        } else {
            Some(self.next_token())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expr: &str) -> Vec<ExprToken> {
        Tokenizer::new(expr)
            .collect_tokens()
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn scans_path_tokens() {
        assert_eq!(
            kinds("//chapter/title"),
            vec![
                ExprToken::Operator(Operator::DoubleForwardSlash),
                ExprToken::NameTest(NameTest {
                    prefix: None,
                    local: "chapter".into()
                }),
                ExprToken::Operator(Operator::ForwardSlash),
                ExprToken::NameTest(NameTest {
                    prefix: None,
                    local: "title".into()
                }),
            ]
        );
    }

    #[test]
    fn star_is_context_sensitive() {
        // After an operand '*' multiplies; elsewhere it is a name test.
        assert_eq!(
            kinds("2 * 3"),
            vec![
                ExprToken::Number(2.0),
                ExprToken::Operator(Operator::Multiply),
                ExprToken::Number(3.0),
            ]
        );
        assert_eq!(
            kinds("child::*"),
            vec![
                ExprToken::Axis(AxisName::Child),
                ExprToken::NameTest(NameTest::any()),
            ]
        );
    }

    #[test]
    fn named_operators_are_context_sensitive() {
        assert_eq!(
            kinds("1 div 2 mod 3"),
            vec![
                ExprToken::Number(1.0),
                ExprToken::Operator(Operator::Div),
                ExprToken::Number(2.0),
                ExprToken::Operator(Operator::Mod),
                ExprToken::Number(3.0),
            ]
        );
        // At expression start 'div' is an element name.
        assert_eq!(
            kinds("div"),
            vec![ExprToken::NameTest(NameTest {
                prefix: None,
                local: "div".into()
            })]
        );
    }

    #[test]
    fn axes_and_node_types() {
        assert_eq!(
            kinds("preceding-sibling::node()"),
            vec![
                ExprToken::Axis(AxisName::PrecedingSibling),
                ExprToken::NodeType(NodeTypeTest::Node),
                ExprToken::LeftParen,
                ExprToken::RightParen,
            ]
        );
        assert_eq!(
            kinds("self ::a"),
            vec![
                ExprToken::Axis(AxisName::SelfAxis),
                ExprToken::NameTest(NameTest {
                    prefix: None,
                    local: "a".into()
                }),
            ]
        );
    }

    #[test]
    fn literals_numbers_and_variables() {
        assert_eq!(
            kinds(r#"concat("a", 'b', $x, 1.5, .25)"#),
            vec![
                ExprToken::FunctionName("concat".into()),
                ExprToken::LeftParen,
                ExprToken::Literal("a".into()),
                ExprToken::Comma,
                ExprToken::Literal("b".into()),
                ExprToken::Comma,
                ExprToken::VariableReference("x".into()),
                ExprToken::Comma,
                ExprToken::Number(1.5),
                ExprToken::Comma,
                ExprToken::Number(0.25),
                ExprToken::RightParen,
            ]
        );
    }

    #[test]
    fn prefixed_name_tests() {
        assert_eq!(
            kinds("p:item | q:*"),
            vec![
                ExprToken::NameTest(NameTest {
                    prefix: Some("p".into()),
                    local: "item".into()
                }),
                ExprToken::Operator(Operator::Pipe),
                ExprToken::NameTest(NameTest {
                    prefix: Some("q".into()),
                    local: "*".into()
                }),
            ]
        );
    }

    #[test]
    fn errors_carry_positions() {
        let err = Tokenizer::new("foo('bar").collect_tokens().unwrap_err();
        assert_eq!(
            err,
            XPathError::invalid(4, "unterminated string literal")
        );

        let err = Tokenizer::new("a # b").collect_tokens().unwrap_err();
        assert!(matches!(
            err,
            XPathError::InvalidExpression { position: 2, .. }
        ));
    }
}
