//! Recursive-descent parser: token stream to AST, one method per grammar
//! production, standard XPath 1.0 precedence. Function arity is checked
//! here so arity mistakes surface as parse errors with a position.

use std::iter::Peekable;
use std::rc::Rc;

use crate::error::XPathError;
use crate::xpath::expressions::{
    And, Arithmetic, ArithmeticOp, Comparison, ComparisonOp, ContextNode, Expression,
    ExpressionArg, Filter, FunctionCall, Literal, Negate, Or, Path, RootNode, Step, Union,
    VariableRef,
};
use crate::xpath::functions;
use crate::xpath::nodetest::{self, NodeTest};
use crate::xpath::parser::Tokenizer;
use crate::xpath::tokens::{AxisName, ExprToken, NodeTypeTest, Operator, Token};
use crate::xpath::value::Value;

type ParseOutcome = Result<ExpressionArg, XPathError>;

pub struct Factory {
    steps: Stepper,
}

impl Factory {
    pub fn new<S: Into<String>>(expr: S) -> Result<Self, XPathError> {
        let expr = expr.into();
        let end = expr.chars().count();
        let tokens = Tokenizer::new(expr).collect_tokens()?;
        Ok(Factory {
            steps: Stepper::new(tokens, end),
        })
    }

    /// Parses the whole expression; trailing tokens are an error.
    pub fn produce(mut self) -> Result<Rc<dyn Expression>, XPathError> {
        if !self.steps.has_more_tokens() {
            return Err(XPathError::invalid(0, "empty expression"));
        }
        let expr = self.parse_expression()?;
        if let Some(stray) = self.steps.peek() {
            return Err(XPathError::invalid(
                stray.position,
                format!("unexpected token {:?}", stray.kind),
            ));
        }
        Ok(Rc::from(expr))
    }

    // Expr              ::= OrExpr
    fn parse_expression(&mut self) -> ParseOutcome {
        self.parse_or_expression()
    }

    // OrExpr            ::= AndExpr | Self 'or' AndExpr
    fn parse_or_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_and_expression()?;
        while self.steps.consume_operator(Operator::Or) {
            let right = self.parse_and_expression()?;
            left = Box::new(Or::new(left, right));
        }
        Ok(left)
    }

    // AndExpr           ::= EqualityExpr | Self 'and' EqualityExpr
    fn parse_and_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_equality_expression()?;
        while self.steps.consume_operator(Operator::And) {
            let right = self.parse_equality_expression()?;
            left = Box::new(And::new(left, right));
        }
        Ok(left)
    }

    // EqualityExpr      ::= RelationalExpr | Self '=' ... | Self '!=' ...
    fn parse_equality_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_relational_expression()?;
        loop {
            let op = if self.steps.consume_operator(Operator::Equal) {
                ComparisonOp::Equal
            } else if self.steps.consume_operator(Operator::DoesNotEqual) {
                ComparisonOp::NotEqual
            } else {
                return Ok(left);
            };
            let right = self.parse_relational_expression()?;
            left = Box::new(Comparison::new(op, left, right));
        }
    }

    // RelationalExpr    ::= AdditiveExpr | Self '<' ... | '>' | '<=' | '>='
    fn parse_relational_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_additive_expression()?;
        loop {
            let op = if self.steps.consume_operator(Operator::LessThan) {
                ComparisonOp::LessThan
            } else if self.steps.consume_operator(Operator::LessThanOrEqual) {
                ComparisonOp::LessThanOrEqual
            } else if self.steps.consume_operator(Operator::GreaterThan) {
                ComparisonOp::GreaterThan
            } else if self.steps.consume_operator(Operator::GreaterThanOrEqual) {
                ComparisonOp::GreaterThanOrEqual
            } else {
                return Ok(left);
            };
            let right = self.parse_additive_expression()?;
            left = Box::new(Comparison::new(op, left, right));
        }
    }

    // AdditiveExpr      ::= MultiplicativeExpr | Self '+' ... | Self '-' ...
    fn parse_additive_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let op = if self.steps.consume_operator(Operator::Plus) {
                ArithmeticOp::Add
            } else if self.steps.consume_operator(Operator::Minus) {
                ArithmeticOp::Subtract
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative_expression()?;
            left = Box::new(Arithmetic::new(op, left, right));
        }
    }

    // MultiplicativeExpr ::= UnaryExpr | Self '*' | 'div' | 'mod' ...
    fn parse_multiplicative_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_unary_expression()?;
        loop {
            let op = if self.steps.consume_operator(Operator::Multiply) {
                ArithmeticOp::Multiply
            } else if self.steps.consume_operator(Operator::Div) {
                ArithmeticOp::Divide
            } else if self.steps.consume_operator(Operator::Mod) {
                ArithmeticOp::Modulo
            } else {
                return Ok(left);
            };
            let right = self.parse_unary_expression()?;
            left = Box::new(Arithmetic::new(op, left, right));
        }
    }

    // UnaryExpr         ::= UnionExpr | '-' Self
    fn parse_unary_expression(&mut self) -> ParseOutcome {
        if self.steps.consume_operator(Operator::Minus) {
            let operand = self.parse_unary_expression()?;
            return Ok(Box::new(Negate(operand)));
        }
        self.parse_union_expression()
    }

    // UnionExpr         ::= PathExpr | Self '|' PathExpr
    fn parse_union_expression(&mut self) -> ParseOutcome {
        let mut left = self.parse_path_expression()?;
        while self.steps.consume_operator(Operator::Pipe) {
            let right = self.parse_path_expression()?;
            left = Box::new(Union::new(left, right));
        }
        Ok(left)
    }

    // PathExpr          ::= LocationPath
    //                     | FilterExpr
    //                     | FilterExpr '/' RelativeLocationPath
    //                     | FilterExpr '//' RelativeLocationPath
    fn parse_path_expression(&mut self) -> ParseOutcome {
        let starts_filter = matches!(
            self.steps.peek_kind(),
            Some(
                ExprToken::Literal(_)
                    | ExprToken::Number(_)
                    | ExprToken::VariableReference(_)
                    | ExprToken::LeftParen
                    | ExprToken::FunctionName(_)
            )
        );
        if !starts_filter {
            return self.parse_location_path();
        }

        let primary = self.parse_primary_expression()?;
        let predicates = self.parse_predicate_expressions()?;
        let filter: ExpressionArg = if predicates.is_empty() {
            primary
        } else {
            Box::new(Filter::new(primary, predicates))
        };

        if self.steps.consume_operator(Operator::ForwardSlash) {
            let steps = self.parse_relative_steps()?;
            Ok(Box::new(Path::new(filter, steps)))
        } else if self.steps.consume_operator(Operator::DoubleForwardSlash) {
            let mut steps = vec![descendant_or_self_step()];
            steps.extend(self.parse_relative_steps()?);
            Ok(Box::new(Path::new(filter, steps)))
        } else {
            Ok(filter)
        }
    }

    // LocationPath      ::= RelativeLocationPath | AbsoluteLocationPath
    fn parse_location_path(&mut self) -> ParseOutcome {
        if self.steps.consume_operator(Operator::ForwardSlash) {
            // '/' alone selects the root.
            if self.peek_starts_step() {
                let steps = self.parse_relative_steps()?;
                Ok(Box::new(Path::new(Box::new(RootNode), steps)))
            } else {
                Ok(Box::new(Path::new(Box::new(RootNode), Vec::new())))
            }
        } else if self.steps.consume_operator(Operator::DoubleForwardSlash) {
            let mut steps = vec![descendant_or_self_step()];
            steps.extend(self.parse_relative_steps()?);
            Ok(Box::new(Path::new(Box::new(RootNode), steps)))
        } else if self.peek_starts_step() {
            let steps = self.parse_relative_steps()?;
            Ok(Box::new(Path::new(Box::new(ContextNode), steps)))
        } else {
            Err(XPathError::invalid(
                self.steps.current_position(),
                "expected an expression",
            ))
        }
    }

    fn peek_starts_step(&mut self) -> bool {
        matches!(
            self.steps.peek_kind(),
            Some(
                ExprToken::Period
                    | ExprToken::ParentNode
                    | ExprToken::AtSign
                    | ExprToken::Axis(_)
                    | ExprToken::NameTest(_)
                    | ExprToken::NodeType(_)
            )
        )
    }

    // RelativeLocationPath ::= Step | Self '/' Step | Self '//' Step
    fn parse_relative_steps(&mut self) -> Result<Vec<Step>, XPathError> {
        let mut steps = vec![self.parse_step()?];
        loop {
            if self.steps.consume_operator(Operator::ForwardSlash) {
                steps.push(self.parse_step()?);
            } else if self.steps.consume_operator(Operator::DoubleForwardSlash) {
                // '//' abbreviates '/descendant-or-self::node()/'.
                steps.push(descendant_or_self_step());
                steps.push(self.parse_step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    // Step              ::= AxisSpecifier NodeTest Predicate* | '.' | '..'
    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.steps.consume_kind(&ExprToken::Period) {
            return Ok(Step::new(AxisName::SelfAxis, Box::new(nodetest::Node), Vec::new()));
        }
        if self.steps.consume_kind(&ExprToken::ParentNode) {
            return Ok(Step::new(AxisName::Parent, Box::new(nodetest::Node), Vec::new()));
        }

        // AxisSpecifier ::= AxisName '::' | '@'?
        let axis = match self.steps.peek_kind() {
            Some(ExprToken::Axis(_)) => match self.steps.next() {
                Some(Token {
                    kind: ExprToken::Axis(axis),
                    ..
                }) => axis,
                _ => unreachable!("peeked an axis token"),
            },
            Some(ExprToken::AtSign) => {
                self.steps.next();
                AxisName::Attribute
            }
            _ => AxisName::Child,
        };

        let node_test = self.parse_node_test(axis)?;
        let predicates = self.parse_predicate_expressions()?;
        Ok(Step::new(axis, node_test, predicates))
    }

    // NodeTest          ::= NameTest | NodeType '(' ')'
    //                     | 'processing-instruction' '(' Literal ')'
    fn parse_node_test(&mut self, axis: AxisName) -> Result<Box<dyn NodeTest>, XPathError> {
        match self.steps.peek_kind() {
            Some(ExprToken::NameTest(_)) => match self.steps.next() {
                Some(Token {
                    kind: ExprToken::NameTest(test),
                    ..
                }) => Ok(Box::new(nodetest::Name::new(
                    axis.principal_node_type(),
                    test,
                ))),
                _ => unreachable!("peeked a name test"),
            },
            Some(ExprToken::NodeType(_)) => {
                let token = self.steps.next().expect("peeked a node type");
                let ExprToken::NodeType(node_type) = token.kind else {
                    unreachable!("peeked a node type");
                };
                self.steps.expect_kind(&ExprToken::LeftParen)?;
                let test: Box<dyn NodeTest> = match node_type {
                    NodeTypeTest::Node => Box::new(nodetest::Node),
                    NodeTypeTest::Text => Box::new(nodetest::Text),
                    NodeTypeTest::Comment => Box::new(nodetest::Comment),
                    NodeTypeTest::ProcessingInstruction => {
                        let target = match self.steps.peek_kind() {
                            Some(ExprToken::Literal(_)) => match self.steps.next() {
                                Some(Token {
                                    kind: ExprToken::Literal(target),
                                    ..
                                }) => Some(target),
                                _ => unreachable!("peeked a literal"),
                            },
                            _ => None,
                        };
                        Box::new(nodetest::ProcessingInstruction::new(target))
                    }
                };
                self.steps.expect_kind(&ExprToken::RightParen)?;
                Ok(test)
            }
            _ => Err(XPathError::invalid(
                self.steps.current_position(),
                "expected a node test",
            )),
        }
    }

    // PrimaryExpr       ::= VariableReference | '(' Expr ')' | Literal
    //                     | Number | FunctionCall
    fn parse_primary_expression(&mut self) -> ParseOutcome {
        let token = self.steps.next().ok_or_else(|| {
            XPathError::invalid(self.steps.current_position(), "expected an expression")
        })?;

        match token.kind {
            ExprToken::Literal(value) => Ok(Box::new(Literal::from(Value::String(value)))),
            ExprToken::Number(value) => Ok(Box::new(Literal::from(Value::Number(value)))),
            ExprToken::VariableReference(var_name) => Ok(Box::new(VariableRef(var_name))),
            ExprToken::LeftParen => {
                let inner = self.parse_expression()?;
                self.steps.expect_kind(&ExprToken::RightParen)?;
                Ok(inner)
            }
            ExprToken::FunctionName(fn_name) => self.parse_function_call(fn_name, token.position),
            other => Err(XPathError::invalid(
                token.position,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    // FunctionCall      ::= FunctionName '(' ( Argument ( ',' Argument )* )? ')'
    fn parse_function_call(&mut self, fn_name: String, position: usize) -> ParseOutcome {
        self.steps.expect_kind(&ExprToken::LeftParen)?;

        let mut args: Vec<ExpressionArg> = Vec::new();
        if !self.steps.consume_kind(&ExprToken::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.steps.consume_kind(&ExprToken::Comma) {
                    continue;
                }
                self.steps.expect_kind(&ExprToken::RightParen)?;
                break;
            }
        }

        let (function, min_args, max_args) = functions::signature(&fn_name)
            .ok_or_else(|| {
                XPathError::invalid(position, format!("unknown function '{fn_name}'"))
            })?;
        let arity_ok =
            args.len() >= min_args && max_args.map_or(true, |max| args.len() <= max);
        if !arity_ok {
            return Err(XPathError::invalid(
                position,
                format!(
                    "{fn_name}() takes {min_args}{} argument(s), got {}",
                    match max_args {
                        Some(max) if max == min_args => String::new(),
                        Some(max) => format!("..{max}"),
                        None => "+".to_owned(),
                    },
                    args.len()
                ),
            ));
        }

        Ok(Box::new(FunctionCall::new(fn_name, function, args)))
    }

    // Predicate         ::= '[' PredicateExpr ']'
    fn parse_predicate_expressions(&mut self) -> Result<Vec<ExpressionArg>, XPathError> {
        let mut predicates = Vec::new();
        while self.steps.consume_kind(&ExprToken::LeftBracket) {
            predicates.push(self.parse_expression()?);
            self.steps.expect_kind(&ExprToken::RightBracket)?;
        }
        Ok(predicates)
    }
}

fn descendant_or_self_step() -> Step {
    Step::new(
        AxisName::DescendantOrSelf,
        Box::new(nodetest::Node),
        Vec::new(),
    )
}

pub struct Stepper {
    tokens: Peekable<std::vec::IntoIter<Token>>,
    /// Offset just past the expression, reported when input runs dry.
    end: usize,
}

impl Stepper {
    fn new(tokens: Vec<Token>, end: usize) -> Self {
        Stepper {
            tokens: tokens.into_iter().peekable(),
            end,
        }
    }

    fn has_more_tokens(&mut self) -> bool {
        self.tokens.peek().is_some()
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek()
    }

    fn peek_kind(&mut self) -> Option<&ExprToken> {
        self.tokens.peek().map(|token| &token.kind)
    }

    fn next(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    /// Where an error should point when the stream is exhausted.
    fn current_position(&mut self) -> usize {
        self.tokens
            .peek()
            .map(|token| token.position)
            .unwrap_or(self.end)
    }

    fn consume_operator(&mut self, op: Operator) -> bool {
        self.consume_kind(&ExprToken::Operator(op))
    }

    fn consume_kind(&mut self, kind: &ExprToken) -> bool {
        if self.peek_kind() == Some(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: &ExprToken) -> Result<Token, XPathError> {
        let position = self.current_position();
        match self.next() {
            Some(token) if &token.kind == kind => Ok(token),
            Some(token) => Err(XPathError::invalid(
                token.position,
                format!("expected {kind:?}, found {:?}", token.kind),
            )),
            None => Err(XPathError::invalid(position, format!("expected {kind:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &str) -> Result<Rc<dyn Expression>, XPathError> {
        Factory::new(expr)?.produce()
    }

    #[test]
    fn accepts_the_grammar() {
        for expr in [
            "/",
            "//para",
            "chapter//para",
            "child::para[position() = last()]",
            "../@lang",
            "book/author[degree and award]",
            "-1 + 2 * 3 div 4 mod 5",
            "a | b | c",
            "(//a)[1]",
            "string-length(normalize-space(.)) > 0",
            "processing-instruction('pi')/following::*",
            "$var = 'x' or not($var)",
            "id('a b')/parent::node()",
        ] {
            assert!(compile(expr).is_ok(), "failed to parse {expr}");
        }
    }

    #[test]
    fn rejects_broken_expressions() {
        for expr in ["", "/..[", "a[", "foo(", "a b", "..::x", "1 +", "child::"] {
            assert!(compile(expr).is_err(), "accepted {expr}");
        }
    }

    #[test]
    fn arity_is_checked_at_parse_time() {
        assert!(compile("true()").is_ok());
        let err = compile("true(1)").unwrap_err();
        assert!(matches!(err, XPathError::InvalidExpression { .. }));
        assert!(compile("concat('a')").is_err());
        assert!(compile("concat('a', 'b', 'c', 'd')").is_ok());
        assert!(compile("substring('a', 1, 2, 3)").is_err());
    }

    #[test]
    fn unknown_functions_error_with_position() {
        let err = compile("1 + nope()").unwrap_err();
        assert!(
            matches!(err, XPathError::InvalidExpression { position: 4, .. }),
            "{err:?}"
        );
    }
}
