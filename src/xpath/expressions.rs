// https://www.w3.org/TR/1999/REC-xpath-19991116/#section-Expressions
//
// Expression evaluation occurs with respect to a context: a node, a pair
// of positive integers (position and size), variable bindings, a function
// library and in-scope namespace declarations.

use std::fmt;

use crate::error::XPathError;
use crate::node::NodeRef;
use crate::xpath::context::{axis_nodes, Evaluation};
use crate::xpath::functions;
use crate::xpath::nodetest::NodeTest;
use crate::xpath::tokens::AxisName;
use crate::xpath::value::{string_value, Nodeset, Value};

pub type ExpressionArg = Box<dyn Expression>;

type EvalResult = Result<Value, XPathError>;

pub trait Expression: fmt::Debug {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult;
}

// Operations

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOp {
    fn holds_numbers(&self, left: f64, right: f64) -> bool {
        match self {
            ComparisonOp::Equal => left == right,
            ComparisonOp::NotEqual => left != right,
            ComparisonOp::LessThan => left < right,
            ComparisonOp::LessThanOrEqual => left <= right,
            ComparisonOp::GreaterThan => left > right,
            ComparisonOp::GreaterThanOrEqual => left >= right,
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, ComparisonOp::Equal | ComparisonOp::NotEqual)
    }
}

/// `=`, `!=`, `<`, `<=`, `>`, `>=` with the XPath coercion matrix:
/// node-sets compare existentially through string-values, booleans
/// dominate equality, numbers dominate the rest.
#[derive(Debug)]
pub struct Comparison {
    op: ComparisonOp,
    left: ExpressionArg,
    right: ExpressionArg,
}

impl Comparison {
    pub fn new(op: ComparisonOp, left: ExpressionArg, right: ExpressionArg) -> Self {
        Self { op, left, right }
    }

    fn holds(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodeset(a), Value::Nodeset(b)) => {
                if self.op.is_equality() {
                    a.iter().any(|na| {
                        let sa = string_value(na);
                        b.iter()
                            .any(|nb| self.op.holds_strings(&sa, &string_value(nb)))
                    })
                } else {
                    a.iter().any(|na| {
                        let na = crate::xpath::value::parse_number(&string_value(na));
                        b.iter().any(|nb| {
                            self.op.holds_numbers(
                                na,
                                crate::xpath::value::parse_number(&string_value(nb)),
                            )
                        })
                    })
                }
            }

            // A node-set against a boolean converts as a whole, never
            // per node.
            (Value::Nodeset(_), Value::Boolean(_)) | (Value::Boolean(_), Value::Nodeset(_)) => {
                self.holds_plain(&Value::Boolean(left.boolean()), &Value::Boolean(right.boolean()))
            }

            (Value::Nodeset(set), other) | (other, Value::Nodeset(set)) => {
                let flipped = matches!(right, Value::Nodeset(_)) && !matches!(left, Value::Nodeset(_));
                set.iter().any(|node| {
                    let node_value = Value::String(string_value(node));
                    let (a, b) = if flipped {
                        (other, &node_value)
                    } else {
                        (&node_value, other)
                    };
                    self.holds_plain(a, b)
                })
            }

            (a, b) => self.holds_plain(a, b),
        }
    }

    /// Comparison between two non-node-set values.
    fn holds_plain(&self, left: &Value, right: &Value) -> bool {
        if !self.op.is_equality() {
            return self.op.holds_numbers(left.number(), right.number());
        }
        match (left, right) {
            (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                self.op.holds_booleans(left.boolean(), right.boolean())
            }
            (Value::Number(_), _) | (_, Value::Number(_)) => {
                self.op.holds_numbers(left.number(), right.number())
            }
            _ => self.op.holds_strings(&left.string(), &right.string()),
        }
    }
}

impl ComparisonOp {
    fn holds_strings(&self, left: &str, right: &str) -> bool {
        match self {
            ComparisonOp::Equal => left == right,
            ComparisonOp::NotEqual => left != right,
            _ => self.holds_numbers(
                crate::xpath::value::parse_number(left),
                crate::xpath::value::parse_number(right),
            ),
        }
    }

    fn holds_booleans(&self, left: bool, right: bool) -> bool {
        let as_number = |v: bool| if v { 1.0 } else { 0.0 };
        match self {
            ComparisonOp::Equal => left == right,
            ComparisonOp::NotEqual => left != right,
            _ => self.holds_numbers(as_number(left), as_number(right)),
        }
    }
}

impl Expression for Comparison {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let left = self.left.eval(eval)?;
        let right = self.right.eval(eval)?;
        Ok(Value::Boolean(self.holds(&left, &right)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// IEEE 754 arithmetic; `div` by zero gives an infinity, `mod` takes the
/// dividend's sign.
#[derive(Debug)]
pub struct Arithmetic {
    op: ArithmeticOp,
    left: ExpressionArg,
    right: ExpressionArg,
}

impl Arithmetic {
    pub fn new(op: ArithmeticOp, left: ExpressionArg, right: ExpressionArg) -> Self {
        Self { op, left, right }
    }
}

impl Expression for Arithmetic {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let left = self.left.eval(eval)?.number();
        let right = self.right.eval(eval)?.number();
        let result = match self.op {
            ArithmeticOp::Add => left + right,
            ArithmeticOp::Subtract => left - right,
            ArithmeticOp::Multiply => left * right,
            ArithmeticOp::Divide => left / right,
            ArithmeticOp::Modulo => left % right,
        };
        Ok(Value::Number(result))
    }
}

#[derive(Debug)]
pub struct And {
    left: ExpressionArg,
    right: ExpressionArg,
}

impl And {
    pub fn new(left: ExpressionArg, right: ExpressionArg) -> Self {
        Self { left, right }
    }
}

impl Expression for And {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let left = self.left.eval(eval)?.boolean();
        if !left {
            return Ok(Value::Boolean(false));
        }
        Ok(Value::Boolean(self.right.eval(eval)?.boolean()))
    }
}

#[derive(Debug)]
pub struct Or {
    left: ExpressionArg,
    right: ExpressionArg,
}

impl Or {
    pub fn new(left: ExpressionArg, right: ExpressionArg) -> Self {
        Self { left, right }
    }
}

impl Expression for Or {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let left = self.left.eval(eval)?.boolean();
        if left {
            return Ok(Value::Boolean(true));
        }
        Ok(Value::Boolean(self.right.eval(eval)?.boolean()))
    }
}

/// Unary minus.
#[derive(Debug)]
pub struct Negate(pub ExpressionArg);

impl Expression for Negate {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        Ok(Value::Number(-self.0.eval(eval)?.number()))
    }
}

/// `|`: both sides must be node-sets; the result is in document order
/// with duplicates removed by node identity.
#[derive(Debug)]
pub struct Union {
    left: ExpressionArg,
    right: ExpressionArg,
}

impl Union {
    pub fn new(left: ExpressionArg, right: ExpressionArg) -> Self {
        Self { left, right }
    }
}

impl Expression for Union {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let mut left = self.left.eval(eval)?.into_nodeset()?;
        let right = self.right.eval(eval)?.into_nodeset()?;
        left.extend(right);
        left.sort_document_order();
        Ok(Value::Nodeset(left))
    }
}

// Primary expressions

#[derive(Debug)]
pub struct Literal(Value);

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        Literal(value)
    }
}

impl Expression for Literal {
    fn eval(&self, _: &Evaluation<'_>) -> EvalResult {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
pub struct VariableRef(pub String);

impl Expression for VariableRef {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        eval.variable(&self.0)
            .ok_or_else(|| XPathError::Type(format!("undefined variable ${}", self.0)))
    }
}

/// A function call; arguments evaluate eagerly, left to right.
pub struct FunctionCall {
    name: String,
    function: Box<dyn functions::Function>,
    args: Vec<ExpressionArg>,
}

impl FunctionCall {
    pub fn new(
        name: String,
        function: Box<dyn functions::Function>,
        args: Vec<ExpressionArg>,
    ) -> Self {
        Self {
            name,
            function,
            args,
        }
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

impl Expression for FunctionCall {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.push(arg.eval(eval)?);
        }
        self.function.call(eval, args)
    }
}

// Node-sets

/// The root of the tree holding the context node.
#[derive(Debug)]
pub struct RootNode;

impl Expression for RootNode {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        Ok(Value::Nodeset(vec![eval.root()].into()))
    }
}

#[derive(Debug)]
pub struct ContextNode;

impl Expression for ContextNode {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        Ok(Value::Nodeset(vec![eval.node.clone()].into()))
    }
}

/// A location path: a start set piped through a sequence of steps.
#[derive(Debug)]
pub struct Path {
    start: ExpressionArg,
    steps: Vec<Step>,
}

impl Path {
    pub fn new(start: ExpressionArg, steps: Vec<Step>) -> Self {
        Self { start, steps }
    }
}

impl Expression for Path {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let mut set = self.start.eval(eval)?.into_nodeset()?;
        for step in &self.steps {
            set = step.evaluate(eval, set)?;
        }
        Ok(Value::Nodeset(set))
    }
}

/// One location step: axis, node test, predicates.
#[derive(Debug)]
pub struct Step {
    axis: AxisName,
    node_test: Box<dyn NodeTest>,
    predicates: Vec<Predicate>,
}

impl Step {
    pub fn new(
        axis: AxisName,
        node_test: Box<dyn NodeTest>,
        predicates: Vec<ExpressionArg>,
    ) -> Step {
        Step {
            axis,
            node_test,
            predicates: predicates.into_iter().map(Predicate).collect(),
        }
    }

    /// For every input node: walk the axis in its natural order, filter by
    /// the node test, then apply each predicate against positions counted
    /// along that order. The merged result returns to document order.
    fn evaluate(&self, eval: &Evaluation<'_>, input: Nodeset) -> Result<Nodeset, XPathError> {
        let mut output = Nodeset::new();

        for node in input.iter() {
            let mut candidates = Vec::new();
            for candidate in axis_nodes(self.axis, node) {
                if self.node_test.matches(eval, &candidate)? {
                    candidates.push(candidate);
                }
            }
            for predicate in &self.predicates {
                candidates = predicate.filter(eval, candidates)?;
            }
            for candidate in candidates {
                output.add_node(candidate);
            }
        }

        output.sort_document_order();
        Ok(output)
    }
}

// https://www.w3.org/TR/1999/REC-xpath-19991116/#predicates
#[derive(Debug)]
pub struct Predicate(ExpressionArg);

impl Predicate {
    pub fn new(expr: ExpressionArg) -> Self {
        Self(expr)
    }

    /// Re-contexts each candidate: size is the candidate-list length,
    /// position its 1-based index. A numeric predicate value selects by
    /// position; anything else goes through `boolean()`.
    fn filter(
        &self,
        eval: &Evaluation<'_>,
        candidates: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, XPathError> {
        let size = candidates.len();
        let mut kept = Vec::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            let child_eval = eval.new_evaluation_with_position(candidate.clone(), index + 1, size);
            if self.holds(&child_eval)? {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }

    fn holds(&self, eval: &Evaluation<'_>) -> Result<bool, XPathError> {
        let value = self.0.eval(eval)?;
        Ok(match value {
            Value::Number(position) => eval.position as f64 == position,
            other => other.boolean(),
        })
    }
}

/// `FilterExpr`: a primary expression with predicates, e.g. `$set[2]` or
/// `(//a)[last()]`. Candidates number in document order.
#[derive(Debug)]
pub struct Filter {
    primary: ExpressionArg,
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new(primary: ExpressionArg, predicates: Vec<ExpressionArg>) -> Self {
        Self {
            primary,
            predicates: predicates.into_iter().map(Predicate).collect(),
        }
    }
}

impl Expression for Filter {
    fn eval(&self, eval: &Evaluation<'_>) -> EvalResult {
        let mut set = self.primary.eval(eval)?.into_nodeset()?;
        set.sort_document_order();
        let mut candidates = set.into_vec();
        for predicate in &self.predicates {
            candidates = predicate.filter(eval, candidates)?;
        }
        Ok(Value::Nodeset(candidates.into()))
    }
}
