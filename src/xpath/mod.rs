//! The XPath 1.0 engine: tokenizer, recursive-descent parser and an
//! evaluator that walks the live DOM. Compiled expressions are immutable
//! and shareable; the namespace resolver binds at evaluation time, so one
//! compilation serves any number of evaluations.

pub mod context;
pub mod expressions;
pub mod factory;
pub mod functions;
pub mod nodetest;
pub mod parser;
pub mod result;
pub mod tokens;
pub mod value;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::document::Document;
use crate::error::XPathError;
use crate::node::NodeRef;

pub use context::Evaluation;
pub use factory::Factory;
pub use parser::Tokenizer;
pub use result::{result_type, XPathResult};
pub use tokens::{AxisName, ExprToken, NameTest, Operator, PrincipalNodeType};
pub use value::{Nodeset, Value};

use expressions::Expression;

/// Per-evaluation knobs: `$variable` bindings and the prefix resolver.
#[derive(Default)]
pub struct EvalOptions {
    pub variables: HashMap<String, Value>,
    pub resolver: Option<Box<dyn Fn(&str) -> Option<String>>>,
}

impl EvalOptions {
    pub fn with_variable<S: Into<String>, V: Into<Value>>(mut self, var: S, value: V) -> Self {
        self.variables.insert(var.into(), value.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn Fn(&str) -> Option<String>>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Compiles an expression to its shareable AST.
pub fn compile(expr: &str) -> Result<Rc<dyn Expression>, XPathError> {
    trace!(expr, "compiling xpath expression");
    Factory::new(expr)?.produce()
}

/// Evaluates a compiled expression against a context node. Node-set
/// results come back in document order with duplicates removed.
pub fn evaluate_compiled(
    expr: &Rc<dyn Expression>,
    document: &Document,
    context: &NodeRef,
    options: &EvalOptions,
) -> Result<Value, XPathError> {
    let resolver = options.resolver.as_deref();
    let eval = Evaluation::new(document, context.clone(), &options.variables, resolver);
    let value = expr.eval(&eval)?;
    Ok(match value {
        Value::Nodeset(mut set) => {
            set.sort_document_order();
            Value::Nodeset(set)
        }
        other => other,
    })
}
