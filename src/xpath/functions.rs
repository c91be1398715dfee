//! The XPath 1.0 core function library. Argument counts are enforced at
//! parse time through [`signature`]; node-set-typed arguments are checked
//! here at call time.

use std::fmt;

use crate::error::XPathError;
use crate::node::{NodeData, NodeRef};
use crate::xpath::context::Evaluation;
use crate::xpath::value::{parse_number, string_value, Nodeset, Value};

pub trait Function: fmt::Debug {
    fn call(&self, eval: &Evaluation<'_>, args: Vec<Value>) -> Result<Value, XPathError>;
}

/// `(function, min_args, max_args)`; `None` = unbounded.
type Signature = (Box<dyn Function>, usize, Option<usize>);

pub(crate) fn signature(name: &str) -> Option<Signature> {
    let entry: Signature = match name {
        // Node-set
        "last" => (Box::new(Last), 0, Some(0)),
        "position" => (Box::new(Position), 0, Some(0)),
        "count" => (Box::new(Count), 1, Some(1)),
        "id" => (Box::new(Id), 1, Some(1)),
        "local-name" => (Box::new(LocalName), 0, Some(1)),
        "namespace-uri" => (Box::new(NamespaceUri), 0, Some(1)),
        "name" => (Box::new(NameFn), 0, Some(1)),

        // String
        "string" => (Box::new(StringFn), 0, Some(1)),
        "concat" => (Box::new(Concat), 2, None),
        "starts-with" => (Box::new(StartsWith), 2, Some(2)),
        "contains" => (Box::new(Contains), 2, Some(2)),
        "substring-before" => (Box::new(SubstringBefore), 2, Some(2)),
        "substring-after" => (Box::new(SubstringAfter), 2, Some(2)),
        "substring" => (Box::new(Substring), 2, Some(3)),
        "string-length" => (Box::new(StringLength), 0, Some(1)),
        "normalize-space" => (Box::new(NormalizeSpace), 0, Some(1)),
        "translate" => (Box::new(Translate), 3, Some(3)),

        // Boolean
        "boolean" => (Box::new(BooleanFn), 1, Some(1)),
        "not" => (Box::new(Not), 1, Some(1)),
        "true" => (Box::new(True), 0, Some(0)),
        "false" => (Box::new(False), 0, Some(0)),
        "lang" => (Box::new(Lang), 1, Some(1)),

        // Number
        "number" => (Box::new(NumberFn), 0, Some(1)),
        "sum" => (Box::new(Sum), 1, Some(1)),
        "floor" => (Box::new(Floor), 1, Some(1)),
        "ceiling" => (Box::new(Ceiling), 1, Some(1)),
        "round" => (Box::new(Round), 1, Some(1)),

        _ => return None,
    };
    Some(entry)
}

fn nodeset_arg(name: &str, value: Value) -> Result<Nodeset, XPathError> {
    value.into_nodeset().map_err(|_| {
        XPathError::Type(format!("{name}() requires a node-set argument"))
    })
}

/// First node in document order, for the name-reporting functions.
fn first_in_document_order(mut set: Nodeset) -> Option<NodeRef> {
    set.sort_document_order();
    set.first()
}

/// Rounds half away from zero; NaN, infinities and zeros pass through.
fn round_half_away(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() || value == 0.0 {
        value
    } else {
        (value.abs() + 0.5).floor() * value.signum()
    }
}

#[derive(Debug)]
pub struct Last;

impl Function for Last {
    fn call(&self, eval: &Evaluation<'_>, _: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Number(eval.size as f64))
    }
}

#[derive(Debug)]
pub struct Position;

impl Function for Position {
    fn call(&self, eval: &Evaluation<'_>, _: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Number(eval.position as f64))
    }
}

#[derive(Debug)]
pub struct Count;

impl Function for Count {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let set = nodeset_arg("count", args.remove(0))?;
        Ok(Value::Number(set.len() as f64))
    }
}

/// `id(obj)`: whitespace-separated tokens name elements through the
/// document's id index; a node-set argument contributes the tokens of
/// each node's string-value.
#[derive(Debug)]
pub struct Id;

impl Function for Id {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let tokens: Vec<String> = match args.remove(0) {
            Value::Nodeset(set) => set
                .iter()
                .flat_map(|node| {
                    string_value(node)
                        .split_whitespace()
                        .map(str::to_owned)
                        .collect::<Vec<_>>()
                })
                .collect(),
            other => other
                .string()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        };

        let mut set = Nodeset::new();
        for token in tokens {
            if let Some(element) = eval.document.get_element_by_id(&token) {
                set.add_node(element);
            }
        }
        set.sort_document_order();
        Ok(Value::Nodeset(set))
    }
}

fn name_target(
    eval: &Evaluation<'_>,
    mut args: Vec<Value>,
    caller: &str,
) -> Result<Option<NodeRef>, XPathError> {
    if args.is_empty() {
        Ok(Some(eval.node.clone()))
    } else {
        Ok(first_in_document_order(nodeset_arg(caller, args.remove(0))?))
    }
}

#[derive(Debug)]
pub struct LocalName;

impl Function for LocalName {
    fn call(&self, eval: &Evaluation<'_>, args: Vec<Value>) -> Result<Value, XPathError> {
        let name = match name_target(eval, args, "local-name")? {
            Some(node) => match node.data_ref() {
                NodeData::Element(_) | NodeData::Attribute(_) => {
                    node.local_name().unwrap_or_default()
                }
                NodeData::ProcessingInstruction { target, .. } => target.clone(),
                NodeData::Namespace(_) => node.node_name(),
                _ => String::new(),
            },
            None => String::new(),
        };
        Ok(Value::String(name))
    }
}

#[derive(Debug)]
pub struct NamespaceUri;

impl Function for NamespaceUri {
    fn call(&self, eval: &Evaluation<'_>, args: Vec<Value>) -> Result<Value, XPathError> {
        let uri = name_target(eval, args, "namespace-uri")?
            .and_then(|node| node.namespace_uri())
            .unwrap_or_default();
        Ok(Value::String(uri))
    }
}

#[derive(Debug)]
pub struct NameFn;

impl Function for NameFn {
    fn call(&self, eval: &Evaluation<'_>, args: Vec<Value>) -> Result<Value, XPathError> {
        let name = match name_target(eval, args, "name")? {
            Some(node) => match node.data_ref() {
                NodeData::Element(_) | NodeData::Attribute(_) => node.node_name(),
                NodeData::ProcessingInstruction { target, .. } => target.clone(),
                NodeData::Namespace(_) => node.node_name(),
                _ => String::new(),
            },
            None => String::new(),
        };
        Ok(Value::String(name))
    }
}

#[derive(Debug)]
pub struct StringFn;

impl Function for StringFn {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let out = if args.is_empty() {
            string_value(&eval.node)
        } else {
            args.remove(0).string()
        };
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct Concat;

impl Function for Concat {
    fn call(&self, _: &Evaluation<'_>, args: Vec<Value>) -> Result<Value, XPathError> {
        let mut out = String::new();
        for arg in args {
            out.push_str(&arg.string());
        }
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct StartsWith;

impl Function for StartsWith {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let hay = args.remove(0).string();
        let needle = args.remove(0).string();
        Ok(Value::Boolean(hay.starts_with(&needle)))
    }
}

#[derive(Debug)]
pub struct Contains;

impl Function for Contains {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let hay = args.remove(0).string();
        let needle = args.remove(0).string();
        Ok(Value::Boolean(hay.contains(&needle)))
    }
}

#[derive(Debug)]
pub struct SubstringBefore;

impl Function for SubstringBefore {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let hay = args.remove(0).string();
        let needle = args.remove(0).string();
        let out = hay
            .find(&needle)
            .map(|at| hay[..at].to_owned())
            .unwrap_or_default();
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct SubstringAfter;

impl Function for SubstringAfter {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let hay = args.remove(0).string();
        let needle = args.remove(0).string();
        let out = hay
            .find(&needle)
            .map(|at| hay[at + needle.len()..].to_owned())
            .unwrap_or_default();
        Ok(Value::String(out))
    }
}

/// `substring(s, start[, len])` with 1-based, rounded positions:
/// `substring('abcd', 1.5, 2.6)` is `"bcd"`.
#[derive(Debug)]
pub struct Substring;

impl Function for Substring {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let text = args.remove(0).string();
        let start = round_half_away(args.remove(0).number());
        let end = if args.is_empty() {
            f64::INFINITY
        } else {
            start + round_half_away(args.remove(0).number())
        };

        let out: String = text
            .chars()
            .enumerate()
            .filter(|(index, _)| {
                let position = (index + 1) as f64;
                position >= start && position < end
            })
            .map(|(_, c)| c)
            .collect();
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct StringLength;

impl Function for StringLength {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let text = if args.is_empty() {
            string_value(&eval.node)
        } else {
            args.remove(0).string()
        };
        Ok(Value::Number(text.chars().count() as f64))
    }
}

#[derive(Debug)]
pub struct NormalizeSpace;

impl Function for NormalizeSpace {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let text = if args.is_empty() {
            string_value(&eval.node)
        } else {
            args.remove(0).string()
        };
        let out = text
            .split([' ', '\t', '\n', '\r'])
            .filter(|piece| !piece.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Value::String(out))
    }
}

/// `translate(s, from, to)`: positional character mapping; characters of
/// `from` beyond the length of `to` are removed from the input.
#[derive(Debug)]
pub struct Translate;

impl Function for Translate {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let text = args.remove(0).string();
        let from: Vec<char> = args.remove(0).string().chars().collect();
        let to: Vec<char> = args.remove(0).string().chars().collect();

        let out: String = text
            .chars()
            .filter_map(|c| {
                // First occurrence in `from` decides.
                match from.iter().position(|f| *f == c) {
                    Some(at) => to.get(at).copied(),
                    None => Some(c),
                }
            })
            .collect();
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct BooleanFn;

impl Function for BooleanFn {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Boolean(args.remove(0).boolean()))
    }
}

#[derive(Debug)]
pub struct Not;

impl Function for Not {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Boolean(!args.remove(0).boolean()))
    }
}

#[derive(Debug)]
pub struct True;

impl Function for True {
    fn call(&self, _: &Evaluation<'_>, _: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Boolean(true))
    }
}

#[derive(Debug)]
pub struct False;

impl Function for False {
    fn call(&self, _: &Evaluation<'_>, _: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Boolean(false))
    }
}

/// `lang(s)`: the nearest `xml:lang` matches case-insensitively on the
/// language tag or any of its `-`-separated refinements, so `lang('en')`
/// accepts `en-US`.
#[derive(Debug)]
pub struct Lang;

impl Function for Lang {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let wanted = args.remove(0).string();

        let mut current = Some(eval.node.clone());
        let mut declared = None;
        while let Some(node) = current {
            if node.is_element() {
                if let Some(lang) = node
                    .get_attribute("xml:lang")
                    .or_else(|| node.get_attribute_ns(Some(crate::name::XML_NAMESPACE), "lang"))
                {
                    declared = Some(lang);
                    break;
                }
            }
            current = node.parent_or_owner();
        }

        let matches = declared.is_some_and(|lang| {
            let lang = lang.to_ascii_lowercase();
            let wanted = wanted.to_ascii_lowercase();
            lang == wanted || lang.starts_with(&format!("{wanted}-"))
        });
        Ok(Value::Boolean(matches))
    }
}

#[derive(Debug)]
pub struct NumberFn;

impl Function for NumberFn {
    fn call(&self, eval: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let out = if args.is_empty() {
            parse_number(&string_value(&eval.node))
        } else {
            args.remove(0).number()
        };
        Ok(Value::Number(out))
    }
}

/// `sum(ns)`: 0 for an empty set; any non-numeric string-value poisons
/// the sum to NaN.
#[derive(Debug)]
pub struct Sum;

impl Function for Sum {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        let set = nodeset_arg("sum", args.remove(0))?;
        let total = set
            .iter()
            .map(|node| parse_number(&string_value(node)))
            .sum();
        Ok(Value::Number(total))
    }
}

#[derive(Debug)]
pub struct Floor;

impl Function for Floor {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Number(args.remove(0).number().floor()))
    }
}

#[derive(Debug)]
pub struct Ceiling;

impl Function for Ceiling {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Number(args.remove(0).number().ceil()))
    }
}

/// Round half away from zero: `round(2.5)` is 3, `round(-2.5)` is −3;
/// NaN, infinities and signed zeros pass through unchanged.
#[derive(Debug)]
pub struct Round;

impl Function for Round {
    fn call(&self, _: &Evaluation<'_>, mut args: Vec<Value>) -> Result<Value, XPathError> {
        Ok(Value::Number(round_half_away(args.remove(0).number())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_half_away(2.5), 3.0);
        assert_eq!(round_half_away(-2.5), -3.0);
        assert_eq!(round_half_away(2.4), 2.0);
        assert_eq!(round_half_away(-2.4), -2.0);
        assert!(round_half_away(f64::NAN).is_nan());
        assert_eq!(round_half_away(f64::INFINITY), f64::INFINITY);
        assert_eq!(round_half_away(-0.0), 0.0);
        assert!(round_half_away(-0.0).is_sign_negative());
    }

    #[test]
    fn arity_table_is_complete() {
        for name in [
            "last",
            "position",
            "count",
            "id",
            "local-name",
            "namespace-uri",
            "name",
            "string",
            "concat",
            "starts-with",
            "contains",
            "substring-before",
            "substring-after",
            "substring",
            "string-length",
            "normalize-space",
            "translate",
            "boolean",
            "not",
            "true",
            "false",
            "lang",
            "number",
            "sum",
            "floor",
            "ceiling",
            "round",
        ] {
            assert!(signature(name).is_some(), "missing function {name}");
        }
        assert!(signature("document").is_none());
    }
}
