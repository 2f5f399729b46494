use evalexpr::{build_operator_tree, ContextWithMutableVariables, HashMapContext, Node, Value};
use itertools::Itertools;

#[derive(thiserror::Error, Debug)]
pub enum ExpressionError {
    #[error(transparent)]
    Eval(#[from] evalexpr::EvalexprError),
    #[error("unknown identifier `{identifier}` in `{expression}`")]
    UnknownIdentifier {
        identifier: String,
        expression: String,
    },
    #[error("`{expression}` did not evaluate to a number")]
    NotNumeric { expression: String },
}

pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Per-pixel bindings of band names to values, reused across pixels.
#[derive(Default)]
pub struct PixelBindings {
    context: HashMapContext,
}

impl PixelBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        self.context
            .set_value(name.to_string(), Value::Float(value))?;
        Ok(())
    }
}

/// An arithmetic or boolean formula over named band values, compiled once
/// at operator construction.
///
/// Identifiers are checked against the available band names up front, so an
/// unknown band is a construction error rather than a per-pixel one.
pub struct PixelExpr {
    source: String,
    node: Node,
    variables: Vec<String>,
}

impl PixelExpr {
    pub fn compile(source: &str, band_names: &[&str]) -> Result<Self> {
        let node = build_operator_tree(source)?;
        let variables: Vec<String> = node
            .iter_variable_identifiers()
            .unique()
            .map(str::to_string)
            .collect();
        for identifier in &variables {
            if !band_names.contains(&identifier.as_str()) {
                return Err(ExpressionError::UnknownIdentifier {
                    identifier: identifier.clone(),
                    expression: source.to_string(),
                });
            }
        }
        Ok(Self {
            source: source.to_string(),
            node,
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Band names the expression actually references.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn eval(&self, bindings: &PixelBindings) -> Result<f64> {
        match self.node.eval_with_context(&bindings.context)? {
            Value::Float(value) => Ok(value),
            Value::Int(value) => Ok(value as f64),
            _ => Err(ExpressionError::NotNumeric {
                expression: self.source.clone(),
            }),
        }
    }

    pub fn eval_predicate(&self, bindings: &PixelBindings) -> Result<bool> {
        Ok(self.node.eval_boolean_with_context(&bindings.context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndvi_formula() {
        let expr = PixelExpr::compile("(B08 - B04) / (B08 + B04)", &["B04", "B08"]).unwrap();
        let mut bindings = PixelBindings::new();
        bindings.set("B04", 0.1).unwrap();
        bindings.set("B08", 0.3).unwrap();
        let value = expr.eval(&bindings).unwrap();
        assert!((value - 0.5).abs() < 1e-12);
        assert_eq!(expr.variables().len(), 2);
    }

    #[test]
    fn nan_flows_through_arithmetic() {
        let expr = PixelExpr::compile("x * 2.0 + 1.0", &["x"]).unwrap();
        let mut bindings = PixelBindings::new();
        bindings.set("x", f64::NAN).unwrap();
        assert!(expr.eval(&bindings).unwrap().is_nan());
    }

    #[test]
    fn unknown_identifiers_fail_to_compile() {
        assert!(matches!(
            PixelExpr::compile("B04 + B99", &["B04"]),
            Err(ExpressionError::UnknownIdentifier { .. })
        ));
        assert!(PixelExpr::compile("B04 +* 1", &["B04"]).is_err());
    }

    #[test]
    fn predicates_compare_floats() {
        let expr = PixelExpr::compile("B04 > 0.0", &["B04"]).unwrap();
        let mut bindings = PixelBindings::new();
        bindings.set("B04", 1.0).unwrap();
        assert!(expr.eval_predicate(&bindings).unwrap());
        bindings.set("B04", -1.0).unwrap();
        assert!(!expr.eval_predicate(&bindings).unwrap());
        // NaN compares false
        bindings.set("B04", f64::NAN).unwrap();
        assert!(!expr.eval_predicate(&bindings).unwrap());
    }
}
