//! CLI subcommands.

pub mod check;
pub mod operators;
pub mod run;

use kiln_core::ParamValue;

/// Render a parameter value the way patches spell it.
pub(crate) fn format_value(value: ParamValue) -> String {
    match value {
        ParamValue::Float(v) => format!("{v}"),
        ParamValue::Int(v) => v.to_string(),
        ParamValue::Bool(v) => v.to_string(),
        ParamValue::Vec2([x, y]) => format!("[{x}, {y}]"),
    }
}
