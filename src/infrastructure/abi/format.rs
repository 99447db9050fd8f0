//! Human-readable rendering of decoded ABI values

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_json_abi::Function;

use crate::error::AbiError;

/// Format a DynSolValue for display
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            let bytes = &word.as_slice()[..(*size).min(32)];
            format!("0x{}", hex::encode(bytes))
        }
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Function(func) => format!("0x{}", hex::encode(func.as_slice())),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(s) => format!("\"{}\"", s),
        DynSolValue::Array(arr) | DynSolValue::FixedArray(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        DynSolValue::Tuple(fields) => {
            let items: Vec<String> = fields.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
    }
}

/// Parse textual call arguments against a function's input types
pub fn parse_arguments(function: &Function, raw: &[String]) -> Result<Vec<DynSolValue>, AbiError> {
    if raw.len() != function.inputs.len() {
        return Err(AbiError::Encode(format!(
            "'{}' takes {} argument(s), got {}",
            function.name,
            function.inputs.len(),
            raw.len()
        )));
    }

    function
        .inputs
        .iter()
        .zip(raw)
        .map(|(param, text)| {
            let kind = param.selector_type();
            let sol_type: DynSolType = kind
                .parse()
                .map_err(|e| AbiError::Encode(format!("type '{}': {}", kind, e)))?;
            sol_type
                .coerce_str(text)
                .map_err(|e| AbiError::Encode(format!("'{}' as {}: {}", text, kind, e)))
        })
        .collect()
}
