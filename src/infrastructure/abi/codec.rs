//! Contract call encoding, output decoding, and event topic construction

use std::collections::BTreeMap;
use std::sync::OnceLock;

use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Event, Function, JsonAbi};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use tracing::error;

use crate::error::AbiError;

/// Bundled ERC-20 interface used for token balance calls
const TOKEN_ABI_JSON: &str = include_str!("../../../data/token_abi.json");

static TOKEN_ABI: OnceLock<JsonAbi> = OnceLock::new();

/// The standard token ABI, parsed on first use
pub fn token_abi() -> Result<&'static JsonAbi, AbiError> {
    if let Some(abi) = TOKEN_ABI.get() {
        return Ok(abi);
    }
    let abi: JsonAbi = serde_json::from_str(TOKEN_ABI_JSON)
        .map_err(|e| AbiError::InvalidAbi(format!("bundled token ABI: {}", e)))?;
    Ok(TOKEN_ABI.get_or_init(|| abi))
}

/// Parse a JSON ABI, accepting either a raw array or an artifact with an "abi" field
pub fn parse_abi(content: &str) -> Result<JsonAbi, AbiError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| AbiError::InvalidAbi(e.to_string()))?;

    let abi_value = if value.is_array() {
        value
    } else if let Some(abi) = value.get("abi") {
        abi.clone()
    } else {
        return Err(AbiError::InvalidAbi(
            "expected an ABI array or an object with an \"abi\" field".to_string(),
        ));
    };

    serde_json::from_value(abi_value).map_err(|e| AbiError::InvalidAbi(e.to_string()))
}

/// Find the overload of `name` that takes `arity` arguments
pub fn find_function<'a>(
    abi: &'a JsonAbi,
    name: &str,
    arity: usize,
) -> Result<&'a Function, AbiError> {
    abi.function(name)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        .ok_or_else(|| AbiError::FunctionNotFound {
            name: name.to_string(),
            arity,
        })
}

/// Find an event by name (first declaration wins)
pub fn find_event<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a Event, AbiError> {
    abi.event(name)
        .and_then(|events| events.first())
        .ok_or_else(|| AbiError::EventNotFound(name.to_string()))
}

/// Selector + ABI-encoded arguments
pub fn encode_call(function: &Function, arguments: &[DynSolValue]) -> Result<Bytes, AbiError> {
    function
        .abi_encode_input(arguments)
        .map(Bytes::from)
        .map_err(|e| AbiError::Encode(format!("call to '{}': {}", function.name, e)))
}

/// Decode the return data of `function` down to a single value
///
/// Only single-value returns are supported. When more than one value comes
/// back the anomaly is logged and the first value is returned.
pub fn decode_single_output(function: &Function, data: &[u8]) -> Result<DynSolValue, AbiError> {
    let values = function
        .abi_decode_output(data)
        .map_err(|e| AbiError::Decode(format!("output of '{}': {}", function.name, e)))?;

    if values.len() > 1 {
        error!(
            method = %function.name,
            outputs = values.len(),
            "Unexpected call with multiple output data. Can not handle properly"
        );
    }

    values
        .into_iter()
        .next()
        .ok_or_else(|| AbiError::EmptyOutput(function.name.clone()))
}

/// Decode a `0x`-prefixed hex string as returned by `eth_call`
pub fn decode_hex_data(data: &str) -> Result<Vec<u8>, AbiError> {
    let payload = data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
        .unwrap_or(data);
    hex::decode(payload).map_err(|e| AbiError::Decode(format!("hex payload: {}", e)))
}

/// Left-pad an address to a 32-byte topic word
pub fn address_to_bytes32(address: Address) -> B256 {
    address.into_word()
}

/// Build the topic list for `event`
///
/// Position 0 is the event selector, followed by one entry per indexed input
/// in declaration order. Inputs without a filter are wildcards. Anonymous
/// events carry no selector topic, so the first entry is dropped for them.
/// Trailing wildcards are trimmed.
pub fn event_topics(
    event: &Event,
    argument_filters: &BTreeMap<String, String>,
) -> Result<Vec<Option<B256>>, AbiError> {
    for name in argument_filters.keys() {
        let known = event
            .inputs
            .iter()
            .any(|input| input.indexed && &input.name == name);
        if !known {
            return Err(AbiError::UnknownArgument {
                event: event.name.clone(),
                argument: name.clone(),
            });
        }
    }

    let mut topics = vec![Some(event.selector())];
    for input in event.inputs.iter().filter(|input| input.indexed) {
        let topic = match argument_filters.get(&input.name) {
            Some(value) => Some(encode_topic(&input.ty, value)?),
            None => None,
        };
        topics.push(topic);
    }

    if event.anonymous {
        topics.remove(0);
    }

    while matches!(topics.last(), Some(None)) {
        topics.pop();
    }

    Ok(topics)
}

/// Encode one indexed argument value as a topic word
///
/// Value types are stored as their 32-byte ABI word; dynamic types (strings,
/// bytes, arrays) are stored as the keccak256 of their packed encoding.
fn encode_topic(kind: &str, value: &str) -> Result<B256, AbiError> {
    let sol_type: DynSolType = kind
        .parse()
        .map_err(|e| AbiError::Encode(format!("type '{}': {}", kind, e)))?;
    let sol_value = sol_type
        .coerce_str(value)
        .map_err(|e| AbiError::Encode(format!("'{}' as {}: {}", value, kind, e)))?;

    if sol_type.is_dynamic() {
        return Ok(keccak256(sol_value.abi_encode_packed()));
    }

    sol_value
        .as_word()
        .ok_or_else(|| AbiError::Encode(format!("'{}' as {} is not a single word", value, kind)))
}
