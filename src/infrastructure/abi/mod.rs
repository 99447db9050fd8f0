//! ABI infrastructure - encoding and decoding with alloy-dyn-abi

mod codec;
mod format;

pub use codec::{
    address_to_bytes32, decode_hex_data, decode_single_output, encode_call, event_topics,
    find_event, find_function, parse_abi, token_abi,
};
pub use format::{format_value, parse_arguments};
