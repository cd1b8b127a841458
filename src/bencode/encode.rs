use serde_json::{json, Value};

use super::BValue;

/// Encode a `BValue` back into a bencoded `Vec<u8>`.
///
/// Dictionaries are emitted with keys in lexicographic byte order, so the
/// output is canonical and safe to hash.
pub fn encode_bvalue(value: &BValue) -> Vec<u8> {
	let mut out: Vec<u8> = Vec::new();
	encode_into(value, &mut out);
	out
}

fn encode_into(value: &BValue, out: &mut Vec<u8>) {
	match value {
		BValue::Integer(i) => {
			out.push(b'i');
			out.extend_from_slice(i.to_string().as_bytes());
			out.push(b'e');
		}
		BValue::ByteString(bytes) => encode_bytes(bytes, out),
		BValue::List(items) => {
			out.push(b'l');
			for item in items {
				encode_into(item, out);
			}
			out.push(b'e');
		}
		BValue::Dict(dict) => {
			out.push(b'd');
			// BTreeMap iterates in sorted key order
			for (key, val) in dict {
				encode_bytes(key, out);
				encode_into(val, out);
			}
			out.push(b'e');
		}
	}
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
	out.extend_from_slice(bytes.len().to_string().as_bytes());
	out.push(b':');
	out.extend_from_slice(bytes);
}

/// Convert a `BValue` into JSON (using Serde JSON `Value`).
///
/// - `Integer(i)` => JSON number
/// - `ByteString(bytes)` => UTF-8 string; if invalid, hex under `"_bytes_hex"`.
/// - `List(...)` => JSON array
/// - `Dict(...)` => JSON object (non-UTF-8 keys are converted lossily)
pub fn bvalue_to_json(bv: &BValue) -> Value {
	match bv {
		BValue::Integer(i) => json!(i),
		BValue::ByteString(bytes) => match std::str::from_utf8(bytes) {
			Ok(utf8_str) => Value::String(utf8_str.to_string()),
			Err(_) => json!({ "_bytes_hex": hex::encode(bytes) }),
		},
		BValue::List(items) => Value::Array(items.iter().map(bvalue_to_json).collect()),
		BValue::Dict(map) => {
			let mut json_map = serde_json::Map::new();
			for (k, v) in map {
				json_map.insert(String::from_utf8_lossy(k).into_owned(), bvalue_to_json(v));
			}
			Value::Object(json_map)
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::*;
	use crate::bencode::decode_bencode;

	#[test]
	fn test_encode_scalars() {
		assert_eq!(encode_bvalue(&BValue::Integer(-42)), b"i-42e");
		assert_eq!(encode_bvalue(&BValue::from("spam")), b"4:spam");
		assert_eq!(encode_bvalue(&BValue::ByteString(vec![])), b"0:");
	}

	#[test]
	fn test_encode_sorts_dict_keys() {
		let mut map = BTreeMap::new();
		map.insert(b"zebra".to_vec(), BValue::Integer(1));
		map.insert(b"apple".to_vec(), BValue::List(vec![BValue::from("x")]));
		map.insert(b"piece length".to_vec(), BValue::Integer(2));
		assert_eq!(
			encode_bvalue(&BValue::Dict(map)),
			b"d5:applel1:xe12:piece lengthi2e5:zebrai1ee".to_vec()
		);
	}

	#[test]
	fn test_reencode_normalizes_key_order() {
		let (_, value) = decode_bencode(b"d1:bi2e1:ai1ee").unwrap();
		assert_eq!(encode_bvalue(&value), b"d1:ai1e1:bi2ee".to_vec());
	}

	#[test]
	fn test_round_trip_canonical_input() {
		let inputs: [&[u8]; 4] = [
			b"d8:announce3:url4:infod6:lengthi10e4:name1:aee",
			b"l5:helloi42eleded1:k0:e",
			b"i-7e",
			b"3:\xff\x00\x01",
		];
		for input in inputs {
			let (consumed, value) = decode_bencode(input).unwrap();
			assert_eq!(consumed, input.len());
			assert_eq!(encode_bvalue(&value), input.to_vec());
		}
	}

	#[test]
	fn test_bvalue_to_json() {
		let (_, value) = decode_bencode(b"d3:foo3:bar5:helloi52e4:listl1:ai1eee").unwrap();
		assert_eq!(
			bvalue_to_json(&value),
			json!({"foo": "bar", "hello": 52, "list": ["a", 1]})
		);
	}

	#[test]
	fn test_bvalue_to_json_binary() {
		let value = BValue::ByteString(vec![0xff, 0x10]);
		assert_eq!(bvalue_to_json(&value), json!({"_bytes_hex": "ff10"}));
	}
}
