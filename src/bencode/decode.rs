use std::collections::BTreeMap;

use super::error::BencodeError;
use crate::bencode::bvalue::BValue;

/// Deepest list/dict nesting accepted before giving up.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Decodes one bencoded value from the front of `input`.
///
/// Returns the number of bytes consumed together with the value, so callers
/// can keep decoding from `&input[consumed..]`. Trailing bytes are left alone.
pub fn decode_bencode(input: &[u8]) -> Result<(usize, BValue), BencodeError> {
	decode_at(input, 0)
}

fn decode_at(input: &[u8], depth: usize) -> Result<(usize, BValue), BencodeError> {
	let first = *input.first().ok_or(BencodeError::UnexpectedEnd)?;

	match first {
		b'i' => decode_integer(input),
		b'l' | b'd' if depth >= MAX_NESTING_DEPTH => Err(BencodeError::NestingTooDeep(MAX_NESTING_DEPTH)),
		b'l' => decode_list(input, depth + 1),
		b'd' => decode_dict(input, depth + 1),
		c if c.is_ascii_digit() => decode_string(input),
		c => Err(BencodeError::UnsupportedType(c)),
	}
}

/// Decodes a Bencoded integer of the form `i<digits>e`.
fn decode_integer(input: &[u8]) -> Result<(usize, BValue), BencodeError> {
	let end_pos = input
		.iter()
		.position(|&b| b == b'e')
		.ok_or_else(|| BencodeError::MalformedInteger("missing 'e'".to_string()))?;

	let num_str = std::str::from_utf8(&input[1..end_pos])
		.map_err(|_| BencodeError::MalformedInteger("non-ASCII digits".to_string()))?;

	let parsed = num_str.parse::<i64>().map_err(|e| {
		BencodeError::MalformedInteger(format!("'{}': {}", num_str, e))
	})?;

	// add 1 to account for 'e'
	Ok((end_pos + 1, BValue::Integer(parsed)))
}

/// Decodes a Bencoded string of the form `<length>:<bytes>`.
fn decode_string(input: &[u8]) -> Result<(usize, BValue), BencodeError> {
	let (consumed, data) = split_string(input)?;
	Ok((consumed, BValue::ByteString(data.to_vec())))
}

fn split_string(input: &[u8]) -> Result<(usize, &[u8]), BencodeError> {
	let colon_index = input
		.iter()
		.position(|b| !b.is_ascii_digit())
		.filter(|&i| input[i] == b':')
		.ok_or_else(|| BencodeError::MalformedLength("missing ':' after length".to_string()))?;

	// Only ASCII digits precede the colon, so this cannot fail on UTF-8.
	let length_str = String::from_utf8_lossy(&input[..colon_index]);
	let length = length_str
		.parse::<usize>()
		.map_err(|e| BencodeError::MalformedLength(format!("'{}': {}", length_str, e)))?;

	let start_data = colon_index + 1;
	let end_data = start_data
		.checked_add(length)
		.filter(|&end| end <= input.len())
		.ok_or_else(|| {
			BencodeError::MalformedLength(format!(
				"length {} exceeds remaining input of {} bytes",
				length,
				input.len() - start_data
			))
		})?;

	Ok((end_data, &input[start_data..end_data]))
}

/// Decodes a Bencoded list of the form `l<items>e`.
fn decode_list(input: &[u8], depth: usize) -> Result<(usize, BValue), BencodeError> {
	let mut idx = 1; // skip 'l'
	let mut items = Vec::new();

	while idx < input.len() && input[idx] != b'e' {
		let (consumed, val) = decode_at(&input[idx..], depth)?;
		idx += consumed;
		items.push(val);
	}

	if idx >= input.len() {
		return Err(BencodeError::UnterminatedList);
	}

	Ok((idx + 1, BValue::List(items)))
}

/// Decodes a Bencoded dictionary of the form `d(<string><value>)*e`.
///
/// Keys are not required to arrive sorted; the map orders them anyway.
fn decode_dict(input: &[u8], depth: usize) -> Result<(usize, BValue), BencodeError> {
	let mut idx = 1; // skip 'd'
	let mut map = BTreeMap::new();

	while idx < input.len() && input[idx] != b'e' {
		if !input[idx].is_ascii_digit() {
			return Err(BencodeError::MalformedLength(
				"dictionary key must be a byte string".to_string(),
			));
		}
		let (key_length, key) = split_string(&input[idx..])?;
		let key = key.to_vec();
		idx += key_length;

		let (consumed, value) = decode_at(&input[idx..], depth)?;
		idx += consumed;

		map.insert(key, value);
	}

	if idx >= input.len() {
		return Err(BencodeError::UnterminatedDict);
	}

	Ok((idx + 1, BValue::Dict(map)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bytes(s: &str) -> BValue {
		BValue::ByteString(s.as_bytes().to_vec())
	}

	#[test]
	fn test_decode_string() {
		let input = b"5:hello";
		let (consumed, value) = decode_bencode(input).unwrap();
		assert_eq!(consumed, input.len());
		assert_eq!(value, bytes("hello"));
	}

	#[test]
	fn test_decode_empty_string() {
		let (consumed, value) = decode_bencode(b"0:").unwrap();
		assert_eq!(consumed, 2);
		assert_eq!(value, bytes(""));
	}

	#[test]
	fn test_decode_binary_string() {
		let input = [b'3', b':', 0xff, 0x00, 0x80];
		let (_, value) = decode_bencode(&input).unwrap();
		assert_eq!(value, BValue::ByteString(vec![0xff, 0x00, 0x80]));
	}

	#[test]
	fn test_decode_integer() {
		assert_eq!(decode_bencode(b"i42e").unwrap(), (4, BValue::Integer(42)));
		assert_eq!(decode_bencode(b"i-13e").unwrap(), (5, BValue::Integer(-13)));
		assert_eq!(decode_bencode(b"i0e").unwrap(), (3, BValue::Integer(0)));
	}

	#[test]
	fn test_decode_list() {
		let input = b"l5:helloi42ee";
		let (consumed, value) = decode_bencode(input).unwrap();
		assert_eq!(consumed, input.len());
		assert_eq!(value, BValue::List(vec![bytes("hello"), BValue::Integer(42)]));
	}

	#[test]
	fn test_decode_nested_list() {
		let input = b"lli956e5:appleee";
		let (consumed, value) = decode_bencode(input).unwrap();
		assert_eq!(consumed, input.len());
		assert_eq!(
			value,
			BValue::List(vec![BValue::List(vec![BValue::Integer(956), bytes("apple")])])
		);
	}

	#[test]
	fn test_decode_empty_list() {
		assert_eq!(decode_bencode(b"le").unwrap(), (2, BValue::List(vec![])));
	}

	#[test]
	fn test_decode_dict() {
		let input = b"d3:foo3:bar5:helloi52ee";
		let (consumed, value) = decode_bencode(input).unwrap();
		assert_eq!(consumed, input.len());
		assert_eq!(value.get("foo"), Some(&bytes("bar")));
		assert_eq!(value.get("hello"), Some(&BValue::Integer(52)));
		assert_eq!(value.as_dict().unwrap().len(), 2);
	}

	#[test]
	fn test_decode_unsorted_dict_keys() {
		let (_, value) = decode_bencode(b"d1:bi2e1:ai1ee").unwrap();
		let keys: Vec<&[u8]> = value.as_dict().unwrap().keys().map(|k| k.as_slice()).collect();
		assert_eq!(keys, vec![b"a".as_slice(), b"b".as_slice()]);
	}

	#[test]
	fn test_decode_reports_consumed_with_trailing_bytes() {
		let (consumed, value) = decode_bencode(b"i7eextra").unwrap();
		assert_eq!(consumed, 3);
		assert_eq!(value, BValue::Integer(7));
	}

	#[test]
	fn test_decode_empty_input() {
		assert_eq!(decode_bencode(b""), Err(BencodeError::UnexpectedEnd));
	}

	#[test]
	fn test_decode_integer_missing_e() {
		assert!(matches!(decode_bencode(b"i12"), Err(BencodeError::MalformedInteger(_))));
	}

	#[test]
	fn test_decode_integer_not_a_number() {
		assert!(matches!(decode_bencode(b"iabce"), Err(BencodeError::MalformedInteger(_))));
		assert!(matches!(decode_bencode(b"ie"), Err(BencodeError::MalformedInteger(_))));
	}

	#[test]
	fn test_decode_string_missing_colon() {
		assert!(matches!(decode_bencode(b"5hello"), Err(BencodeError::MalformedLength(_))));
	}

	#[test]
	fn test_decode_string_too_long() {
		assert!(matches!(decode_bencode(b"4:ab"), Err(BencodeError::MalformedLength(_))));
	}

	#[test]
	fn test_decode_list_unclosed() {
		assert_eq!(decode_bencode(b"l4:spam"), Err(BencodeError::UnterminatedList));
	}

	#[test]
	fn test_decode_dict_unclosed() {
		assert_eq!(decode_bencode(b"d3:foo4:spam"), Err(BencodeError::UnterminatedDict));
		assert_eq!(decode_bencode(b"d"), Err(BencodeError::UnterminatedDict));
	}

	#[test]
	fn test_decode_dict_key_not_string() {
		assert!(matches!(decode_bencode(b"di42e4:spame"), Err(BencodeError::MalformedLength(_))));
	}

	#[test]
	fn test_decode_unsupported_type() {
		assert_eq!(decode_bencode(b"x"), Err(BencodeError::UnsupportedType(b'x')));
	}

	fn nested_lists(depth: usize) -> Vec<u8> {
		let mut input = vec![b'l'; depth];
		input.extend(std::iter::repeat(b'e').take(depth));
		input
	}

	#[test]
	fn test_decode_nesting_at_limit() {
		let (consumed, _) = decode_bencode(&nested_lists(MAX_NESTING_DEPTH)).unwrap();
		assert_eq!(consumed, 2 * MAX_NESTING_DEPTH);
	}

	#[test]
	fn test_decode_rejects_deep_nesting() {
		assert_eq!(
			decode_bencode(&nested_lists(MAX_NESTING_DEPTH + 1)),
			Err(BencodeError::NestingTooDeep(MAX_NESTING_DEPTH))
		);
		assert_eq!(
			decode_bencode(&nested_lists(200_000)),
			Err(BencodeError::NestingTooDeep(MAX_NESTING_DEPTH))
		);
	}

	#[test]
	fn test_decode_rejects_deep_dict_nesting() {
		let mut input = b"d1:a".repeat(MAX_NESTING_DEPTH + 1);
		input.extend_from_slice(b"i1e");
		input.extend(std::iter::repeat(b'e').take(MAX_NESTING_DEPTH + 1));
		assert_eq!(decode_bencode(&input), Err(BencodeError::NestingTooDeep(MAX_NESTING_DEPTH)));
	}
}
