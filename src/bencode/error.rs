use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
	#[error("Unexpected end of input")]
	UnexpectedEnd,

	#[error("Malformed string length: {0}")]
	MalformedLength(String),

	#[error("Malformed integer: {0}")]
	MalformedInteger(String),

	#[error("Unterminated list (missing 'e')")]
	UnterminatedList,

	#[error("Unterminated dictionary (missing 'e')")]
	UnterminatedDict,

	#[error("Unsupported bencode type starting with byte 0x{0:02x}")]
	UnsupportedType(u8),

	#[error("Nesting deeper than {0} lists/dictionaries")]
	NestingTooDeep(usize),
}
