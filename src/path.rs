//! Slash-separated, backslash-escaped entry paths.
//!
//! Decoder states mirror a small hand-rolled state machine: `NORMAL` copies
//! bytes through and splits on `/`; `ESCAPE` accepts exactly `\` or `/` and
//! returns to `NORMAL`. Any other escaped byte, or an escape left open at
//! end of input, is rejected — the corpus this format is compatible with
//! only ever emits `\\` and `\/`, so that is all this decoder accepts back.

use failure::Fail;

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum PathError {
	#[fail(display = "entry path has an incomplete escape sequence at its end")]
	IncompleteEscape,
	#[fail(display = "entry path has an invalid escape sequence '\\{}'", 0)]
	InvalidEscape(char),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
	Normal,
	Escape,
}

/// Split a path string into its elements. Character `/` separates elements;
/// `\` starts an escape sequence. Empty input decodes to a single empty
/// element (`[""]`), matching the behaviour of an empty top-level name.
pub fn decode(path: &str) -> Result<Vec<String>, PathError> {
	let mut elements = Vec::new();
	let mut state = State::Normal;
	let mut element = String::new();

	for c in path.chars() {
		match state {
			State::Normal => match c {
				'/' => {
					elements.push(std::mem::take(&mut element));
				}
				'\\' => state = State::Escape,
				_ => element.push(c),
			},
			State::Escape => match c {
				'\\' | '/' => {
					element.push(c);
					state = State::Normal;
				}
				_ => return Err(PathError::InvalidEscape(c)),
			},
		}
	}
	elements.push(element);

	if state == State::Escape {
		return Err(PathError::IncompleteEscape);
	}

	Ok(elements)
}

/// Escape a single path element: `\` -> `\\`, `/` -> `\/`, other bytes pass
/// through unchanged.
pub fn encode_element(element: &str) -> String {
	let mut res = String::with_capacity(element.len());
	for c in element.chars() {
		match c {
			'\\' => res.push_str("\\\\"),
			'/' => res.push_str("\\/"),
			_ => res.push(c),
		}
	}
	res
}

/// Join path elements back into their escaped, slash-separated string form.
pub fn encode(elements: &[String]) -> String {
	elements
		.iter()
		.map(|e| encode_element(e))
		.collect::<Vec<_>>()
		.join("/")
}
