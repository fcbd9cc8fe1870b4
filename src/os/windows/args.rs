//! Command-line quoting for `CreateProcessW`, per §4.3.

/// Whether an argument should be quoted normally or passed through untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuoteMode {
	/// Apply the standard quoting rules below.
	Auto,
	/// Copy the argument through verbatim (used for e.g. `cmd /c` where the caller has already
	/// quoted the full tail).
	Verbatim,
}

/// Quotes a single argument per the rules in §4.3 and appends it to `out`.
fn quote_one(arg: &str, mode: QuoteMode, out: &mut String) {
	if mode == QuoteMode::Verbatim {
		out.push_str(arg);
		return;
	}

	let needs_quotes = arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"');
	if !needs_quotes {
		out.push_str(arg);
		return;
	}

	if !arg.contains('"') && !arg.contains('\\') {
		out.push('"');
		out.push_str(arg);
		out.push('"');
		return;
	}

	out.push('"');
	let mut backslashes = 0usize;
	for c in arg.chars() {
		match c {
			'\\' => {
				backslashes += 1;
			}
			'"' => {
				for _ in 0..backslashes * 2 + 1 {
					out.push('\\');
				}
				out.push('"');
				backslashes = 0;
			}
			_ => {
				for _ in 0..backslashes {
					out.push('\\');
				}
				backslashes = 0;
				out.push(c);
			}
		}
	}
	for _ in 0..backslashes * 2 {
		out.push('\\');
	}
	out.push('"');
}

/// Builds the full, null-terminated (by the caller, on conversion to UTF-16) command line from
/// an argv-style argument vector. `args` conventionally includes argv[0] (the program name) as
/// its first element, matching the external interface in §6.
#[must_use]
pub fn build_command_line(args: &[impl AsRef<str>], mode: QuoteMode) -> String {
	let mut out = String::new();
	for (i, arg) in args.iter().enumerate() {
		if i > 0 {
			out.push(' ');
		}
		quote_one(arg.as_ref(), mode, &mut out);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn q(s: &str) -> String {
		let mut out = String::new();
		quote_one(s, QuoteMode::Auto, &mut out);
		out
	}

	#[test]
	fn plain_argument_unquoted() {
		assert_eq!(q("hello"), "hello");
	}

	#[test]
	fn whitespace_gets_simple_quotes() {
		assert_eq!(q("a b"), "\"a b\"");
	}

	#[test]
	fn embedded_quote_is_escaped() {
		assert_eq!(q("c\"d"), "\"c\\\"d\"");
	}

	#[test]
	fn trailing_backslash_before_quote_is_doubled() {
		assert_eq!(q("e\\\"f"), r#""e\\\"f""#);
	}

	#[test]
	fn full_command_line_scenario_6() {
		let args = ["prog", "a b", "c\"d", "e\\\"f"];
		let line = build_command_line(&args, QuoteMode::Auto);
		assert_eq!(line, r#"prog "a b" "c\"d" "e\\\"f""#);
	}

	#[test]
	fn verbatim_mode_passes_through() {
		assert_eq!(build_command_line(&["cmd", "/c dir"], QuoteMode::Verbatim), "cmd /c dir");
	}
}
