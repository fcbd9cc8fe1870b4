//! Environment-block construction for `CreateProcessW`, per §4.3.

use std::collections::BTreeMap;

/// The variables the Windows CRT and various system DLLs expect to find; if the caller's
/// environment omits them, the current process's value is injected.
const REQUIRED: &[&str] = &["SYSTEMROOT", "SYSTEMDRIVE", "TEMP"];

/// Builds the sorted, case-insensitive `NAME=VALUE\0...\0` environment block `CreateProcessW`
/// expects when `CREATE_UNICODE_ENVIRONMENT` is set.
///
/// `vars` is the caller-supplied `NAME=VALUE` pairs (already split); `current_process_env` is a
/// lookup into the current process's environment, used only to fill in [`REQUIRED`] variables the
/// caller did not supply. Returns the block as a `Vec<String>` of individual `NAME=VALUE` entries,
/// already deduplicated and sorted; callers are expected to UTF-16-encode and concatenate with
/// trailing NULs (see [`crate::os::windows::c_wrappers`]).
#[must_use]
pub fn build_env_block(
	vars: &[(String, String)],
	current_process_env: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
	let mut map: BTreeMap<String, String> = BTreeMap::new();
	for (name, value) in vars {
		map.insert(name.clone(), value.clone());
	}
	for &required in REQUIRED {
		let present = map.keys().any(|k| k.eq_ignore_ascii_case(required));
		if !present {
			if let Some(v) = current_process_env(required) {
				map.insert(required.to_string(), v);
			}
		}
	}
	map.into_iter()
		.map(|(k, v)| format!("{k}={v}"))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn required_vars_injected_when_absent() {
		let vars = vec![("PATH".to_string(), "C:\\bin".to_string())];
		let block = build_env_block(&vars, |name| match name {
			"SYSTEMROOT" => Some("C:\\Windows".to_string()),
			"SYSTEMDRIVE" => Some("C:".to_string()),
			"TEMP" => Some("C:\\Temp".to_string()),
			_ => None,
		});
		assert!(block.iter().any(|e| e.starts_with("SYSTEMROOT=")));
		assert!(block.iter().any(|e| e.starts_with("SYSTEMDRIVE=")));
		assert!(block.iter().any(|e| e.starts_with("TEMP=")));
	}

	#[test]
	fn callers_value_preserved_case_insensitively() {
		let vars = vec![("systemroot".to_string(), "D:\\Custom".to_string())];
		let block = build_env_block(&vars, |_| Some("C:\\Windows".to_string()));
		assert_eq!(block.iter().filter(|e| e.to_ascii_lowercase().starts_with("systemroot=")).count(), 1);
		assert!(block.contains(&"systemroot=D:\\Custom".to_string()));
	}

	#[test]
	fn every_caller_var_present() {
		let vars = vec![
			("FOO".to_string(), "bar".to_string()),
			("SYSTEMROOT".to_string(), "C:\\Windows".to_string()),
			("SYSTEMDRIVE".to_string(), "C:".to_string()),
			("TEMP".to_string(), "C:\\Temp".to_string()),
		];
		let block = build_env_block(&vars, |_| None);
		assert!(block.contains(&"FOO=bar".to_string()));
	}
}
