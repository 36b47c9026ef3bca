// Copyright 2022 pyke.io
//           2019-2021 Tauri Programme within The Commons Conservancy
//                     [https://tauri.studio/]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Capability pattern matching.
//!
//! Permissions and grants share a single syntax: `ns/verb` matches exactly,
//! `ns/*` matches every capability under the namespace, and `*` matches
//! everything. Both the permission engine and user grant evaluation go
//! through [`matches`].

/// Determines whether a capability pattern covers the given capability.
///
/// A pattern covers a capability when they are equal, when the pattern is
/// the super-wildcard `*`, or when the pattern ends in `/*` and the
/// capability starts with the pattern's namespace prefix followed by `/`.
pub fn matches(pattern: &str, capability: &str) -> bool {
	if pattern == "*" || pattern == capability {
		return true;
	}
	if let Some(prefix) = pattern.strip_suffix("/*") {
		if let Some(rest) = capability.strip_prefix(prefix) {
			return rest.starts_with('/');
		}
	}
	false
}

/// Determines whether any pattern in the set covers the given capability.
pub fn any_matches<'a, I: IntoIterator<Item = &'a str>>(patterns: I, capability: &str) -> bool {
	patterns.into_iter().any(|pattern| matches(pattern, capability))
}

/// Whether a string is a well-formed capability, i.e. a non-empty `/`-joined
/// pair of non-empty segments, a namespace wildcard, or the super-wildcard.
pub fn is_valid(capability: &str) -> bool {
	if capability == "*" {
		return true;
	}
	match capability.split_once('/') {
		Some((namespace, verb)) => !namespace.is_empty() && !verb.is_empty() && !namespace.contains('*'),
		None => false
	}
}

#[cfg(test)]
mod tests {
	use quickcheck_macros::quickcheck;

	use super::{any_matches, is_valid, matches};

	#[test]
	fn exact_match() {
		assert!(matches("fs/read", "fs/read"));
		assert!(!matches("fs/read", "fs/write"));
		assert!(!matches("fs/read", "fs"));
	}

	#[test]
	fn namespace_wildcard() {
		assert!(matches("fs/*", "fs/read"));
		assert!(matches("fs/*", "fs/read/deep"));
		assert!(!matches("fs/*", "fsx/read"));
		assert!(!matches("fs/*", "fs"));
		assert!(!matches("view/*", "fs/read"));
	}

	#[test]
	fn super_wildcard() {
		assert!(matches("*", "fs/read"));
		assert!(matches("*", "anything/at/all"));
	}

	#[test]
	fn set_matching() {
		let patterns = ["view/manage", "fs/*"];
		assert!(any_matches(patterns, "fs/read"));
		assert!(any_matches(patterns, "view/manage"));
		assert!(!any_matches(patterns, "view/create"));
		assert!(!any_matches([], "fs/read"));
	}

	#[test]
	fn validity() {
		assert!(is_valid("fs/read"));
		assert!(is_valid("fs/*"));
		assert!(is_valid("*"));
		assert!(!is_valid("fs"));
		assert!(!is_valid("/read"));
		assert!(!is_valid("fs/"));
		assert!(!is_valid("*/read"));
	}

	// The wildcard subsumption law: whatever an exact pattern covers, the
	// enclosing namespace wildcard and the super-wildcard also cover.
	#[quickcheck]
	fn wildcards_subsume(namespace: String, verb: String) -> bool {
		if namespace.is_empty() || verb.is_empty() || namespace.contains('/') || namespace.contains('*') || verb.contains('*') {
			return true;
		}
		let capability = format!("{namespace}/{verb}");
		matches(&capability, &capability) && matches(&format!("{namespace}/*"), &capability) && matches("*", &capability)
	}
}
