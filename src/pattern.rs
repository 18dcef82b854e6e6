use crate::Error;
use regex::Regex;
use std::{
	borrow::Cow,
	collections::HashMap,
	fmt::{self, Display, Formatter},
	iter::Peekable,
	str::Chars,
};
use ::url::form_urlencoded;

/// The name a captured value is bound under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	/// `:name` in the pattern.
	Named(String),
	/// An unnamed group, numbered from zero in order of appearance.
	Index(usize),
}

impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Named(name) => f.write_str(name),
			Key::Index(index) => write!(f, "{}", index),
		}
	}
}

/// One parameter slot of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
	pub key: Key,
	/// `/` or `.` directly in front of the parameter; it is matched together with the value.
	pub prefix: Option<char>,
	pub delimiter: char,
	pub optional: bool,
	pub repeat: bool,
	/// Optional parameter whose prefix stays required because other text follows it.
	pub partial: bool,
	pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	Literal(String),
	Param(Param),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
	pub sensitive: bool,
	pub strict: bool,
	pub end: bool,
}

impl Default for MatchOptions {
	fn default() -> Self {
		Self {
			sensitive: false,
			strict: false,
			end: true,
		}
	}
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
	regex: Regex,
}

impl Matcher {
	pub fn test(&self, path: &str) -> bool {
		self.regex.is_match(path)
	}

	/// Raw capture values in group order. Groups that did not take part in the match are `None`.
	pub fn capture(&self, path: &str) -> Vec<Option<String>> {
		match self.regex.captures(path) {
			Some(caps) => caps
				.iter()
				.skip(1)
				.map(|group| group.map(|m| m.as_str().to_owned()))
				.collect(),
			None => vec![],
		}
	}

	pub fn group_count(&self) -> usize {
		self.regex.captures_len() - 1
	}

	pub fn as_str(&self) -> &str {
		self.regex.as_str()
	}
}

/// Compiles `pattern` into a matcher and its ordered parameter list.
pub fn compile(pattern: &str, options: MatchOptions) -> Result<(Matcher, Vec<Param>), Error> {
	let tokens = parse(pattern)?;
	let regex = Regex::new(&to_regex(&tokens, options))
		.map_err(|e| Error::pattern(pattern, e.to_string()))?;

	let params: Vec<Param> = tokens
		.into_iter()
		.filter_map(|token| match token {
			Token::Param(param) => Some(param),
			Token::Literal(_) => None,
		})
		.collect();

	let matcher = Matcher { regex };
	if matcher.group_count() != params.len() {
		return Err(Error::pattern(
			pattern,
			"parameter patterns must not contain capturing groups",
		));
	}

	Ok((matcher, params))
}

pub fn parse(pattern: &str) -> Result<Vec<Token>, Error> {
	let mut tokens = vec![];
	let mut literal = String::new();
	// last literal char came from an escape and can't act as a prefix
	let mut escaped = false;
	let mut index = 0;
	let mut chars = pattern.chars().peekable();

	while let Some(c) = chars.next() {
		let (key, custom) = match c {
			'\\' => {
				let next = chars
					.next()
					.ok_or_else(|| Error::pattern(pattern, "trailing escape character"))?;
				literal.push(next);
				escaped = true;
				continue;
			}
			':' => {
				let mut name = String::new();
				while let Some(&n) = chars.peek() {
					if !(n.is_ascii_alphanumeric() || n == '_') {
						break;
					}
					name.push(n);
					chars.next();
				}

				if name.is_empty() {
					return Err(Error::pattern(pattern, "expected a parameter name after `:`"));
				}

				let custom = if chars.peek() == Some(&'(') {
					chars.next();
					Some(read_group(pattern, &mut chars)?)
				} else {
					None
				};
				(Key::Named(name), custom)
			}
			'(' => {
				let group = read_group(pattern, &mut chars)?;
				index += 1;
				(Key::Index(index - 1), Some(group))
			}
			'*' => {
				index += 1;
				(Key::Index(index - 1), Some(".*".to_owned()))
			}
			')' => return Err(Error::pattern(pattern, "unbalanced `)`")),
			_ => {
				literal.push(c);
				escaped = false;
				continue;
			}
		};

		let prefix = match literal.chars().last() {
			Some(p) if (p == '/' || p == '.') && !escaped => {
				literal.pop();
				Some(p)
			}
			_ => None,
		};
		if !literal.is_empty() {
			tokens.push(Token::Literal(std::mem::take(&mut literal)));
		}
		escaped = false;

		let modifier = match chars.peek() {
			Some(&m) if c != '*' && (m == '?' || m == '*' || m == '+') => {
				chars.next();
				Some(m)
			}
			_ => None,
		};
		let delimiter = prefix.unwrap_or('/');
		let partial = matches!((prefix, chars.peek()), (Some(p), Some(&n)) if n != p);

		tokens.push(Token::Param(Param {
			key,
			prefix,
			delimiter,
			optional: matches!(modifier, Some('?') | Some('*')),
			repeat: matches!(modifier, Some('+') | Some('*')),
			partial,
			pattern: custom.unwrap_or_else(|| format!("[^{}]+?", delimiter)),
		}));
	}

	if !literal.is_empty() {
		tokens.push(Token::Literal(literal));
	}

	Ok(tokens)
}

fn read_group(pattern: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String, Error> {
	let mut group = String::new();
	let mut depth = 1;

	while let Some(c) = chars.next() {
		match c {
			'\\' => {
				group.push(c);
				if let Some(escaped) = chars.next() {
					group.push(escaped);
				}
				continue;
			}
			'(' => depth += 1,
			')' => {
				depth -= 1;
				if depth == 0 {
					if group.is_empty() {
						return Err(Error::pattern(pattern, "empty group"));
					}
					return Ok(group);
				}
			}
			_ => {}
		}
		group.push(c);
	}

	Err(Error::pattern(pattern, "unbalanced `(`"))
}

fn to_regex(tokens: &[Token], options: MatchOptions) -> String {
	let mut route = String::new();

	for token in tokens {
		match token {
			Token::Literal(text) => route.push_str(&regex::escape(text)),
			Token::Param(param) => {
				let prefix = param
					.prefix
					.map(|p| regex::escape(p.encode_utf8(&mut [0; 4])))
					.unwrap_or_default();

				let mut capture = format!("(?:{})", param.pattern);
				if param.repeat {
					capture = format!("{}(?:{}{})*", capture, prefix, capture);
				}

				let capture = match (param.optional, param.partial) {
					(true, false) => format!("(?:{}({}))?", prefix, capture),
					(true, true) => format!("{}({})?", prefix, capture),
					(false, _) => format!("{}({})", prefix, capture),
				};
				route.push_str(&capture);
			}
		}
	}

	let ends_with_delimiter = route.ends_with('/');
	if !options.strict {
		if ends_with_delimiter {
			route.pop();
		}
		route.push_str("/?");
	}

	if options.end {
		route.push('$');
	} else if !(options.strict && ends_with_delimiter) {
		route.push_str("(?:/|$)");
	}

	let flags = if options.sensitive { "" } else { "(?i)" };
	format!("{}^{}", flags, route)
}

/// Percent-decodes a captured value. The raw text is kept whole when an escape is malformed or
/// the decoded bytes aren't UTF-8.
pub(crate) fn decode(raw: &str) -> String {
	if !well_escaped(raw) {
		return raw.to_owned();
	}

	urlencoding::decode(raw)
		.map(Cow::into_owned)
		.unwrap_or_else(|_| raw.to_owned())
}

fn well_escaped(raw: &str) -> bool {
	let bytes = raw.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			match bytes.get(i + 1..i + 3) {
				Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => i += 3,
				_ => return false,
			}
		} else {
			i += 1;
		}
	}
	true
}

/// Percent-encodes one path segment, leaving `!'()*` alone like `encodeURIComponent` does.
fn encode(segment: &str) -> String {
	let mut encoded = urlencoding::encode(segment).into_owned();
	for (escape, raw) in [("%21", "!"), ("%27", "'"), ("%28", "("), ("%29", ")"), ("%2A", "*")] {
		if encoded.contains(escape) {
			encoded = encoded.replace(escape, raw);
		}
	}
	encoded
}

/// Values used to fill a pattern's parameter slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UrlParams {
	#[default]
	None,
	/// Assigned to the pattern's parameters in order.
	Positional(Vec<String>),
	Named(HashMap<String, String>),
}

impl UrlParams {
	fn into_values(self, tokens: &[Token]) -> HashMap<String, String> {
		match self {
			UrlParams::None => HashMap::new(),
			UrlParams::Named(values) => values,
			UrlParams::Positional(values) => tokens
				.iter()
				.filter_map(|token| match token {
					Token::Param(param) => Some(param.key.to_string()),
					Token::Literal(_) => None,
				})
				.zip(values)
				.collect(),
		}
	}
}

impl From<()> for UrlParams {
	fn from(_: ()) -> Self {
		UrlParams::None
	}
}

impl From<Vec<String>> for UrlParams {
	fn from(values: Vec<String>) -> Self {
		UrlParams::Positional(values)
	}
}

impl From<Vec<&str>> for UrlParams {
	fn from(values: Vec<&str>) -> Self {
		UrlParams::Positional(values.into_iter().map(str::to_owned).collect())
	}
}

impl<const N: usize> From<[&str; N]> for UrlParams {
	fn from(values: [&str; N]) -> Self {
		UrlParams::Positional(values.iter().map(|v| (*v).to_owned()).collect())
	}
}

impl From<HashMap<String, String>> for UrlParams {
	fn from(values: HashMap<String, String>) -> Self {
		UrlParams::Named(values)
	}
}

impl<const N: usize> From<[(&str, &str); N]> for UrlParams {
	fn from(values: [(&str, &str); N]) -> Self {
		UrlParams::Named(
			values
				.iter()
				.map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
				.collect(),
		)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
	/// Appended as-is, minus a leading `?`.
	Raw(String),
	/// Form-urlencoded in order.
	Pairs(Vec<(String, String)>),
}

impl Query {
	fn encode(&self) -> String {
		match self {
			Query::Raw(raw) => raw.trim_start_matches('?').to_owned(),
			Query::Pairs(pairs) => form_urlencoded::Serializer::new(String::new())
				.extend_pairs(pairs)
				.finish(),
		}
	}
}

impl From<&str> for Query {
	fn from(raw: &str) -> Self {
		Query::Raw(raw.to_owned())
	}
}

impl From<String> for Query {
	fn from(raw: String) -> Self {
		Query::Raw(raw)
	}
}

impl From<Vec<(String, String)>> for Query {
	fn from(pairs: Vec<(String, String)>) -> Self {
		Query::Pairs(pairs)
	}
}

impl<const N: usize> From<[(&str, &str); N]> for Query {
	fn from(pairs: [(&str, &str); N]) -> Self {
		Query::Pairs(
			pairs
				.iter()
				.map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
				.collect(),
		)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
	pub query: Option<Query>,
}

impl UrlOptions {
	pub fn with_query(query: impl Into<Query>) -> Self {
		Self {
			query: Some(query.into()),
		}
	}
}

/// Generates a concrete path from `pattern`.
///
/// ```
/// use mortar::{url, UrlOptions};
///
/// let path = url("/users/:id", [("id", "3")], &UrlOptions::with_query([("limit", "1")])).unwrap();
/// assert_eq!(path, "/users/3?limit=1");
/// ```
pub fn url(
	pattern: &str,
	params: impl Into<UrlParams>,
	options: &UrlOptions,
) -> Result<String, Error> {
	let tokens = parse(&pattern.replace("(.*)", ""))?;
	let values = params.into().into_values(&tokens);
	let mut path = fill(&tokens, &values)?;

	if let Some(query) = &options.query {
		let query = query.encode();
		if !query.is_empty() {
			path.push('?');
			path.push_str(&query);
		}
	}

	Ok(path)
}

fn fill(tokens: &[Token], values: &HashMap<String, String>) -> Result<String, Error> {
	let mut path = String::new();

	for token in tokens {
		let param = match token {
			Token::Literal(text) => {
				path.push_str(text);
				continue;
			}
			Token::Param(param) => param,
		};

		let name = param.key.to_string();
		let value = match values.get(&name) {
			Some(value) => value,
			None if param.optional => {
				if let (true, Some(prefix)) = (param.partial, param.prefix) {
					path.push(prefix);
				}
				continue;
			}
			None => return Err(Error::MissingParameter(name)),
		};

		let check = Regex::new(&format!("^(?:{})$", param.pattern))
			.map_err(|e| Error::pattern(&param.pattern, e.to_string()))?;
		let segments: Vec<&str> = if param.repeat {
			value.split(param.delimiter).collect()
		} else {
			vec![value.as_str()]
		};

		for (i, segment) in segments.into_iter().enumerate() {
			let encoded = encode(segment);
			if !check.is_match(&encoded) {
				return Err(Error::InvalidParameter {
					name,
					pattern: param.pattern.clone(),
					value: segment.to_owned(),
				});
			}

			match (i, param.prefix) {
				(0, Some(prefix)) => path.push(prefix),
				(0, None) => {}
				_ => path.push(param.delimiter),
			}
			path.push_str(&encoded);
		}
	}

	Ok(path)
}

#[cfg(test)]
mod test {
	use super::*;

	fn matcher(pattern: &str, options: MatchOptions) -> (Matcher, Vec<Param>) {
		compile(pattern, options).unwrap()
	}

	fn keys(params: &[Param]) -> Vec<String> {
		params.iter().map(|p| p.key.to_string()).collect()
	}

	#[test]
	fn captures_one_value_per_param() {
		let (m, params) = matcher("/users/:user/posts/:post", MatchOptions::default());

		assert_eq!(keys(&params), ["user", "post"]);
		assert!(m.test("/users/7/posts/hello"));
		assert_eq!(
			m.capture("/users/7/posts/hello"),
			vec![Some("7".to_owned()), Some("hello".to_owned())]
		);
		assert!(!m.test("/users/7/posts"));
	}

	#[test]
	fn unnamed_groups_and_asterisk_are_numbered() {
		let (m, params) = matcher("/files/:dir/(\\d+)/*", MatchOptions::default());

		assert_eq!(keys(&params), ["dir", "0", "1"]);
		assert_eq!(
			m.capture("/files/docs/12/a/b.txt"),
			vec![
				Some("docs".to_owned()),
				Some("12".to_owned()),
				Some("a/b.txt".to_owned())
			]
		);
		assert!(!m.test("/files/docs/x/a"));
	}

	#[test]
	fn modifiers() {
		let (optional, _) = matcher("/posts/:id?", MatchOptions::default());
		assert!(optional.test("/posts"));
		assert!(optional.test("/posts/1"));
		assert_eq!(optional.capture("/posts"), vec![None]);

		let (plus, _) = matcher("/tree/:path+", MatchOptions::default());
		assert!(!plus.test("/tree"));
		assert_eq!(plus.capture("/tree/a/b/c"), vec![Some("a/b/c".to_owned())]);

		let (star, _) = matcher("/tree/:path*", MatchOptions::default());
		assert!(star.test("/tree"));
		assert!(star.test("/tree/a/b"));

		let (ext, params) = matcher("/:file.:ext", MatchOptions::default());
		assert_eq!(params[1].prefix, Some('.'));
		assert_eq!(
			ext.capture("/report.pdf"),
			vec![Some("report".to_owned()), Some("pdf".to_owned())]
		);
	}

	#[test]
	fn escaped_characters_are_literal() {
		let (m, params) = matcher("/price/\\:usd", MatchOptions::default());
		assert!(params.is_empty());
		assert!(m.test("/price/:usd"));
		assert!(!m.test("/price/10"));
	}

	#[test]
	fn option_flags() {
		let (insensitive, _) = matcher("/Users", MatchOptions::default());
		assert!(insensitive.test("/users"));
		assert!(insensitive.test("/users/"));

		let sensitive = MatchOptions {
			sensitive: true,
			..MatchOptions::default()
		};
		assert!(!matcher("/Users", sensitive).0.test("/users"));

		let strict = MatchOptions {
			strict: true,
			..MatchOptions::default()
		};
		let (m, _) = matcher("/users", strict);
		assert!(m.test("/users"));
		assert!(!m.test("/users/"));

		let open = MatchOptions {
			end: false,
			..MatchOptions::default()
		};
		let (m, _) = matcher("/users", open);
		assert!(m.test("/users"));
		assert!(m.test("/users/42/posts"));
		assert!(!m.test("/usersx"));
	}

	#[test]
	fn everything_pattern_matches_any_path() {
		let open = MatchOptions {
			end: false,
			..MatchOptions::default()
		};
		let (m, params) = matcher("(.*)", open);
		assert_eq!(params.len(), 1);
		assert!(m.test("/"));
		assert!(m.test("/anything/at/all"));
	}

	#[test]
	fn invalid_patterns() {
		let invalid = ["/users/:", "/a/(\\d+", "/a/)", "/a/()", "/a/:id((x)y)", "/a\\", "/a/([)"];
		for pattern in &invalid {
			match compile(pattern, MatchOptions::default()) {
				Err(Error::Pattern { .. }) => {}
				other => panic!("{} compiled: {:?}", pattern, other.map(|(m, _)| m)),
			}
		}
	}

	#[test]
	fn decodes_or_keeps_raw() {
		assert_eq!(decode("hello%20world"), "hello world");
		assert_eq!(decode("caf%C3%A9"), "café");
		assert_eq!(decode("%E0%A4%A"), "%E0%A4%A");
		assert_eq!(decode("a%zz%20b"), "a%zz%20b");
		assert_eq!(decode("100%"), "100%");
		assert_eq!(decode("%2"), "%2");
	}

	#[test]
	fn fills_named_and_positional() {
		let options = UrlOptions::default();
		assert_eq!(url("/users/:id", [("id", "3")], &options).unwrap(), "/users/3");
		assert_eq!(
			url("/:category/:title", ["programming", "how to"], &options).unwrap(),
			"/programming/how%20to"
		);
		assert_eq!(url("/posts/:id?", (), &options).unwrap(), "/posts");
		assert_eq!(url("/route/:foo/(.*)", ["bar"], &options).unwrap(), "/route/bar/");
	}

	#[test]
	fn fill_errors() {
		let options = UrlOptions::default();
		match url("/users/:id", (), &options) {
			Err(Error::MissingParameter(name)) => assert_eq!(name, "id"),
			other => panic!("unexpected {:?}", other),
		}
		match url("/users/:id(\\d+)", ["abc"], &options) {
			Err(Error::InvalidParameter { name, value, .. }) => {
				assert_eq!(name, "id");
				assert_eq!(value, "abc");
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn encodes_before_checking() {
		let options = UrlOptions::default();
		assert_eq!(url("/files/:name", [("name", "a/b")], &options).unwrap(), "/files/a%2Fb");
		assert_eq!(
			url("/q/:term", [("term", "a b!'()*")], &options).unwrap(),
			"/q/a%20b!'()*"
		);
	}

	#[test]
	fn appends_query() {
		let pairs = UrlOptions::with_query([("limit", "1"), ("q", "a b")]);
		assert_eq!(
			url("/users/:id", ["3"], &pairs).unwrap(),
			"/users/3?limit=1&q=a+b"
		);

		let raw = UrlOptions::with_query("?limit=1");
		assert_eq!(url("/users/:id", ["3"], &raw).unwrap(), "/users/3?limit=1");
	}
}
