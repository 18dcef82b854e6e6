use crate::{
	compose::{Middleware, Next, Outcome, Stage},
	pattern::{self, MatchOptions, Matcher, Param, UrlOptions, UrlParams},
	Context, Error,
};
use futures::future::BoxFuture;
use hyper::Method;
use std::{
	collections::HashMap,
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOptions {
	pub name: Option<String>,
	pub sensitive: bool,
	pub strict: bool,
	/// Match the whole path rather than a prefix of it.
	pub end: bool,
	pub ignore_captures: bool,
}

impl Default for RouteOptions {
	fn default() -> Self {
		Self {
			name: None,
			sensitive: false,
			strict: false,
			end: true,
			ignore_captures: false,
		}
	}
}

impl RouteOptions {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Self::default()
		}
	}

	fn match_options(&self) -> MatchOptions {
		MatchOptions {
			sensitive: self.sensitive,
			strict: self.strict,
			end: self.end,
		}
	}
}

/// Middleware bound to a path parameter. It receives the decoded value (if the parameter
/// captured anything) ahead of the context.
pub trait ParamMiddleware: Send + Sync + 'static {
	fn handle<'a>(
		&'a self,
		value: Option<String>,
		ctx: &'a mut Context,
		next: Next<'a>,
	) -> BoxFuture<'a, Outcome>;
}

impl<F> ParamMiddleware for F
where
	F: for<'a> Fn(Option<String>, &'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome>
		+ Send
		+ Sync
		+ 'static,
{
	fn handle<'a>(
		&'a self,
		value: Option<String>,
		ctx: &'a mut Context,
		next: Next<'a>,
	) -> BoxFuture<'a, Outcome> {
		self(value, ctx, next)
	}
}

pub type Validator = Arc<dyn ParamMiddleware>;

pub fn validator<F>(f: F) -> Validator
where
	F: for<'a> Fn(Option<String>, &'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome>
		+ Send
		+ Sync
		+ 'static,
{
	Arc::new(f)
}

struct ParamStage {
	param: String,
	validator: Validator,
}

impl Middleware for ParamStage {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		let value = ctx.params.get(&self.param).cloned();
		self.validator.handle(value, ctx, next)
	}
}

#[derive(Clone)]
struct Handler {
	/// Set for validators spliced in by [`Route::param`].
	param: Option<String>,
	stage: Stage,
}

/// One registered pattern with its methods and middleware stack.
#[derive(Clone)]
pub struct Route {
	path: String,
	methods: Vec<Method>,
	params: Vec<Param>,
	matcher: Matcher,
	stack: Vec<Handler>,
	opts: RouteOptions,
}

impl Debug for Route {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Route")
			.field("path", &self.path)
			.field("methods", &self.methods)
			.field("name", &self.opts.name)
			.field("regexp", &self.matcher.as_str())
			.field("stack", &self.stack.len())
			.finish()
	}
}

impl Route {
	/// An empty `methods` list answers every method. `GET` brings `HEAD` along.
	pub fn new(
		path: &str,
		methods: &[Method],
		stack: Vec<Stage>,
		opts: RouteOptions,
	) -> Result<Self, Error> {
		let mut allowed: Vec<Method> = Vec::with_capacity(methods.len() + 1);
		for method in methods {
			if allowed.contains(method) {
				continue;
			}
			allowed.push(method.clone());
			if *method == Method::GET && !allowed.contains(&Method::HEAD) {
				allowed.insert(0, Method::HEAD);
			}
		}

		let (matcher, params) = pattern::compile(path, opts.match_options())?;

		Ok(Self {
			path: path.to_owned(),
			methods: allowed,
			params,
			matcher,
			stack: stack
				.into_iter()
				.map(|stage| Handler { param: None, stage })
				.collect(),
			opts,
		})
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn name(&self) -> Option<&str> {
		self.opts.name.as_deref()
	}

	pub fn methods(&self) -> &[Method] {
		&self.methods
	}

	pub fn param_names(&self) -> &[Param] {
		&self.params
	}

	pub fn matcher(&self) -> &Matcher {
		&self.matcher
	}

	pub fn options(&self) -> &RouteOptions {
		&self.opts
	}

	pub fn stages(&self) -> impl Iterator<Item = &Stage> {
		self.stack.iter().map(|handler| &handler.stage)
	}

	pub fn is_match(&self, path: &str) -> bool {
		self.matcher.test(path)
	}

	pub fn captures(&self, path: &str) -> Vec<Option<String>> {
		if self.opts.ignore_captures {
			return vec![];
		}
		self.matcher.capture(path)
	}

	/// Binds `captures` into `params` under this route's parameter names. A parameter that
	/// captured nothing removes any earlier value of the same name.
	pub fn params(&self, captures: &[Option<String>], params: &mut HashMap<String, String>) {
		for (param, capture) in self.params.iter().zip(captures) {
			let key = param.key.to_string();
			match capture {
				Some(raw) => {
					params.insert(key, pattern::decode(raw));
				}
				None => {
					params.remove(&key);
				}
			}
		}
	}

	pub fn url(&self, params: impl Into<UrlParams>, options: &UrlOptions) -> Result<String, Error> {
		pattern::url(&self.path, params, options)
	}

	fn rank(&self, param: &str) -> Option<usize> {
		self.params.iter().position(|p| p.key.to_string() == param)
	}

	/// Splices a validator for `param` into the stack: ahead of the first plain handler or the
	/// first validator of a later parameter, otherwise at the end. Parameters this route doesn't
	/// have are ignored.
	pub fn param(&mut self, param: &str, validator: Validator) -> &mut Self {
		let rank = match self.rank(param) {
			Some(rank) => rank,
			None => return self,
		};

		let at = self.stack.iter().position(|handler| match &handler.param {
			None => true,
			Some(other) => self.rank(other).map_or(false, |r| r > rank),
		});

		let handler = Handler {
			param: Some(param.to_owned()),
			stage: Arc::new(ParamStage {
				param: param.to_owned(),
				validator,
			}),
		};

		match at {
			Some(i) => self.stack.insert(i, handler),
			None => self.stack.push(handler),
		}
		self
	}

	/// Recompiles the route as `prefix + path`. Prefixes accumulate across calls.
	pub fn set_prefix(&mut self, prefix: &str) -> Result<&mut Self, Error> {
		if !self.path.is_empty() {
			let path = format!("{}{}", prefix, self.path);
			let (matcher, params) = pattern::compile(&path, self.opts.match_options())?;
			self.path = path;
			self.matcher = matcher;
			self.params = params;
		}
		Ok(self)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::compose::handler;
	use futures::{future, FutureExt};

	fn get_route(path: &str, stack: Vec<Stage>) -> Route {
		Route::new(path, &[Method::GET], stack, RouteOptions::default()).unwrap()
	}

	fn noop() -> Stage {
		handler(|_| Ok(()))
	}

	fn pass() -> Validator {
		validator(|_, ctx, next| next.run(ctx))
	}

	fn order(route: &Route) -> Vec<Option<&str>> {
		route.stack.iter().map(|h| h.param.as_deref()).collect()
	}

	#[test]
	fn get_implies_head() {
		let route = get_route("/users", vec![noop()]);
		assert_eq!(route.methods(), [Method::HEAD, Method::GET]);

		let route = Route::new(
			"/users",
			&[Method::HEAD, Method::GET, Method::POST, Method::POST],
			vec![],
			RouteOptions::default(),
		)
		.unwrap();
		assert_eq!(route.methods(), [Method::HEAD, Method::GET, Method::POST]);
	}

	#[test]
	fn binds_decoded_params() {
		let route = get_route("/users/:name/:tab?", vec![]);
		let mut params = HashMap::new();
		params.insert("tab".to_owned(), "stale".to_owned());

		let captures = route.captures("/users/j%C3%BCrgen");
		route.params(&captures, &mut params);

		assert_eq!(params.get("name").map(String::as_str), Some("jürgen"));
		assert!(!params.contains_key("tab"));
	}

	#[test]
	fn bad_escapes_stay_raw() {
		let route = get_route("/files/:name", vec![]);
		let mut params = HashMap::new();

		for raw in ["%E0%A4%A", "a%zz%20b", "100%"] {
			route.params(&route.captures(&format!("/files/{}", raw)), &mut params);
			assert_eq!(params.get("name").map(String::as_str), Some(raw));
		}
	}

	#[test]
	fn ignored_captures() {
		let opts = RouteOptions {
			end: false,
			ignore_captures: true,
			..RouteOptions::default()
		};
		let route = Route::new("(.*)", &[], vec![noop()], opts).unwrap();

		assert!(route.is_match("/anything"));
		assert!(route.captures("/anything").is_empty());
		assert!(route.methods().is_empty());
	}

	#[test]
	fn validators_sort_by_param_rank() {
		let mut route = get_route("/a/:x/:y", vec![noop()]);

		route.param("y", pass());
		assert_eq!(order(&route), [Some("y"), None]);

		route.param("x", pass());
		assert_eq!(order(&route), [Some("x"), Some("y"), None]);
	}

	#[test]
	fn unknown_param_is_ignored() {
		let mut route = get_route("/a/:x", vec![noop()]);
		route.param("nope", pass());
		assert_eq!(order(&route), [None]);
	}

	#[test]
	fn appends_when_nothing_ranks_later() {
		let mut route = get_route("/a/:x", vec![]);
		route.param("x", pass());
		route.param("x", pass());
		assert_eq!(order(&route), [Some("x"), Some("x")]);
	}

	#[test]
	fn prefixes_accumulate() {
		let mut route = get_route("/posts/:pid", vec![]);

		route.set_prefix("/forums/:fid").unwrap();
		route.set_prefix("/api").unwrap();

		assert_eq!(route.path(), "/api/forums/:fid/posts/:pid");
		let keys: Vec<String> = route.param_names().iter().map(|p| p.key.to_string()).collect();
		assert_eq!(keys, ["fid", "pid"]);
		assert!(route.is_match("/api/forums/1/posts/2"));
		assert!(!route.is_match("/forums/1/posts/2"));
	}

	#[test]
	fn generates_urls() {
		let opts = RouteOptions::named("user");
		let route = Route::new("/users/:id", &[Method::GET], vec![], opts).unwrap();
		assert_eq!(route.name(), Some("user"));
		assert_eq!(route.url(["3"], &UrlOptions::default()).unwrap(), "/users/3");
	}

	#[tokio::test]
	async fn validator_receives_param_value() {
		let mut route = get_route("/users/:id", vec![]);
		route.param(
			"id",
			validator(|value, ctx, _next| {
				ctx.set_body(value.unwrap_or_default());
				future::ready(Ok(())).boxed()
			}),
		);

		let mut ctx = Context::new(Method::GET, "/users/7");
		route.params(&route.captures("/users/7"), &mut ctx.params);
		let stage = route.stages().next().cloned().unwrap();
		stage.handle(&mut ctx, Next::end()).await.unwrap();

		assert_eq!(ctx.body(), Some(&b"7"[..]));
	}
}
