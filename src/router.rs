use crate::{
	allowed::{AllowedMethodsOptions, MethodNegotiation},
	compose::{handler, Stage},
	dispatch::Dispatcher,
	pattern::{UrlOptions, UrlParams},
	route::{Route, RouteOptions, Validator},
	Error,
};
use hyper::{Method, StatusCode};
use std::{
	fmt::{self, Debug, Formatter},
	sync::Arc,
};
use tracing::{debug, trace};

/// Methods a router implements unless [`RouterOptions::methods`] says otherwise.
pub fn default_methods() -> Vec<Method> {
	vec![
		Method::HEAD,
		Method::OPTIONS,
		Method::GET,
		Method::PUT,
		Method::PATCH,
		Method::POST,
		Method::DELETE,
	]
}

#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
	/// Prepended to every route registered on or mounted into the router.
	pub prefix: Option<String>,
	pub sensitive: bool,
	pub strict: bool,
	/// The methods the server implements; see [`default_methods`].
	pub methods: Option<Vec<Method>>,
	/// Matched instead of the request path.
	pub router_path: Option<String>,
}

/// One or more route paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths(Vec<String>);

impl From<&str> for Paths {
	fn from(path: &str) -> Self {
		Paths(vec![path.to_owned()])
	}
}

impl From<String> for Paths {
	fn from(path: String) -> Self {
		Paths(vec![path])
	}
}

impl From<&[&str]> for Paths {
	fn from(paths: &[&str]) -> Self {
		Paths(paths.iter().map(|p| (*p).to_owned()).collect())
	}
}

impl<const N: usize> From<[&str; N]> for Paths {
	fn from(paths: [&str; N]) -> Self {
		Paths(paths.iter().map(|p| (*p).to_owned()).collect())
	}
}

impl From<Vec<String>> for Paths {
	fn from(paths: Vec<String>) -> Self {
		Paths(paths)
	}
}

/// Something [`Router::use_`] can attach: plain middleware or a whole router.
#[derive(Clone)]
pub enum Mount {
	Middleware(Stage),
	Router(Router),
}

impl From<Stage> for Mount {
	fn from(stage: Stage) -> Self {
		Mount::Middleware(stage)
	}
}

impl From<Router> for Mount {
	fn from(router: Router) -> Self {
		Mount::Router(router)
	}
}

impl From<Dispatcher> for Mount {
	fn from(dispatcher: Dispatcher) -> Self {
		Mount::Router(dispatcher.router().clone())
	}
}

/// Routes that matched a request, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Matched {
	pub path: Vec<Arc<Route>>,
	pub path_and_method: Vec<Arc<Route>>,
	/// Whether any path-and-method match is a real route rather than method-less middleware.
	pub route: bool,
}

/// An ordered registry of routes.
///
/// Registration, mounting, prefixing and param validators all have to happen before traffic
/// is served: [`Router::routes`] hands out a snapshot, and changes made afterwards only reach
/// dispatchers created later.
#[derive(Clone)]
pub struct Router {
	opts: RouterOptions,
	methods: Vec<Method>,
	params: Vec<(String, Validator)>,
	routes: Vec<Arc<Route>>,
}

impl Debug for Router {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("opts", &self.opts)
			.field("params", &self.params.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.field("routes", &self.routes)
			.finish()
	}
}

impl Default for Router {
	fn default() -> Self {
		Self::new()
	}
}

macro_rules! verbs {
	($($name:ident => $method:ident),* $(,)?) => {
		impl Router {
			$(
				#[doc = concat!("Registers `stack` for `", stringify!($method), "` requests.")]
				pub fn $name(
					&mut self,
					path: impl Into<Paths>,
					stack: Vec<Stage>,
				) -> Result<&mut Self, Error> {
					self.register(path, &[Method::$method], stack, RouteOptions::default())?;
					Ok(self)
				}
			)*
		}
	};
}

verbs! {
	get => GET,
	post => POST,
	put => PUT,
	patch => PATCH,
	delete => DELETE,
	head => HEAD,
	options => OPTIONS,
}

impl Router {
	pub fn new() -> Self {
		Self::with_options(RouterOptions::default())
	}

	pub fn with_options(opts: RouterOptions) -> Self {
		let methods = opts.methods.clone().unwrap_or_else(default_methods);
		Self {
			opts,
			methods,
			params: vec![],
			routes: vec![],
		}
	}

	pub fn config(&self) -> &RouterOptions {
		&self.opts
	}

	/// The implemented methods.
	pub fn methods(&self) -> &[Method] {
		&self.methods
	}

	/// Registered routes in precedence order.
	pub fn layers(&self) -> impl Iterator<Item = &Route> {
		self.routes.iter().map(|route| &**route)
	}

	/// Creates one route per path, applying the router's prefix and every validator registered
	/// with [`Router::param`] so far. Nothing is registered if any path fails to compile.
	pub fn register(
		&mut self,
		paths: impl Into<Paths>,
		methods: &[Method],
		stack: Vec<Stage>,
		opts: RouteOptions,
	) -> Result<Vec<&Route>, Error> {
		let routes = self.build(paths.into(), methods, &stack, &opts)?;
		Ok(self.commit(routes))
	}

	fn build(
		&self,
		paths: Paths,
		methods: &[Method],
		stack: &[Stage],
		opts: &RouteOptions,
	) -> Result<Vec<Route>, Error> {
		let opts = RouteOptions {
			sensitive: opts.sensitive || self.opts.sensitive,
			strict: opts.strict || self.opts.strict,
			..opts.clone()
		};

		paths
			.0
			.iter()
			.map(|path| {
				let route = Route::new(path, methods, stack.to_vec(), opts.clone())?;
				self.adopt(route)
			})
			.collect()
	}

	/// Applies the router's prefix and validators to a route about to join it.
	fn adopt(&self, mut route: Route) -> Result<Route, Error> {
		if let Some(prefix) = &self.opts.prefix {
			route.set_prefix(prefix)?;
		}
		for (param, validator) in &self.params {
			route.param(param, Arc::clone(validator));
		}
		Ok(route)
	}

	fn commit(&mut self, routes: Vec<Route>) -> Vec<&Route> {
		let start = self.routes.len();
		for route in routes {
			debug!(methods = ?route.methods(), path = route.path(), "defined route");
			self.routes.push(Arc::new(route));
		}
		self.routes[start..].iter().map(|route| &**route).collect()
	}

	/// Alias for [`Router::delete`].
	pub fn del(&mut self, path: impl Into<Paths>, stack: Vec<Stage>) -> Result<&mut Self, Error> {
		self.delete(path, stack)
	}

	/// Registers `stack` for every implemented method.
	pub fn all(&mut self, path: impl Into<Paths>, stack: Vec<Stage>) -> Result<&mut Self, Error> {
		let methods = self.methods.clone();
		self.register(path, &methods, stack, RouteOptions::default())?;
		Ok(self)
	}

	/// Attaches middleware to every path, or merges a router's routes into this one.
	pub fn use_(&mut self, middleware: impl Into<Mount>) -> Result<&mut Self, Error> {
		let routes = self.mount(None, middleware.into())?;
		self.commit(routes);
		Ok(self)
	}

	/// Like [`Router::use_`], scoped under each of `paths`. Paths of plain middleware keep their
	/// captures; a router's routes are prefixed with the path.
	pub fn use_at(
		&mut self,
		paths: impl Into<Paths>,
		middleware: impl Into<Mount>,
	) -> Result<&mut Self, Error> {
		let middleware = middleware.into();
		let mut routes = vec![];
		for path in paths.into().0 {
			routes.extend(self.mount(Some(&path), middleware.clone())?);
		}
		self.commit(routes);
		Ok(self)
	}

	fn mount(&self, path: Option<&str>, middleware: Mount) -> Result<Vec<Route>, Error> {
		match middleware {
			Mount::Router(nested) => nested
				.routes
				.into_iter()
				.map(|route| {
					let mut route =
						Arc::try_unwrap(route).unwrap_or_else(|shared| (*shared).clone());
					if let Some(path) = path {
						route.set_prefix(path.trim_end_matches('/'))?;
					}
					self.adopt(route)
				})
				.collect(),
			Mount::Middleware(stage) => {
				let opts = RouteOptions {
					end: false,
					ignore_captures: path.is_none(),
					..RouteOptions::default()
				};
				self.build(path.unwrap_or("(.*)").into(), &[], &[stage], &opts)
			}
		}
	}

	/// Sets the prefix and applies it to every route registered so far. A trailing slash is
	/// dropped. The router is left untouched if any prefixed pattern fails to compile.
	pub fn prefix(&mut self, prefix: &str) -> Result<&mut Self, Error> {
		let prefix = prefix.strip_suffix('/').unwrap_or(prefix).to_owned();

		let routes = self
			.routes
			.iter()
			.map(|route| {
				let mut route = (**route).clone();
				route.set_prefix(&prefix)?;
				Ok(Arc::new(route))
			})
			.collect::<Result<Vec<_>, Error>>()?;

		self.routes = routes;
		self.opts.prefix = Some(prefix);
		Ok(self)
	}

	/// Runs `validator` ahead of the handlers of every route, current and future, that has a
	/// parameter called `param`.
	pub fn param(&mut self, param: &str, validator: Validator) -> &mut Self {
		match self.params.iter_mut().find(|(name, _)| name == param) {
			Some(entry) => entry.1 = Arc::clone(&validator),
			None => self.params.push((param.to_owned(), Arc::clone(&validator))),
		}

		for route in &mut self.routes {
			Arc::make_mut(route).param(param, Arc::clone(&validator));
		}
		self
	}

	pub fn route(&self, name: &str) -> Option<&Route> {
		self.layers().find(|route| route.name() == Some(name))
	}

	/// Generates a path for the route called `name`.
	pub fn url(
		&self,
		name: &str,
		params: impl Into<UrlParams>,
		options: &UrlOptions,
	) -> Result<String, Error> {
		self.route(name)
			.ok_or_else(|| Error::RouteNotFound(name.to_owned()))?
			.url(params, options)
	}

	/// Answers every method on `source` with a redirect to `destination` (`301` by default).
	/// Either side may be a route name instead of a path.
	pub fn redirect(
		&mut self,
		source: &str,
		destination: &str,
		status: Option<StatusCode>,
	) -> Result<&mut Self, Error> {
		let source = self.resolve(source)?;
		let destination = self.resolve(destination)?;
		let status = status.unwrap_or(StatusCode::MOVED_PERMANENTLY);

		self.all(
			source,
			vec![handler(move |ctx| {
				ctx.redirect(&destination)?;
				ctx.set_status(status);
				Ok(())
			})],
		)
	}

	fn resolve(&self, target: &str) -> Result<String, Error> {
		if target.starts_with('/') {
			Ok(target.to_owned())
		} else {
			self.url(target, (), &UrlOptions::default())
		}
	}

	pub fn match_path(&self, path: &str, method: &Method) -> Matched {
		let mut matched = Matched::default();

		for route in &self.routes {
			trace!(path = route.path(), regexp = route.matcher().as_str(), "test");

			if !route.is_match(path) {
				continue;
			}
			matched.path.push(Arc::clone(route));

			if route.methods().is_empty() || route.methods().contains(method) {
				matched.path_and_method.push(Arc::clone(route));
				if !route.methods().is_empty() {
					matched.route = true;
				}
			}
		}

		matched
	}

	/// A dispatcher over the routes registered so far.
	pub fn routes(&self) -> Dispatcher {
		Dispatcher::new(self.clone())
	}

	/// Allow / 405 / 501 handling for this router's implemented methods.
	pub fn allowed_methods(&self, options: AllowedMethodsOptions) -> MethodNegotiation {
		MethodNegotiation::new(self.methods.clone(), options)
	}
}
