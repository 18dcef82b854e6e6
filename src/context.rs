use crate::{Error, Route, Router};
use hyper::{
	body::Bytes,
	header::{HeaderName, HeaderValue, LOCATION},
	http::Extensions,
	HeaderMap, Method, StatusCode, Uri,
};
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone)]
pub struct RequestParts {
	pub method: Method,
	pub path: String,
	pub query: Option<String>,
	pub headers: HeaderMap,
}

#[derive(Debug, Default)]
pub struct ResponseParts {
	/// `None` until something answers the request.
	pub status: Option<StatusCode>,
	pub headers: HeaderMap,
	pub body: Option<Bytes>,
}

/// Per-request state shared by every stage of a chain.
#[derive(Debug)]
pub struct Context {
	pub request: RequestParts,
	pub response: ResponseParts,
	/// Decoded path parameters; later routes overwrite earlier ones with the same name.
	pub params: HashMap<String, String>,
	/// Raw captures of the route bound last.
	pub captures: Vec<Option<String>>,
	/// Every route whose path matched, across all routers that saw this request.
	pub matched: Vec<Arc<Route>>,
	/// Pattern of the most specific route that matched path and method.
	pub matched_route: Option<String>,
	pub matched_route_name: Option<String>,
	/// Name of the route whose captures were bound last.
	pub route_name: Option<String>,
	/// Matched instead of the request path when set.
	pub router_path: Option<String>,
	/// The router currently dispatching this request.
	pub router: Option<Arc<Router>>,
	pub extensions: Extensions,
}

impl Context {
	/// `target` is a path with an optional query string.
	pub fn new(method: Method, target: &str) -> Self {
		let (path, query) = match target.split_once('?') {
			Some((path, query)) => (path, Some(query.to_owned())),
			None => (target, None),
		};

		Self::with_request(RequestParts {
			method,
			path: path.to_owned(),
			query,
			headers: HeaderMap::new(),
		})
	}

	pub fn from_parts(method: Method, uri: &Uri, headers: HeaderMap) -> Self {
		Self::with_request(RequestParts {
			method,
			path: uri.path().to_owned(),
			query: uri.query().map(str::to_owned),
			headers,
		})
	}

	fn with_request(request: RequestParts) -> Self {
		Self {
			request,
			response: ResponseParts::default(),
			params: HashMap::new(),
			captures: vec![],
			matched: vec![],
			matched_route: None,
			matched_route_name: None,
			route_name: None,
			router_path: None,
			router: None,
			extensions: Extensions::new(),
		}
	}

	pub fn method(&self) -> &Method {
		&self.request.method
	}

	pub fn path(&self) -> &str {
		&self.request.path
	}

	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}

	pub fn status(&self) -> Option<StatusCode> {
		self.response.status
	}

	pub fn set_status(&mut self, status: StatusCode) {
		self.response.status = Some(status);
	}

	pub fn body(&self) -> Option<&[u8]> {
		self.response.body.as_deref()
	}

	/// Sets the response body, answering `200 OK` unless a status was already set.
	pub fn set_body(&mut self, body: impl Into<Bytes>) {
		self.response.body = Some(body.into());
		self.response.status.get_or_insert(StatusCode::OK);
	}

	pub fn header(&self, name: &HeaderName) -> Option<&str> {
		self.response.headers.get(name).and_then(|v| v.to_str().ok())
	}

	pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), Error> {
		self.response.headers.insert(name, HeaderValue::from_str(value)?);
		Ok(())
	}

	/// Points `Location` at `target`, answering `302 Found` unless a redirect status is already
	/// set.
	pub fn redirect(&mut self, target: &str) -> Result<(), Error> {
		self.set_header(LOCATION, target)?;
		if !self.response.status.map_or(false, |s| s.is_redirection()) {
			self.set_status(StatusCode::FOUND);
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use hyper::header::ALLOW;

	#[test]
	fn splits_query() {
		let ctx = Context::new(Method::GET, "/users?limit=1");
		assert_eq!(ctx.path(), "/users");
		assert_eq!(ctx.request.query.as_deref(), Some("limit=1"));
	}

	#[test]
	fn body_implies_ok() {
		let mut ctx = Context::new(Method::GET, "/");
		assert_eq!(ctx.status(), None);
		ctx.set_body("hi");
		assert_eq!(ctx.status(), Some(StatusCode::OK));

		let mut ctx = Context::new(Method::GET, "/");
		ctx.set_status(StatusCode::CREATED);
		ctx.set_body("hi");
		assert_eq!(ctx.status(), Some(StatusCode::CREATED));
	}

	#[test]
	fn headers() {
		let mut ctx = Context::new(Method::OPTIONS, "/");
		ctx.set_header(ALLOW, "GET, HEAD").unwrap();
		assert_eq!(ctx.header(&ALLOW), Some("GET, HEAD"));
		assert!(ctx.set_header(ALLOW, "bad\nvalue").is_err());
	}

	#[test]
	fn redirect_keeps_redirect_status() {
		let mut ctx = Context::new(Method::GET, "/old");
		ctx.redirect("/new").unwrap();
		assert_eq!(ctx.status(), Some(StatusCode::FOUND));
		assert_eq!(ctx.header(&LOCATION), Some("/new"));

		ctx.set_status(StatusCode::MOVED_PERMANENTLY);
		ctx.redirect("/newer").unwrap();
		assert_eq!(ctx.status(), Some(StatusCode::MOVED_PERMANENTLY));
	}
}
