use crate::{
	allowed::AllowedMethodsOptions,
	compose::{compose, Middleware, Next, Stage},
	Context, Error, Router,
};
use hyper::{
	body::Body,
	header::{HeaderValue, ALLOW},
	service::Service,
	Request, StatusCode,
};
use std::{
	convert::Infallible,
	future::{ready, Future, Ready},
	pin::Pin,
	sync::Arc,
	task::{self, Poll},
};
use tracing::error;

pub type Response = hyper::Response<Body>;

fn default_error_handler(e: anyhow::Error) -> Response {
	let (status, allow) = match e.downcast_ref::<Error>() {
		Some(Error::MethodNotAllowed { allow }) => {
			(StatusCode::METHOD_NOT_ALLOWED, Some(allow.as_str()))
		}
		Some(Error::NotImplemented { allow }) => {
			(StatusCode::NOT_IMPLEMENTED, Some(allow.as_str()))
		}
		_ => {
			error!(error = %e, "request failed");
			(StatusCode::INTERNAL_SERVER_ERROR, None)
		}
	};

	let mut res = Response::new(Body::from(e.to_string()));
	*res.status_mut() = status;
	if let Some(allow) = allow.and_then(|allow| HeaderValue::from_str(allow).ok()) {
		res.headers_mut().insert(ALLOW, allow);
	}
	res
}

fn default_not_found_handler(_ctx: &Context) -> Response {
	let mut res = Response::new(Body::empty());
	*res.status_mut() = StatusCode::NOT_FOUND;
	res
}

/// A function that can convert an error into a response.
pub type ErrorHandler = fn(e: anyhow::Error) -> Response;

/// A function that answers requests nothing set a status for.
pub type NotFoundHandler = fn(ctx: &Context) -> Response;

/// Serves a middleware chain through hyper.
///
/// Converting a [`Router`] installs its dispatcher followed by method negotiation.
#[derive(Clone)]
pub struct HttpRouter {
	app: Stage,
	internal_error: ErrorHandler,
	not_found: NotFoundHandler,
}

impl HttpRouter {
	pub fn new(app: Stage) -> Self {
		Self {
			app,
			internal_error: default_error_handler,
			not_found: default_not_found_handler,
		}
	}

	pub fn internal_error_handler(mut self, handler: ErrorHandler) -> Self {
		self.internal_error = handler;
		self
	}

	pub fn not_found_handler(mut self, handler: NotFoundHandler) -> Self {
		self.not_found = handler;
		self
	}
}

impl From<Router> for HttpRouter {
	fn from(router: Router) -> Self {
		Self::new(compose(vec![
			router.routes().into_stage(),
			router.allowed_methods(AllowedMethodsOptions::default()).into_stage(),
		]))
	}
}

impl<T> Service<T> for HttpRouter {
	type Response = RouteHandler;
	type Error = Infallible;
	type Future = Ready<Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, _: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, _: T) -> Self::Future {
		ready(Ok(RouteHandler {
			app: Arc::clone(&self.app),
			internal_error: self.internal_error,
			not_found: self.not_found,
		}))
	}
}

/// Responsible for handling the actual HTTP requests from hyper.
pub struct RouteHandler {
	app: Stage,
	internal_error: ErrorHandler,
	not_found: NotFoundHandler,
}

fn respond(ctx: Context, not_found: NotFoundHandler) -> Response {
	let status = match ctx.status() {
		Some(status) => status,
		None => return not_found(&ctx),
	};

	let mut res = Response::new(ctx.response.body.map(Body::from).unwrap_or_else(Body::empty));
	*res.status_mut() = status;
	*res.headers_mut() = ctx.response.headers;
	res
}

impl Service<Request<Body>> for RouteHandler {
	type Response = Response;
	type Error = Infallible;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let (parts, _body) = req.into_parts();
		let mut ctx = Context::from_parts(parts.method, &parts.uri, parts.headers);
		ctx.extensions = parts.extensions;

		let app = Arc::clone(&self.app);
		let internal_error = self.internal_error;
		let not_found = self.not_found;

		Box::pin(async move {
			let outcome = app.handle(&mut ctx, Next::end()).await;
			Ok(match outcome {
				Ok(()) => respond(ctx, not_found),
				Err(e) => internal_error(e),
			})
		})
	}
}
