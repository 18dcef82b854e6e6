use crate::{
	compose::{compose, Middleware, Next, Outcome, Stage},
	route::Route,
	Context, Router,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// Middleware running the routes of a [`Router`] snapshot that match the request.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	router: Arc<Router>,
}

impl Dispatcher {
	pub fn new(router: Router) -> Self {
		Self {
			router: Arc::new(router),
		}
	}

	pub fn router(&self) -> &Router {
		&self.router
	}
}

/// Binds one route's captures before its own stages run.
struct BindCaptures {
	route: Arc<Route>,
	path: String,
}

impl Middleware for BindCaptures {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		ctx.captures = self.route.captures(&self.path);
		self.route.params(&ctx.captures, &mut ctx.params);
		ctx.route_name = self.route.name().map(str::to_owned);
		next.run(ctx)
	}
}

impl Middleware for Dispatcher {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		let path = self
			.router
			.config()
			.router_path
			.clone()
			.or_else(|| ctx.router_path.clone())
			.unwrap_or_else(|| ctx.path().to_owned());

		debug!(method = %ctx.method(), path = %path, "dispatching");

		let matched = self.router.match_path(&path, ctx.method());
		ctx.matched.extend(matched.path);
		ctx.router = Some(Arc::clone(&self.router));

		if !matched.route {
			return next.run(ctx);
		}

		if let Some(last) = matched.path_and_method.last() {
			ctx.matched_route = Some(last.path().to_owned());
			ctx.matched_route_name = last.name().map(str::to_owned);
		}

		let mut chain: Vec<Stage> = vec![];
		for route in matched.path_and_method {
			chain.push(Arc::new(BindCaptures {
				route: Arc::clone(&route),
				path: path.clone(),
			}));
			chain.extend(route.stages().cloned());
		}

		let chain = compose(chain);
		Box::pin(async move { chain.handle(ctx, next).await })
	}
}
