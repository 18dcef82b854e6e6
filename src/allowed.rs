use crate::{
	compose::{Middleware, Next, Outcome},
	Context, Error,
};
use futures::future::BoxFuture;
use hyper::{header::ALLOW, Method, StatusCode};
use std::{
	collections::BTreeSet,
	fmt::{self, Debug, Formatter},
	sync::Arc,
};
use tracing::debug;

/// Builds the error raised in throw mode.
pub type ErrorFactory = Arc<dyn Fn() -> anyhow::Error + Send + Sync>;

#[derive(Clone, Default)]
pub struct AllowedMethodsOptions {
	/// Fail with an error instead of answering `405`/`501` directly.
	pub throw: bool,
	pub not_implemented: Option<ErrorFactory>,
	pub method_not_allowed: Option<ErrorFactory>,
}

impl Debug for AllowedMethodsOptions {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AllowedMethodsOptions")
			.field("throw", &self.throw)
			.field("not_implemented", &self.not_implemented.is_some())
			.field("method_not_allowed", &self.method_not_allowed.is_some())
			.finish()
	}
}

/// Answers `OPTIONS`, `405` and `501` for requests whose path matched a route but that nothing
/// else answered. Requests that matched no route at all are left alone.
#[derive(Debug, Clone)]
pub struct MethodNegotiation {
	implemented: Vec<Method>,
	options: AllowedMethodsOptions,
}

impl MethodNegotiation {
	pub fn new(implemented: Vec<Method>, options: AllowedMethodsOptions) -> Self {
		Self { implemented, options }
	}

	fn negotiate(&self, ctx: &mut Context) -> Outcome {
		if ctx.status().map_or(false, |s| s != StatusCode::NOT_FOUND) || ctx.matched.is_empty() {
			return Ok(());
		}

		let allowed: BTreeSet<String> = ctx
			.matched
			.iter()
			.flat_map(|route| route.methods())
			.map(|method| method.as_str().to_owned())
			.collect();
		let allow = allowed.iter().map(String::as_str).collect::<Vec<_>>().join(", ");

		let method = ctx.method().clone();
		let is_allowed = allowed.contains(method.as_str());

		if !self.implemented.contains(&method) {
			debug!(%method, "not implemented");
			if self.options.throw {
				return Err(match &self.options.not_implemented {
					Some(factory) => factory(),
					None => Error::NotImplemented { allow }.into(),
				});
			}
			ctx.set_status(StatusCode::NOT_IMPLEMENTED);
			ctx.set_header(ALLOW, &allow)?;
		} else if !allowed.is_empty() && method == Method::OPTIONS {
			debug!(%allow, "answering options");
			ctx.set_status(StatusCode::OK);
			ctx.response.body = None;
			ctx.set_header(ALLOW, &allow)?;
		} else if !allowed.is_empty() && !is_allowed {
			debug!(%method, %allow, "method not allowed");
			if self.options.throw {
				return Err(match &self.options.method_not_allowed {
					Some(factory) => factory(),
					None => Error::MethodNotAllowed { allow }.into(),
				});
			}
			ctx.set_status(StatusCode::METHOD_NOT_ALLOWED);
			ctx.set_header(ALLOW, &allow)?;
		}

		Ok(())
	}
}

impl Middleware for MethodNegotiation {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		Box::pin(async move {
			next.run(ctx).await?;
			self.negotiate(ctx)
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		compose::{compose, handler},
		Router,
	};

	fn app(options: AllowedMethodsOptions) -> crate::Stage {
		let mut router = Router::new();
		router
			.get("/users", vec![handler(|_| Ok(()))])
			.unwrap()
			.put("/users", vec![handler(|_| Ok(()))])
			.unwrap();

		compose(vec![
			router.routes().into_stage(),
			router.allowed_methods(options).into_stage(),
		])
	}

	async fn run(options: AllowedMethodsOptions, method: Method, path: &str) -> (Context, Outcome) {
		let mut ctx = Context::new(method, path);
		let outcome = app(options).handle(&mut ctx, Next::end()).await;
		(ctx, outcome)
	}

	#[tokio::test]
	async fn answers_options() {
		let (ctx, outcome) = run(AllowedMethodsOptions::default(), Method::OPTIONS, "/users").await;

		outcome.unwrap();
		assert_eq!(ctx.status(), Some(StatusCode::OK));
		assert_eq!(ctx.header(&ALLOW), Some("GET, HEAD, PUT"));
		assert_eq!(ctx.body(), None);
	}

	#[tokio::test]
	async fn rejects_unlisted_methods() {
		let (ctx, outcome) = run(AllowedMethodsOptions::default(), Method::POST, "/users").await;

		outcome.unwrap();
		assert_eq!(ctx.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
		assert_eq!(ctx.header(&ALLOW), Some("GET, HEAD, PUT"));
	}

	#[tokio::test]
	async fn unimplemented_methods() {
		let (ctx, outcome) = run(AllowedMethodsOptions::default(), Method::TRACE, "/users").await;

		outcome.unwrap();
		assert_eq!(ctx.status(), Some(StatusCode::NOT_IMPLEMENTED));
		assert_eq!(ctx.header(&ALLOW), Some("GET, HEAD, PUT"));
	}

	#[tokio::test]
	async fn throws_when_asked() {
		let options = AllowedMethodsOptions {
			throw: true,
			..AllowedMethodsOptions::default()
		};
		let (ctx, outcome) = run(options, Method::POST, "/users").await;

		match outcome.unwrap_err().downcast_ref::<Error>() {
			Some(Error::MethodNotAllowed { allow }) => assert_eq!(allow, "GET, HEAD, PUT"),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(ctx.status(), None);
	}

	#[tokio::test]
	async fn custom_error_factories() {
		#[derive(Debug, thiserror::Error)]
		#[error("nope")]
		struct Nope;

		let options = AllowedMethodsOptions {
			throw: true,
			not_implemented: Some(Arc::new(|| anyhow::Error::new(Nope))),
			..AllowedMethodsOptions::default()
		};
		let (_, outcome) = run(options, Method::TRACE, "/users").await;

		assert!(outcome.unwrap_err().downcast_ref::<Nope>().is_some());
	}

	#[tokio::test]
	async fn leaves_unmatched_paths_alone() {
		let options = AllowedMethodsOptions::default();
		let (ctx, outcome) = run(options, Method::DELETE, "/nowhere").await;

		outcome.unwrap();
		assert_eq!(ctx.status(), None);
		assert!(ctx.header(&ALLOW).is_none());

		let (ctx, _) = run(AllowedMethodsOptions::default(), Method::TRACE, "/nowhere").await;
		assert_eq!(ctx.status(), None);
	}

	#[tokio::test]
	async fn middleware_matches_allow_nothing() {
		let mut router = Router::new();
		router.use_at("/users", handler(|_| Ok(()))).unwrap();

		let app = compose(vec![
			router.routes().into_stage(),
			router.allowed_methods(AllowedMethodsOptions::default()).into_stage(),
		]);

		for method in [Method::POST, Method::OPTIONS] {
			let mut ctx = Context::new(method, "/users");
			app.handle(&mut ctx, Next::end()).await.unwrap();

			assert_eq!(ctx.matched.len(), 1);
			assert_eq!(ctx.status(), None);
			assert!(ctx.header(&ALLOW).is_none());
		}
	}

	#[tokio::test]
	async fn answered_requests_are_untouched() {
		let mut router = Router::new();
		router.get("/users", vec![]).unwrap();

		let app = compose(vec![
			router.routes().into_stage(),
			router.allowed_methods(AllowedMethodsOptions::default()).into_stage(),
			handler(|ctx| {
				ctx.set_status(StatusCode::IM_A_TEAPOT);
				Ok(())
			}),
		]);

		let mut ctx = Context::new(Method::POST, "/users");
		app.handle(&mut ctx, Next::end()).await.unwrap();

		assert_eq!(ctx.status(), Some(StatusCode::IM_A_TEAPOT));
		assert!(ctx.header(&ALLOW).is_none());
	}
}
