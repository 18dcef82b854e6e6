//! An onion-style request router and middleware dispatcher built on hyper's types.
//!
//! ```
//! use futures::executor::block_on;
//! use mortar::{handler, Context, Method, Middleware, Next, Router};
//!
//! let mut router = Router::new();
//! router
//! 	.get(
//! 		"/users/:id",
//! 		vec![handler(|ctx| {
//! 			let id = ctx.param("id").unwrap_or_default().to_owned();
//! 			ctx.set_body(id);
//! 			Ok(())
//! 		})],
//! 	)
//! 	.unwrap();
//!
//! let mut ctx = Context::new(Method::GET, "/users/42");
//! block_on(router.routes().handle(&mut ctx, Next::end())).unwrap();
//! assert_eq!(ctx.body(), Some(&b"42"[..]));
//! ```
//!
//! Routes are matched in registration order, and every route whose path and method match
//! contributes its stages to the chain. Each stage may call `next` once to run the rest of the
//! chain and then continue after it returns.
//!
//! [`Router::allowed_methods`] answers `OPTIONS` and produces `405`/`501` for paths that matched
//! under a different method. With the `http` feature, [`HttpRouter`] serves a router through
//! hyper.

mod allowed;
mod compose;
mod context;
mod dispatch;
mod error;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::*;

/// Path pattern compilation and URL generation.
pub mod pattern;

/// A single registered pattern with its middleware stack.
pub mod route;

/// The route registry.
///
/// Register routes on a [`Router`], then hand [`Router::routes`] to whatever drives requests.
pub mod router;

pub use allowed::*;
pub use compose::*;
pub use context::*;
pub use dispatch::*;
pub use error::*;
pub use pattern::{compile, url, Key, MatchOptions, Matcher, Param, Query, UrlOptions, UrlParams};
pub use route::*;
pub use router::*;

pub use hyper::{self, header, Method, StatusCode};
