use crate::{Context, Error};
use futures::{
	future::{self, BoxFuture},
	FutureExt,
};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

/// What every stage resolves to. Errors pass through the chain untouched.
pub type Outcome = anyhow::Result<()>;

/// A unit of the onion: it may work on the context, hand over to the rest of the chain with
/// [`Next::run`], and keep working once that returns.
pub trait Middleware: Send + Sync + 'static {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;

	fn into_stage(self) -> Stage
	where
		Self: Sized,
	{
		Arc::new(self)
	}
}

pub type Stage = Arc<dyn Middleware>;

impl<F> Middleware for F
where
	F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		self(ctx, next)
	}
}

/// Turns a closure into a [`Stage`].
///
/// ```
/// use mortar::stage;
///
/// let timing = stage(|ctx, next| {
/// 	Box::pin(async move {
/// 		let start = std::time::Instant::now();
/// 		next.run(ctx).await?;
/// 		println!("{} took {:?}", ctx.path(), start.elapsed());
/// 		Ok(())
/// 	})
/// });
/// ```
pub fn stage<F>(f: F) -> Stage
where
	F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
	Arc::new(f)
}

/// A synchronous stage that never advances the chain.
pub fn handler<F>(f: F) -> Stage
where
	F: Fn(&mut Context) -> Outcome + Send + Sync + 'static,
{
	stage(move |ctx, _next| future::ready(f(ctx)).boxed())
}

/// The continuation handed to a stage.
///
/// `run` consumes the value, so a stage can advance its chain at most once.
pub struct Next<'a> {
	stages: &'a [Stage],
	index: usize,
	then: Option<Box<Next<'a>>>,
}

impl<'a> Next<'a> {
	/// The terminal continuation: resolves immediately.
	pub fn end() -> Self {
		Self {
			stages: &[],
			index: 0,
			then: None,
		}
	}

	pub(crate) fn chain(stages: &'a [Stage], then: Next<'a>) -> Self {
		Self {
			stages,
			index: 0,
			then: Some(Box::new(then)),
		}
	}

	pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Outcome>
	where
		'a: 'b,
	{
		let Next {
			stages,
			index,
			then,
		} = self;

		match stages.get(index) {
			Some(stage) => stage.handle(
				ctx,
				Next {
					stages,
					index: index + 1,
					then,
				},
			),
			None => match then {
				Some(then) => then.run(ctx),
				None => future::ready(Ok(())).boxed(),
			},
		}
	}
}

struct Composed {
	stages: Vec<Stage>,
}

impl Middleware for Composed {
	fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
		let chain = Next::chain(&self.stages, next);

		AssertUnwindSafe(async move { chain.run(ctx).await })
			.catch_unwind()
			.map(|result| {
				result.unwrap_or_else(|panic| Err(Error::Panicked(panic_message(&*panic)).into()))
			})
			.boxed()
	}
}

/// Runs `stages` in order as one stage; the `next` it is invoked with runs after the last one.
///
/// Nothing runs until the returned future is polled, and a panicking stage fails that future
/// with [`Error::Panicked`] instead of unwinding into the caller.
pub fn compose(stages: Vec<Stage>) -> Stage {
	Arc::new(Composed { stages })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_owned()
	}
}
