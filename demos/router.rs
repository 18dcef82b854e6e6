use mortar::{
	handler,
	hyper::{Server, StatusCode},
	stage, validator, HttpRouter, Method, RouteOptions, Router, UrlOptions,
};
use tracing_subscriber::EnvFilter;

fn users() -> Result<Router, mortar::Error> {
	let mut users = Router::new();
	users
		.param(
			"id",
			validator(|id, ctx, next| {
				if id.map_or(true, |id| id.parse::<u64>().is_err()) {
					ctx.set_status(StatusCode::BAD_REQUEST);
					return Box::pin(async { Ok(()) });
				}
				next.run(ctx)
			}),
		)
		.get(
			"/",
			vec![handler(|ctx| {
				ctx.set_body("all users");
				Ok(())
			})],
		)?;
	users.register(
		"/:id",
		&[Method::GET],
		vec![handler(|ctx| {
			let body = format!("user {}", ctx.param("id").unwrap_or_default());
			ctx.set_body(body);
			Ok(())
		})],
		RouteOptions::named("user"),
	)?;
	Ok(users)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let addr = ([127, 0, 0, 1], 3000).into();

	let mut router = Router::new();
	router
		.use_(stage(|ctx, next| {
			Box::pin(async move {
				let start = std::time::Instant::now();
				next.run(ctx).await?;
				println!("{} {} took {:?}", ctx.method(), ctx.path(), start.elapsed());
				Ok(())
			})
		}))?
		.use_at("/users", users()?)?
		.redirect("/people", "/users", None)?
		.get(
			"/",
			vec![handler(|ctx| {
				let users = match &ctx.router {
					Some(router) => router.url("user", ["1"], &UrlOptions::default()).ok(),
					None => None,
				};
				ctx.set_body(format!("try {}", users.unwrap_or_default()));
				Ok(())
			})],
		)?;

	let server = Server::bind(&addr).serve(HttpRouter::from(router));
	println!("Listening on http://{}", addr);

	server.await?;
	Ok(())
}
