mod db;
mod routes;
mod store;

use std::{env, net::SocketAddr, sync::Arc};

use eyre::WrapErr;
use tracing::info;

use crate::{routes::AppState, store::MongoStore};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017/tally";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| String::from(DEFAULT_MONGODB_URI));
    let port = match env::var("PORT") {
        Ok(raw) => raw.parse().wrap_err("invalid PORT")?,
        Err(_) => DEFAULT_PORT,
    };

    // No traffic is accepted until the first connection succeeds.
    let (client, db_state) = db::connect(&uri).await?;

    let database = client
        .default_database()
        .unwrap_or_else(|| client.database("tally"));

    info!(database = database.name(), "using database");

    let state = AppState {
        store: Arc::new(MongoStore::new(database)),
        db_state,
    };

    let app = routes::router().with_state(state);

    let addr = SocketAddr::from(([0; 4], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
