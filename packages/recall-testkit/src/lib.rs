//! Scratch Postgres databases and Qdrant collections for the ignored integration tests.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

pub const PG_DSN_ENV: &str = "RECALL_PG_DSN";
pub const QDRANT_URL_ENV: &str = "RECALL_QDRANT_URL";

/// A fresh database cut from `RECALL_PG_DSN`, plus the Qdrant collections a test asked to be
/// named after it. `cleanup` drops all of them.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	collections: Vec<String>,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid {PG_DSN_ENV}: {err}.")))?;
		let maintenance = base.clone().database("postgres");
		let name = format!("recall_test_{}", Uuid::new_v4().simple());
		let mut conn = PgConnection::connect_with(&maintenance).await?;

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, collections: Vec::new(), dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// Reserves a collection name unique to this database; `cleanup` deletes it.
	pub fn collection_name(&mut self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.push(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		if !self.collections.is_empty() {
			match env_qdrant_url() {
				Some(url) => drop_collections(&url, &self.collections).await?,
				None => eprintln!("{QDRANT_URL_ENV} is unset; leaving {:?}.", self.collections),
			}
		}

		let mut conn = PgConnection::connect_with(&self.maintenance).await?;

		conn.execute(format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name).as_str())
			.await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if !self.dropped {
			eprintln!("Test database {} was not cleaned up; drop it by hand.", self.name);
		}
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(PG_DSN_ENV).ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var(QDRANT_URL_ENV).ok()
}

async fn drop_collections(url: &str, collections: &[String]) -> Result<()> {
	let client = Qdrant::from_url(url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;

	for collection in collections {
		client.delete_collection(collection.clone()).await.map_err(|err| {
			Error::Message(format!("Failed to delete Qdrant collection {collection:?}: {err}."))
		})?;
	}

	Ok(())
}
