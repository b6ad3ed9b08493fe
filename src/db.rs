use log::info;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};

use crate::models::Counter;
use crate::store::{RepositoryError, RepositoryResult};

pub const ORDERS: &str = "orders";
pub const CHECKOUTS: &str = "checkouts";
pub const SETTINGS: &str = "settings";
pub const ADMINS: &str = "admins";
pub const COUNTERS: &str = "counters";

pub async fn connect(database_url: &str, database_name: &str) -> mongodb::error::Result<Database> {
    let client_options = ClientOptions::parse(database_url).await?;
    let client = Client::with_options(client_options)?;
    info!("Using MongoDB database {}", database_name);
    Ok(client.database(database_name))
}

/// Creates the indexes the stores rely on. Safe to run on every start.
pub async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let unique_email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    db.collection::<mongodb::bson::Document>(ADMINS)
        .create_index(unique_email, None)
        .await?;

    let insertion_order = IndexModel::builder().keys(doc! { "seq": -1 }).build();
    db.collection::<mongodb::bson::Document>(ORDERS)
        .create_index(insertion_order, None)
        .await?;
    Ok(())
}

/// Increments and returns the named counter, creating it on first use.
pub async fn next_sequence(
    counters: &Collection<Counter>,
    seq_name: &str,
) -> RepositoryResult<i64> {
    let filter = doc! { "_id": seq_name };
    let update = doc! { "$inc": { "seq": 1_i64 } };

    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::After)
        .build();

    match counters.find_one_and_update(filter, update, options).await? {
        Some(counter) => Ok(counter.seq),
        None => Err(RepositoryError::Unavailable(format!(
            "no sequence value for {seq_name}"
        ))),
    }
}
