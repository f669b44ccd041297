use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

use crate::config::Config;
use crate::error::Result;
use crate::store::mongo::{CARTS, ITEMS, RENTALS, USERS};

pub async fn connect(config: &Config) -> Result<Database> {
    let mut client_options = ClientOptions::parse(&config.database_url).await?;
    client_options.app_name = Some("item-rental".to_string());

    let client = Client::with_options(client_options)?;
    let db = client.database(&config.database_name);
    ensure_indexes(&db).await?;
    log::info!("Connected to MongoDB database '{}'", config.database_name);
    Ok(db)
}

async fn ensure_indexes(db: &Database) -> Result<()> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>(USERS)
        .create_index(IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(CARTS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "userId": 1, "itemId": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    db.collection::<mongodb::bson::Document>(ITEMS)
        .create_index(IndexModel::builder().keys(doc! { "owner": 1, "createdAt": 1 }).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(RENTALS)
        .create_index(IndexModel::builder().keys(doc! { "renter": 1, "createdAt": -1 }).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(RENTALS)
        .create_index(IndexModel::builder().keys(doc! { "owner": 1, "createdAt": -1 }).build(), None)
        .await?;
    Ok(())
}
