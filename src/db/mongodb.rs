use mongodb::{Client, Database, bson::doc, options::ClientOptions};

pub async fn get_database(uri: &str, name: &str) -> mongodb::error::Result<Database> {
    let mut client_options = ClientOptions::parse(uri).await?;
    client_options.app_name = Some("deckpulse".to_string());

    let client = Client::with_options(client_options)?;
    let db = client.database(name);

    // Fail at startup rather than on the first viewer event
    db.run_command(doc! { "ping": 1 }).await?;
    log::info!("Connected to MongoDB database {}", name);

    Ok(db)
}
