use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, GlobalSecondaryIndex, IndexStatus, KeySchemaElement,
    KeyType, Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client;
use log::{debug, error, info};
use std::error::Error;
use std::time::Duration;

/// DynamoDB helpers for the optional integration run against DynamoDB Local.
///
/// Enabled with `USE_DYNAMODB=true`; call `init_test_logging()` first to see
/// the table lifecycle logs.
pub const DYNAMO_LOCAL_URI: &str = "http://localhost:8000";

pub fn use_dynamodb() -> bool {
    std::env::var("USE_DYNAMODB").unwrap_or_default() == "true"
}

pub async fn create_dynamo_client() -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .endpoint_url(DYNAMO_LOCAL_URI)
        .load()
        .await;

    Client::new(&config)
}

fn throughput() -> Result<ProvisionedThroughput, Box<dyn Error>> {
    Ok(ProvisionedThroughput::builder()
        .read_capacity_units(5)
        .write_capacity_units(5)
        .build()?)
}

async fn drop_table_if_exists(client: &Client, table_name: &str) -> Result<(), Box<dyn Error>> {
    let tables = client.list_tables().send().await?;
    if !tables.table_names().contains(&table_name.to_string()) {
        return Ok(());
    }

    info!("Table '{}' already exists, deleting it first...", table_name);
    client.delete_table().table_name(table_name).send().await?;
    loop {
        let tables = client.list_tables().send().await?;
        if !tables.table_names().contains(&table_name.to_string()) {
            return Ok(());
        }
        debug!("Table '{}' still exists, waiting...", table_name);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Creates a table keyed by `id` with one hash-key GSI per `(index, attribute)` pair
/// and waits until the table and every index are ACTIVE.
pub async fn create_dynamo_table(
    client: &Client,
    table_name: &str,
    gsi_configs: &[(&str, &str)],
) -> Result<(), Box<dyn Error>> {
    drop_table_if_exists(client, table_name).await?;

    let mut request = client
        .create_table()
        .table_name(table_name)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("id")
                .key_type(KeyType::Hash)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("id")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .provisioned_throughput(throughput()?);

    for (index_name, attribute) in gsi_configs {
        request = request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(*attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .global_secondary_indexes(
                GlobalSecondaryIndex::builder()
                    .index_name(*index_name)
                    .key_schema(
                        KeySchemaElement::builder()
                            .attribute_name(*attribute)
                            .key_type(KeyType::Hash)
                            .build()?,
                    )
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .provisioned_throughput(throughput()?)
                    .build()?,
            );
    }

    info!("Creating table '{}'...", table_name);
    request.send().await?;

    loop {
        let response = client.describe_table().table_name(table_name).send().await?;
        if let Some(table) = response.table() {
            let table_active = table.table_status() == Some(&TableStatus::Active);
            let indexes_active = table
                .global_secondary_indexes()
                .iter()
                .all(|idx| idx.index_status() == Some(&IndexStatus::Active));
            if table_active && indexes_active {
                info!("Table '{}' and all GSIs are now ACTIVE!", table_name);
                return Ok(());
            }
            debug!("Table '{}' status: {:?}", table_name, table.table_status());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

pub async fn create_invitation_table(
    client: &Client,
    table_name: &str,
) -> Result<(), Box<dyn Error>> {
    create_dynamo_table(
        client,
        table_name,
        &[("slug-index", "slug"), ("ownerId-index", "ownerId")],
    )
    .await
}

pub async fn create_approval_request_table(
    client: &Client,
    table_name: &str,
) -> Result<(), Box<dyn Error>> {
    create_dynamo_table(
        client,
        table_name,
        &[
            ("invitationId-index", "invitationId"),
            ("requesterUserId-index", "requesterUserId"),
        ],
    )
    .await
}

// Helper to clean the DynamoDB table between tests
pub async fn clear_dynamo_table(client: &Client, table_name: &str) {
    let mut last_key = None;
    loop {
        let scan = match client
            .scan()
            .table_name(table_name)
            .set_exclusive_start_key(last_key.take())
            .send()
            .await
        {
            Ok(scan) => scan,
            Err(e) => {
                error!("Failed to scan table '{}': {}", table_name, e);
                return;
            }
        };

        for item in scan.items() {
            if let Some(Ok(id)) = item.get("id").map(|id| id.as_s()) {
                if let Err(e) = client
                    .delete_item()
                    .table_name(table_name)
                    .key("id", AttributeValue::S(id.to_string()))
                    .send()
                    .await
                {
                    error!("Failed to delete item '{}' from '{}': {}", id, table_name, e);
                }
            }
        }

        last_key = scan.last_evaluated_key().cloned();
        if last_key.is_none() {
            break;
        }
    }
}
