//! DynamoDB-backed registry.
//!
//! Two tables. Connections are keyed by `connection_id` alone. Subscriptions
//! are keyed by `topic` (partition) and `subscription_id` (sort), with a
//! `by-connection` index for disconnect cleanup. Both carry an `expires_at`
//! TTL attribute; because DynamoDB's reaper lags, every read also filters
//! expired records out explicitly.
use super::{epoch_now, ConnectionRecord, RegistryStore, SubscriptionRecord};
use crate::{RegistryError, RegistryResult};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ScalarAttributeType, TimeToLiveSpecification,
};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::str::FromStr;
use todo_core::Topic;

const CONNECTION_INDEX: &str = "by-connection";

#[derive(Debug, Clone)]
pub struct RegistryTables {
    pub connections: String,
    pub subscriptions: String,
}

#[derive(Clone)]
pub struct DynamoRegistry {
    client: Client,
    tables: RegistryTables,
}

impl std::fmt::Debug for DynamoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoRegistry")
            .field("tables", &self.tables)
            .finish()
    }
}

impl DynamoRegistry {
    pub fn new(client: Client, tables: RegistryTables) -> Self {
        Self { client, tables }
    }

    /// Create both tables when they do not exist yet. Intended for the local
    /// harness against dynamodb-local; deployed tables come from
    /// infrastructure. TTL enablement is best-effort because local builds
    /// reject it inconsistently.
    pub async fn create_tables_if_missing(&self) -> RegistryResult<()> {
        let connections = self
            .client
            .create_table()
            .table_name(&self.tables.connections)
            .attribute_definitions(string_attr("connection_id")?)
            .key_schema(hash_key("connection_id")?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;
        absorb_existing(connections)?;

        let by_connection = GlobalSecondaryIndex::builder()
            .index_name(CONNECTION_INDEX)
            .key_schema(hash_key("connection_id")?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .build()
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        let subscriptions = self
            .client
            .create_table()
            .table_name(&self.tables.subscriptions)
            .attribute_definitions(string_attr("topic")?)
            .attribute_definitions(string_attr("subscription_id")?)
            .attribute_definitions(string_attr("connection_id")?)
            .key_schema(hash_key("topic")?)
            .key_schema(range_key("subscription_id")?)
            .global_secondary_indexes(by_connection)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;
        absorb_existing(subscriptions)?;

        for table in [&self.tables.connections, &self.tables.subscriptions] {
            let ttl = TimeToLiveSpecification::builder()
                .attribute_name("expires_at")
                .enabled(true)
                .build()
                .map_err(|err| RegistryError::Unexpected(err.into()))?;
            if let Err(err) = self
                .client
                .update_time_to_live()
                .table_name(table)
                .time_to_live_specification(ttl)
                .send()
                .await
            {
                tracing::debug!(table, error = %err, "ttl enablement skipped");
            }
        }
        Ok(())
    }

    async fn query_subscriptions(
        &self,
        index_name: Option<&str>,
        key_attr: &str,
        key_value: &str,
    ) -> RegistryResult<Vec<SubscriptionRecord>> {
        let now = epoch_now();
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.tables.subscriptions)
                .set_index_name(index_name.map(str::to_string))
                .key_condition_expression("#k = :k")
                .filter_expression("#exp > :now")
                .expression_attribute_names("#k", key_attr)
                .expression_attribute_names("#exp", "expires_at")
                .expression_attribute_values(":k", AttributeValue::S(key_value.to_string()))
                .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| RegistryError::Unexpected(err.into()))?;
            for attrs in output.items() {
                records.push(attrs_to_subscription(attrs)?);
            }
            match output.last_evaluated_key() {
                Some(key) => start_key = Some(key.clone()),
                None => break,
            }
        }
        Ok(records)
    }
}

fn string_attr(name: &str) -> RegistryResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|err| RegistryError::Unexpected(err.into()))
}

fn hash_key(name: &str) -> RegistryResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|err| RegistryError::Unexpected(err.into()))
}

fn range_key(name: &str) -> RegistryResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Range)
        .build()
        .map_err(|err| RegistryError::Unexpected(err.into()))
}

fn absorb_existing<T>(
    result: Result<T, SdkError<CreateTableError>>,
) -> RegistryResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) => match &err {
            SdkError::ServiceError(service_err)
                if matches!(
                    service_err.err(),
                    CreateTableError::ResourceInUseException(_)
                ) =>
            {
                Ok(())
            }
            _ => Err(RegistryError::Unexpected(err.into())),
        },
    }
}

fn connection_to_attrs(record: &ConnectionRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "connection_id".to_string(),
            AttributeValue::S(record.connection_id.clone()),
        ),
        ("acked".to_string(), AttributeValue::Bool(record.acked)),
        (
            "connected_at".to_string(),
            AttributeValue::N(record.connected_at.to_string()),
        ),
        (
            "expires_at".to_string(),
            AttributeValue::N(record.expires_at.to_string()),
        ),
    ])
}

fn attrs_to_connection(attrs: &HashMap<String, AttributeValue>) -> RegistryResult<ConnectionRecord> {
    Ok(ConnectionRecord {
        connection_id: string_field(attrs, "connection_id")?,
        acked: attrs
            .get("acked")
            .and_then(|value| value.as_bool().ok())
            .copied()
            .ok_or_else(|| RegistryError::Corrupt("missing acked attribute".into()))?,
        connected_at: number_field(attrs, "connected_at")?,
        expires_at: number_field(attrs, "expires_at")?,
    })
}

fn subscription_to_attrs(record: &SubscriptionRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "topic".to_string(),
            AttributeValue::S(record.topic.to_string()),
        ),
        (
            "subscription_id".to_string(),
            AttributeValue::S(record.subscription_id.clone()),
        ),
        (
            "connection_id".to_string(),
            AttributeValue::S(record.connection_id.clone()),
        ),
        (
            "operation_id".to_string(),
            AttributeValue::S(record.operation_id.clone()),
        ),
        (
            "fields".to_string(),
            AttributeValue::L(
                record
                    .fields
                    .iter()
                    .map(|field| AttributeValue::S(field.clone()))
                    .collect(),
            ),
        ),
        (
            "expires_at".to_string(),
            AttributeValue::N(record.expires_at.to_string()),
        ),
    ])
}

fn attrs_to_subscription(
    attrs: &HashMap<String, AttributeValue>,
) -> RegistryResult<SubscriptionRecord> {
    let topic = string_field(attrs, "topic")?;
    let topic =
        Topic::from_str(&topic).map_err(|err| RegistryError::Corrupt(err.to_string()))?;
    let fields = attrs
        .get("fields")
        .and_then(|value| value.as_l().ok())
        .ok_or_else(|| RegistryError::Corrupt("missing fields attribute".into()))?
        .iter()
        .map(|value| {
            value
                .as_s()
                .cloned()
                .map_err(|_| RegistryError::Corrupt("non-string selection field".into()))
        })
        .collect::<RegistryResult<Vec<String>>>()?;
    Ok(SubscriptionRecord {
        subscription_id: string_field(attrs, "subscription_id")?,
        topic,
        connection_id: string_field(attrs, "connection_id")?,
        operation_id: string_field(attrs, "operation_id")?,
        fields,
        expires_at: number_field(attrs, "expires_at")?,
    })
}

fn string_field(attrs: &HashMap<String, AttributeValue>, name: &str) -> RegistryResult<String> {
    attrs
        .get(name)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .ok_or_else(|| RegistryError::Corrupt(format!("missing {name} attribute")))
}

fn number_field(attrs: &HashMap<String, AttributeValue>, name: &str) -> RegistryResult<u64> {
    attrs
        .get(name)
        .and_then(|value| value.as_n().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| RegistryError::Corrupt(format!("bad {name} attribute")))
}

#[async_trait]
impl RegistryStore for DynamoRegistry {
    async fn put_connection(&self, record: ConnectionRecord) -> RegistryResult<()> {
        self.client
            .put_item()
            .table_name(&self.tables.connections)
            .set_item(Some(connection_to_attrs(&record)))
            .send()
            .await
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        Ok(())
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> RegistryResult<Option<ConnectionRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.tables.connections)
            .key("connection_id", AttributeValue::S(connection_id.into()))
            .send()
            .await
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        let record = output.item().map(attrs_to_connection).transpose()?;
        Ok(record.filter(|record| !record.is_expired(epoch_now())))
    }

    async fn delete_connection(&self, connection_id: &str) -> RegistryResult<()> {
        self.client
            .delete_item()
            .table_name(&self.tables.connections)
            .key("connection_id", AttributeValue::S(connection_id.into()))
            .send()
            .await
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        Ok(())
    }

    async fn put_subscription(&self, record: SubscriptionRecord) -> RegistryResult<()> {
        self.client
            .put_item()
            .table_name(&self.tables.subscriptions)
            .set_item(Some(subscription_to_attrs(&record)))
            .send()
            .await
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        Ok(())
    }

    async fn delete_subscription(
        &self,
        topic: Topic,
        subscription_id: &str,
    ) -> RegistryResult<()> {
        self.client
            .delete_item()
            .table_name(&self.tables.subscriptions)
            .key("topic", AttributeValue::S(topic.to_string()))
            .key("subscription_id", AttributeValue::S(subscription_id.into()))
            .send()
            .await
            .map_err(|err| RegistryError::Unexpected(err.into()))?;
        Ok(())
    }

    async fn subscriptions_for_topic(
        &self,
        topic: Topic,
    ) -> RegistryResult<Vec<SubscriptionRecord>> {
        self.query_subscriptions(None, "topic", topic.as_str()).await
    }

    async fn subscriptions_for_connection(
        &self,
        connection_id: &str,
    ) -> RegistryResult<Vec<SubscriptionRecord>> {
        self.query_subscriptions(Some(CONNECTION_INDEX), "connection_id", connection_id)
            .await
    }

    async fn delete_connection_subscriptions(&self, connection_id: &str) -> RegistryResult<usize> {
        let records = self.subscriptions_for_connection(connection_id).await?;
        for record in &records {
            self.delete_subscription(record.topic, &record.subscription_id)
                .await?;
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_attrs_round_trip() {
        let record = ConnectionRecord {
            connection_id: "c1".into(),
            acked: true,
            connected_at: 100,
            expires_at: 200,
        };
        let attrs = connection_to_attrs(&record);
        assert_eq!(attrs_to_connection(&attrs).expect("decode"), record);
    }

    #[test]
    fn subscription_attrs_round_trip() {
        let record = SubscriptionRecord {
            subscription_id: "c1:op-1".into(),
            topic: Topic::ItemUpdated,
            connection_id: "c1".into(),
            operation_id: "op-1".into(),
            fields: vec!["id".into(), "name".into()],
            expires_at: 500,
        };
        let attrs = subscription_to_attrs(&record);
        assert_eq!(attrs["topic"], AttributeValue::S("ITEM_UPDATED".into()));
        assert_eq!(attrs_to_subscription(&attrs).expect("decode"), record);
    }

    #[test]
    fn missing_attribute_is_corrupt() {
        let mut attrs = connection_to_attrs(&ConnectionRecord::new("c1", 60));
        attrs.remove("acked");
        let err = attrs_to_connection(&attrs).expect_err("corrupt");
        assert!(matches!(err, RegistryError::Corrupt(_)));
    }
}
