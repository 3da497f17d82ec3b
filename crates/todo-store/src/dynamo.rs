//! DynamoDB-backed item store.
//!
//! Items live in a single table keyed by the generated `id`. Partial updates
//! are expressed as `SET` update expressions built from the patch, guarded by
//! an existence condition so updating a missing id writes nothing. Every
//! attribute name goes through a placeholder because some of them (`name`)
//! collide with DynamoDB reserved words.
use crate::{ItemStore, StoreError, StoreResult};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::str::FromStr;
use todo_core::{Item, ItemId, ItemPatch};

#[derive(Debug, Clone)]
pub struct DynamoConfig {
    pub table_name: String,
    /// Region override; SDK default when unset.
    pub region: Option<String>,
    /// Endpoint override for local development (e.g. dynamodb-local).
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct DynamoItemStore {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoItemStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

/// Build a DynamoDB client from ambient SDK config plus local overrides.
/// Shared with the durable subscriber registry so both speak to the same
/// endpoint in local development.
pub async fn build_client(region: Option<String>, endpoint: Option<String>) -> Client {
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
    if let Some(region) = region {
        builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
    }
    if let Some(endpoint) = endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    Client::from_conf(builder.build())
}

impl DynamoItemStore {
    pub async fn connect(config: DynamoConfig) -> Self {
        let client = build_client(config.region, config.endpoint).await;
        Self {
            client,
            table_name: config.table_name,
        }
    }

    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

fn item_to_attrs(item: &Item) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("id".to_string(), AttributeValue::S(item.id.to_string())),
        ("name".to_string(), AttributeValue::S(item.name.clone())),
        ("done".to_string(), AttributeValue::Bool(item.done)),
    ])
}

fn attrs_to_item(attrs: &HashMap<String, AttributeValue>) -> StoreResult<Item> {
    let id = attrs
        .get("id")
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| StoreError::Corrupt("missing id attribute".into()))?;
    let id = ItemId::from_str(id).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let name = attrs
        .get("name")
        .and_then(|value| value.as_s().ok())
        .cloned()
        .ok_or_else(|| StoreError::Corrupt("missing name attribute".into()))?;
    let done = attrs
        .get("done")
        .and_then(|value| value.as_bool().ok())
        .copied()
        .ok_or_else(|| StoreError::Corrupt("missing done attribute".into()))?;
    Ok(Item { id, name, done })
}

/// Turn a patch into a `SET` update expression with placeholder names and
/// values, one pair per present field.
fn patch_update_expression(
    patch: &ItemPatch,
) -> (
    String,
    HashMap<String, String>,
    HashMap<String, AttributeValue>,
) {
    let mut parts = Vec::new();
    let mut names = HashMap::new();
    let mut values = HashMap::new();
    let mut attrs: Vec<(&str, AttributeValue)> = Vec::new();
    if let Some(name) = &patch.name {
        attrs.push(("name", AttributeValue::S(name.clone())));
    }
    if let Some(done) = patch.done {
        attrs.push(("done", AttributeValue::Bool(done)));
    }
    for (counter, (attr, value)) in attrs.into_iter().enumerate() {
        let name_placeholder = format!("#n{counter}");
        let value_placeholder = format!(":v{counter}");
        parts.push(format!("{name_placeholder} = {value_placeholder}"));
        names.insert(name_placeholder, attr.to_string());
        values.insert(value_placeholder, value);
    }
    (format!("SET {}", parts.join(", ")), names, values)
}

fn is_conditional_check_failed(err: &SdkError<UpdateItemError>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(
                service_err.err(),
                UpdateItemError::ConditionalCheckFailedException(_)
            )
        }
        _ => false,
    }
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn list(&self) -> StoreResult<Vec<Item>> {
        // Page through the whole table; scan order is the store order.
        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| StoreError::Unexpected(err.into()))?;
            for attrs in output.items() {
                items.push(attrs_to_item(attrs)?);
            }
            match output.last_evaluated_key() {
                Some(key) => start_key = Some(key.clone()),
                None => break,
            }
        }
        Ok(items)
    }

    async fn get(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|err| StoreError::Unexpected(err.into()))?;
        output.item().map(attrs_to_item).transpose()
    }

    async fn insert(&self, name: String) -> StoreResult<Item> {
        let item = Item::new(name);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_to_attrs(&item)))
            .send()
            .await
            .map_err(|err| StoreError::Unexpected(err.into()))?;
        tracing::debug!(id = %item.id, "item inserted");
        Ok(item)
    }

    async fn update(&self, id: ItemId, patch: ItemPatch) -> StoreResult<Option<Item>> {
        if patch.is_empty() {
            // Nothing to write; the previous view is just the stored record.
            return self.get(id).await;
        }
        let (expression, mut names, values) = patch_update_expression(&patch);
        names.insert("#id".to_string(), "id".to_string());
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression(expression)
            .condition_expression("attribute_exists(#id)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllOld)
            .send()
            .await;
        match result {
            Ok(output) => output.attributes().map(attrs_to_item).transpose(),
            // The existence condition failed: the id was never stored.
            Err(err) if is_conditional_check_failed(&err) => Ok(None),
            Err(err) => Err(StoreError::Unexpected(err.into())),
        }
    }

    async fn delete(&self, id: ItemId) -> StoreResult<bool> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|err| StoreError::Unexpected(err.into()))?;
        Ok(output.attributes().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_round_trip() {
        let item = Item::new("buy milk");
        let attrs = item_to_attrs(&item);
        let decoded = attrs_to_item(&attrs).expect("decode");
        assert_eq!(decoded, item);
    }

    #[test]
    fn attrs_missing_field_is_corrupt() {
        let mut attrs = item_to_attrs(&Item::new("buy milk"));
        attrs.remove("done");
        let err = attrs_to_item(&attrs).expect_err("corrupt");
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn patch_expression_covers_present_fields_only() {
        let patch = ItemPatch {
            name: Some("buy oat milk".into()),
            done: None,
        };
        let (expression, names, values) = patch_update_expression(&patch);
        assert_eq!(expression, "SET #n0 = :v0");
        assert_eq!(names.get("#n0"), Some(&"name".to_string()));
        assert_eq!(
            values.get(":v0"),
            Some(&AttributeValue::S("buy oat milk".into()))
        );
    }

    #[test]
    fn patch_expression_joins_multiple_fields() {
        let patch = ItemPatch {
            name: Some("x".into()),
            done: Some(true),
        };
        let (expression, names, values) = patch_update_expression(&patch);
        assert_eq!(expression, "SET #n0 = :v0, #n1 = :v1");
        assert_eq!(names.len(), 2);
        assert_eq!(values.get(":v1"), Some(&AttributeValue::Bool(true)));
    }
}
