use crate::models::queue::{sort_by_serve_order, PositionUpdate, QueueEntry, QueueStatus, StationQueue};
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, Select, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, to_item};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

/// DynamoDB caps a transaction at 100 actions.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// A status change committed together with the renumbering it causes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryTransition {
    pub entry: QueueEntry,
    pub expected_status: QueueStatus,
    pub renumbered: Vec<PositionUpdate>,
    pub expected_version: u64,
}

/// A hard delete, optionally compacting the remaining pending entries.
/// Without `expected_version` the delete is unconditional on the station.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRemoval {
    pub entry_id: Uuid,
    pub station_user_id: String,
    pub renumbered: Vec<PositionUpdate>,
    pub expected_version: Option<u64>,
}

/// Record store for the fuel queue.
///
/// Every write that changes a station's pending set bumps that station's
/// version, and every multi-row write is applied atomically.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Station version plus its pending entries in serve order.
    async fn load_station_queue(
        &self,
        station_user_id: &str,
    ) -> Result<StationQueue, QueueRepositoryError>;
    async fn insert_entry(
        &self,
        entry: &QueueEntry,
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError>;
    async fn get_entry(&self, entry_id: Uuid) -> Result<QueueEntry, QueueRepositoryError>;
    async fn commit_transition(
        &self,
        transition: &EntryTransition,
    ) -> Result<(), QueueRepositoryError>;
    async fn apply_positions(
        &self,
        station_user_id: &str,
        updates: &[PositionUpdate],
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError>;
    /// Deletes the entry and returns what was stored.
    async fn remove_entry(
        &self,
        removal: &EntryRemoval,
    ) -> Result<QueueEntry, QueueRepositoryError>;
    async fn list_station_entries(
        &self,
        station_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError>;
    async fn list_car_entries(
        &self,
        car_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError>;
    async fn count_station_entries(
        &self,
        station_user_id: &str,
        status: QueueStatus,
    ) -> Result<usize, QueueRepositoryError>;
}

#[derive(Debug, Deserialize, Serialize)]
struct StationVersionItem {
    station_user_id: String,
    version: u64,
}

/// Queue entries live in `table_name` under partition key `station_user_id`
/// and sort key `id`, with GSIs `GSI_QueueById` and `GSI_QueueByCar`.
/// Station versions live in `station_table_name` keyed by `station_user_id`.
pub struct DynamoDbQueueRepository {
    pub client: Client,
    pub table_name: String,
    pub station_table_name: String,
}

impl DynamoDbQueueRepository {
    pub fn new(client: Client, table_name: &str, station_table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            station_table_name: station_table_name.to_string(),
        }
    }

    fn entry_key(station_user_id: &str, entry_id: Uuid) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                "station_user_id".to_string(),
                AttributeValue::S(station_user_id.to_string()),
            ),
            ("id".to_string(), AttributeValue::S(entry_id.to_string())),
        ])
    }

    async fn station_version(&self, station_user_id: &str) -> Result<u64, QueueRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.station_table_name)
            .key(
                "station_user_id",
                AttributeValue::S(station_user_id.to_string()),
            )
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => {
                let station: StationVersionItem = from_item(item)
                    .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
                Ok(station.version)
            }
            None => Ok(0),
        }
    }

    /// Bumps the station version, guarded by `expected_version` when given.
    fn version_bump(
        &self,
        station_user_id: &str,
        expected_version: Option<u64>,
    ) -> Result<TransactWriteItem, QueueRepositoryError> {
        let builder = Update::builder()
            .table_name(&self.station_table_name)
            .key(
                "station_user_id",
                AttributeValue::S(station_user_id.to_string()),
            )
            .expression_attribute_names("#version", "version");

        let builder = match expected_version {
            Some(expected) => builder
                .update_expression("SET #version = :next")
                .condition_expression(
                    "attribute_not_exists(station_user_id) OR #version = :expected",
                )
                .expression_attribute_values(
                    ":next",
                    AttributeValue::N((expected + 1).to_string()),
                )
                .expression_attribute_values(":expected", AttributeValue::N(expected.to_string())),
            None => builder
                .update_expression("ADD #version :one")
                .expression_attribute_values(":one", AttributeValue::N("1".to_string())),
        };
        let update = builder
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        Ok(TransactWriteItem::builder().update(update).build())
    }

    fn position_updates(
        &self,
        station_user_id: &str,
        updates: &[PositionUpdate],
    ) -> Result<Vec<TransactWriteItem>, QueueRepositoryError> {
        updates
            .iter()
            .map(|update| {
                let update = Update::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(Self::entry_key(station_user_id, update.entry_id)))
                    .update_expression("SET queue_position = :position")
                    .condition_expression("attribute_exists(id) AND #status = :pending")
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":position",
                        AttributeValue::N(update.queue_position.to_string()),
                    )
                    .expression_attribute_values(
                        ":pending",
                        AttributeValue::S(QueueStatus::Pending.as_str().to_string()),
                    )
                    .build()
                    .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;
                Ok(TransactWriteItem::builder().update(update).build())
            })
            .collect()
    }

    /// Runs `items` as one transaction. Item 0 is always the station version
    /// bump; a failed condition on item 1 is reported as `entry_failure`.
    async fn transact(
        &self,
        items: Vec<TransactWriteItem>,
        entry_failure: QueueRepositoryError,
    ) -> Result<(), QueueRepositoryError> {
        if items.len() > MAX_TRANSACTION_ITEMS {
            return Err(QueueRepositoryError::BatchTooLarge(items.len()));
        }

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(map_transaction_error(e, entry_failure)),
        }
    }

    async fn query_entries(
        &self,
        index_name: &str,
        key_attribute: &str,
        key_value: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError> {
        let mut entries = Vec::new();
        let mut start_key = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression(format!("{} = :key", key_attribute))
                .expression_attribute_values(":key", AttributeValue::S(key_value.to_string()))
                .set_exclusive_start_key(start_key.take());

            if index_name.is_empty() {
                request = request.consistent_read(true);
            } else {
                request = request.index_name(index_name);
            }

            if !statuses.is_empty() {
                let placeholders: Vec<String> =
                    (0..statuses.len()).map(|i| format!(":s{}", i)).collect();
                request = request
                    .filter_expression(format!("#status IN ({})", placeholders.join(", ")))
                    .expression_attribute_names("#status", "status");
                for (placeholder, status) in placeholders.iter().zip(statuses) {
                    request = request.expression_attribute_values(
                        placeholder,
                        AttributeValue::S(status.as_str().to_string()),
                    );
                }
            }

            let output = request
                .send()
                .await
                .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

            if let Some(items) = output.items {
                for item in items {
                    let entry: QueueEntry = from_item(item)
                        .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
                    entries.push(entry);
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(entries)
    }
}

fn map_transaction_error(
    error: SdkError<TransactWriteItemsError>,
    entry_failure: QueueRepositoryError,
) -> QueueRepositoryError {
    if let SdkError::ServiceError(service_err) = &error {
        if let TransactWriteItemsError::TransactionCanceledException(cancelled) = service_err.err()
        {
            let failed = cancelled
                .cancellation_reasons()
                .iter()
                .position(|reason| reason.code() == Some("ConditionalCheckFailed"));
            return match failed {
                Some(1) => entry_failure,
                Some(_) => QueueRepositoryError::VersionConflict,
                None => QueueRepositoryError::DynamoDb(error.to_string()),
            };
        }
    }
    QueueRepositoryError::DynamoDb(error.to_string())
}

#[async_trait]
impl QueueRepository for DynamoDbQueueRepository {
    async fn load_station_queue(
        &self,
        station_user_id: &str,
    ) -> Result<StationQueue, QueueRepositoryError> {
        // Version first: a write landing between the two reads makes the
        // snapshot newer than its version, which only causes a retry.
        let version = self.station_version(station_user_id).await?;
        let mut pending = self
            .query_entries("", "station_user_id", station_user_id, &[QueueStatus::Pending])
            .await?;
        sort_by_serve_order(&mut pending);

        Ok(StationQueue {
            station_user_id: station_user_id.to_string(),
            version,
            pending,
        })
    }

    async fn insert_entry(
        &self,
        entry: &QueueEntry,
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError> {
        let item = to_item(entry).map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        let items = vec![
            self.version_bump(&entry.station_user_id, Some(expected_version))?,
            TransactWriteItem::builder().put(put).build(),
        ];

        self.transact(items, QueueRepositoryError::VersionConflict)
            .await
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<QueueEntry, QueueRepositoryError> {
        let located = self
            .query_entries("GSI_QueueById", "id", &entry_id.to_string(), &[])
            .await?
            .into_iter()
            .next()
            .ok_or(QueueRepositoryError::NotFound)?;

        // The index is eventually consistent; re-read the base item.
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::entry_key(&located.station_user_id, entry_id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => {
                from_item(item).map_err(|e| QueueRepositoryError::Serialization(e.to_string()))
            }
            None => Err(QueueRepositoryError::NotFound),
        }
    }

    async fn commit_transition(
        &self,
        transition: &EntryTransition,
    ) -> Result<(), QueueRepositoryError> {
        let entry = &transition.entry;
        let item = to_item(entry).map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("#status = :expected_status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(
                ":expected_status",
                AttributeValue::S(transition.expected_status.as_str().to_string()),
            )
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        let mut items = vec![
            self.version_bump(&entry.station_user_id, Some(transition.expected_version))?,
            TransactWriteItem::builder().put(put).build(),
        ];
        items.extend(self.position_updates(&entry.station_user_id, &transition.renumbered)?);

        debug!(
            "Committing {} for entry {} with {} position updates",
            entry.status,
            entry.id,
            transition.renumbered.len()
        );
        self.transact(items, QueueRepositoryError::StatusConflict)
            .await
    }

    async fn apply_positions(
        &self,
        station_user_id: &str,
        updates: &[PositionUpdate],
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError> {
        let mut items = vec![self.version_bump(station_user_id, Some(expected_version))?];
        items.extend(self.position_updates(station_user_id, updates)?);

        self.transact(items, QueueRepositoryError::VersionConflict)
            .await
    }

    async fn remove_entry(
        &self,
        removal: &EntryRemoval,
    ) -> Result<QueueEntry, QueueRepositoryError> {
        let existing = self.get_entry(removal.entry_id).await?;

        let delete = Delete::builder()
            .table_name(&self.table_name)
            .set_key(Some(Self::entry_key(
                &removal.station_user_id,
                removal.entry_id,
            )))
            .condition_expression("attribute_exists(id)")
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        let mut items = vec![
            self.version_bump(&removal.station_user_id, removal.expected_version)?,
            TransactWriteItem::builder().delete(delete).build(),
        ];
        items.extend(self.position_updates(&removal.station_user_id, &removal.renumbered)?);

        self.transact(items, QueueRepositoryError::NotFound).await?;
        Ok(existing)
    }

    async fn list_station_entries(
        &self,
        station_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError> {
        self.query_entries("", "station_user_id", station_user_id, statuses)
            .await
    }

    async fn list_car_entries(
        &self,
        car_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError> {
        self.query_entries("GSI_QueueByCar", "car_user_id", car_user_id, statuses)
            .await
    }

    async fn count_station_entries(
        &self,
        station_user_id: &str,
        status: QueueStatus,
    ) -> Result<usize, QueueRepositoryError> {
        let mut total = 0usize;
        let mut start_key = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("station_user_id = :station")
                .filter_expression("#status = :status")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(
                    ":station",
                    AttributeValue::S(station_user_id.to_string()),
                )
                .expression_attribute_values(":status", AttributeValue::S(status.as_str().to_string()))
                .select(Select::Count)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

            total += output.count.max(0) as usize;

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(total)
    }
}
