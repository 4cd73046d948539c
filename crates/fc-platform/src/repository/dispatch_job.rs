//! Dispatch Job Repository

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{doc, Bson},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
};
use tracing::info;

use super::DispatchJobStore;
use crate::domain::{DispatchJob, DispatchStatus};
use crate::error::{PlatformError, Result};

const COLLECTION: &str = "dispatch_jobs";
const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct DispatchJobRepository {
    collection: Collection<DispatchJob>,
}

impl DispatchJobRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(COLLECTION),
        }
    }

    /// Create the indexes the processing path and the scheduler rely on
    pub async fn ensure_indexes(&self) -> Result<()> {
        // Idempotency - unique among jobs that carry a key
        self.collection.create_index(
            IndexModel::builder()
                .keys(doc! { "idempotencyKey": 1 })
                .options(IndexOptions::builder()
                    .unique(true)
                    .sparse(true)
                    .build())
                .build(),
        ).await?;

        // Scheduler - find due pending jobs
        self.collection.create_index(
            IndexModel::builder()
                .keys(doc! { "status": 1, "scheduledFor": 1, "createdAt": 1 })
                .build(),
        ).await?;

        // FIFO ordering within a message group
        self.collection.create_index(
            IndexModel::builder()
                .keys(doc! { "messageGroup": 1, "status": 1 })
                .options(IndexOptions::builder().sparse(true).build())
                .build(),
        ).await?;

        info!("Created indexes on {}", COLLECTION);
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl DispatchJobStore for DispatchJobRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<DispatchJob>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<DispatchJob>> {
        Ok(self.collection.find_one(doc! { "idempotencyKey": key }).await?)
    }

    async fn insert(&self, job: &DispatchJob) -> Result<()> {
        job.validate()?;
        match self.collection.insert_one(job).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(PlatformError::duplicate(
                "DispatchJob",
                "idempotencyKey",
                job.idempotency_key.clone().unwrap_or_default(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, id: &str, status: DispatchStatus) -> Result<()> {
        let now = bson::DateTime::from_chrono(Utc::now());
        let result = self.collection
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": { "status": status.as_str(), "updatedAt": now },
                    "$inc": { "version": 1_i64 },
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PlatformError::not_found("DispatchJob", id));
        }
        Ok(())
    }

    async fn update(&self, job: &mut DispatchJob) -> Result<()> {
        let expected = job.version;
        let mut filter = doc! { "_id": &job.id };
        if expected == 0 {
            // Documents written before versioning carry no version field
            filter.insert("$or", vec![
                Bson::Document(doc! { "version": 0_i64 }),
                Bson::Document(doc! { "version": { "$exists": false } }),
            ]);
        } else {
            filter.insert("version", expected as i64);
        }

        job.version = expected + 1;
        let result = match self.collection.replace_one(filter, &*job).await {
            Ok(result) => result,
            Err(e) => {
                job.version = expected;
                return Err(e.into());
            }
        };

        if result.matched_count == 0 {
            job.version = expected;
            let exists = self.collection
                .count_documents(doc! { "_id": &job.id })
                .await?
                > 0;
            return Err(if exists {
                PlatformError::conflict("DispatchJob", &job.id, expected)
            } else {
                PlatformError::not_found("DispatchJob", &job.id)
            });
        }
        Ok(())
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<DispatchJob>> {
        let now = bson::DateTime::from_chrono(Utc::now());
        let filter = doc! {
            "status": DispatchStatus::Pending.as_str(),
            "$or": [
                { "scheduledFor": { "$exists": false } },
                { "scheduledFor": Bson::Null },
                { "scheduledFor": { "$lte": now } },
            ],
        };
        let options = FindOptions::builder()
            .sort(doc! { "scheduledFor": 1, "createdAt": 1 })
            .limit(limit)
            .build();

        let cursor = self.collection
            .find(filter)
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
