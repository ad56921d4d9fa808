use crate::error::AppError;

use super::types::{video_candidate::VideoCandidate, video_job::VideoJob, StoredObject};
use serde::Serialize;
use std::ops::Deref;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// # Initialize a new datbase client
    ///
    /// # Arguments
    ///
    /// # Returns
    /// * `SurrealDbClient` initialized
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Sign in to database
        db.signin(Root { username, password }).await?;

        // Set namespace
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        Self::build_indexes(self).await?;
        Ok(())
    }

    pub async fn build_indexes(&self) -> Result<(), Error> {
        let job_table = VideoJob::table_name();
        let candidate_table = VideoCandidate::table_name();

        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_video_job_status ON {job_table} FIELDS status"
            ))
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_video_job_tenant ON {job_table} FIELDS tenant_id"
            ))
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_video_job_created ON {job_table} FIELDS created_at"
            ))
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_video_candidate_job ON {candidate_table} FIELDS job_id"
            ))
            .await?;

        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Merges a partial document into an existing record and returns the record after the update.
    ///
    /// Fields absent from `patch` are left untouched, so concurrent writers of disjoint fields
    /// (the worker and a cancellation request) do not overwrite each other.
    pub async fn merge_item<T, P>(&self, id: &str, patch: P) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
        P: Serialize + Send + Sync + 'static,
    {
        self.client
            .query("UPDATE type::thing($table, $id) MERGE $patch RETURN AFTER")
            .bind(("table", T::table_name()))
            .bind(("id", id.to_string()))
            .bind(("patch", patch))
            .await?
            .take(0)
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
