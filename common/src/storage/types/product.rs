use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

// Read-only mirror of the catalog; the pipeline never writes products.
stored_object!(Product, "product", {
    tenant_id: String,
    name: String,
    image_url: Option<String>
});

impl Product {
    /// Looks up the primary image of a product owned by `tenant_id`.
    pub async fn image_url_for(
        db: &SurrealDbClient,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Option<String>, AppError> {
        let product = db.get_item::<Self>(product_id).await?;

        Ok(product
            .filter(|p| p.tenant_id == tenant_id)
            .and_then(|p| p.image_url)
            .filter(|url| !url.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn product(id: &str, tenant_id: &str, image_url: Option<&str>) -> Product {
        Product {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: "Sparkling Water".into(),
            image_url: image_url.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_image_lookup_respects_tenant() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        db.store_item(product("p1", "tenant-a", Some("https://img.example.com/p1.png")))
            .await
            .expect("store");

        let own = Product::image_url_for(&db, "tenant-a", "p1")
            .await
            .expect("lookup");
        assert_eq!(own.as_deref(), Some("https://img.example.com/p1.png"));

        let foreign = Product::image_url_for(&db, "tenant-b", "p1")
            .await
            .expect("lookup");
        assert!(foreign.is_none());

        let missing = Product::image_url_for(&db, "tenant-a", "nope")
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }
}
