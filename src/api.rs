//! Client for the directory content API.
//!
//! In mock mode every call is served from a local JSON datastore instead of the
//! network. Listing calls also fall back to that datastore when the API is unreachable.

use crate::config::ApiConfig;
use crate::error::{Result, ScoutError};
use crate::results::{Category, Listing, ProductRecord, Site, SubmissionResult};
use crate::storage::write_json;
use crate::utils::{generate_slug, truncate_chars};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SERVICE: &str = "content API";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Local stand-in for the API's data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalStore {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub listings: Vec<Listing>,
}

impl LocalStore {
    /// Read the datastore; a bare array is taken as a list of listings.
    /// A missing or unreadable file is an empty store.
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        if let Ok(store) = serde_json::from_str::<LocalStore>(&contents) {
            return store;
        }
        match serde_json::from_str::<Vec<Listing>>(&contents) {
            Ok(listings) => Self {
                listings,
                ..Self::default()
            },
            Err(e) => {
                ::log::error!("Error reading local datastore {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

/// Listing identifier used when the API did not assign one
pub fn local_listing_id(title: &str) -> String {
    local_id("listing", &[title])
}

/// `<prefix>_<millis>_<hash of parts>`
fn local_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), hasher.finish())
}

/// Talks to the content API, or to the local datastore in mock mode
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    mock_mode: bool,
    store_path: PathBuf,
}

impl DirectoryClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        if config.mock_mode {
            ::log::info!(
                "Content API client in mock mode, data goes to {}",
                config.local_store.display()
            );
        }
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            mock_mode: config.mock_mode,
            store_path: config.local_store.clone(),
        })
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    pub async fn create_site(&self, site: Site) -> Result<Site> {
        if self.mock_mode {
            ::log::info!("Mock: Creating site {}", site.name);
            let site = Site {
                id: Some(local_id("site", &[site.slug.as_str(), site.name.as_str()])),
                ..site
            };
            let mut store = LocalStore::load(&self.store_path);
            store.sites.push(site.clone());
            store.save(&self.store_path)?;
            return Ok(site);
        }

        let response = self.post("/api/sites", &serde_json::to_value(&site)?).await?;
        Ok(with_assigned_id(site, &response, |s, id| s.id = Some(id)))
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        if self.mock_mode {
            ::log::info!("Mock: Listing sites");
            return Ok(LocalStore::load(&self.store_path).sites);
        }
        let value = self.get("/api/sites").await?;
        items_in(value, "sites")
    }

    pub async fn create_category(&self, site_slug: &str, category: Category) -> Result<Category> {
        let category = Category {
            site_slug: Some(site_slug.to_string()),
            ..category
        };
        if self.mock_mode {
            ::log::info!("Mock: Creating category {} in site {}", category.name, site_slug);
            let category = Category {
                id: Some(local_id("category", &[site_slug, category.name.as_str()])),
                ..category
            };
            let mut store = LocalStore::load(&self.store_path);
            store.categories.push(category.clone());
            store.save(&self.store_path)?;
            return Ok(category);
        }

        let path = format!("/api/sites/{}/categories", site_slug);
        let response = self.post(&path, &serde_json::to_value(&category)?).await?;
        Ok(with_assigned_id(category, &response, |c, id| c.id = Some(id)))
    }

    pub async fn list_categories(&self, site_slug: &str) -> Result<Vec<Category>> {
        if self.mock_mode {
            ::log::info!("Mock: Listing categories for site {}", site_slug);
            let store = LocalStore::load(&self.store_path);
            return Ok(store
                .categories
                .into_iter()
                .filter(|c| c.site_slug.as_deref().is_none_or(|s| s == site_slug))
                .collect());
        }
        let value = self.get(&format!("/api/sites/{}/categories", site_slug)).await?;
        items_in(value, "categories")
    }

    /// Create a listing. Network failures fall back to the local datastore, so this
    /// only fails when the datastore cannot be written either.
    pub async fn create_listing(&self, site_slug: &str, listing: Listing) -> Result<Listing> {
        let listing = Listing {
            site_slug: Some(site_slug.to_string()),
            ..listing
        };
        if self.mock_mode {
            ::log::info!("Mock: Creating listing {} in site {}", listing.title, site_slug);
            return self.store_listing(listing);
        }

        ::log::info!("Submitting listing to {}/api/listings", self.base_url);
        let body = serde_json::to_value(&listing)?;
        match self.post("/api/listings", &body).await {
            Ok(response) => Ok(with_assigned_id(listing, &response, |l, id| l.id = Some(id))),
            Err(e) => {
                ::log::error!("Error creating listing: {}", e);
                self.store_listing(listing)
            }
        }
    }

    /// Listings of a site; read from the local datastore in mock mode or when the API fails
    pub async fn list_listings(&self, site_slug: &str) -> Result<Vec<Listing>> {
        if !self.mock_mode {
            let path = format!("/api/sites/{}/listings", site_slug);
            match self.get(&path).await.and_then(|v| items_in(v, "listings")) {
                Ok(listings) => return Ok(listings),
                Err(e) => ::log::error!("Error listing listings: {}", e),
            }
        } else {
            ::log::info!("Mock: Listing listings for site {}", site_slug);
        }

        let store = LocalStore::load(&self.store_path);
        Ok(store
            .listings
            .into_iter()
            .filter(|l| l.site_slug.as_deref() == Some(site_slug))
            .collect())
    }

    /// Category id to submit into: the configured id, else a category looked up or
    /// created by name
    pub async fn resolve_category(
        &self,
        site_slug: &str,
        category_id: Option<&str>,
        category_name: Option<&str>,
    ) -> Option<String> {
        if let Some(id) = category_id.filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        let name = category_name.filter(|n| !n.is_empty())?;

        match self.list_categories(site_slug).await {
            Ok(categories) => {
                if let Some(existing) = categories
                    .into_iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                {
                    ::log::info!("Using existing category {}", existing.name);
                    return existing.id;
                }
            }
            Err(e) => ::log::error!("Error listing categories: {}", e),
        }

        ::log::info!("Creating category {}", name);
        let category = Category {
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            meta_description: Some(format!("Products related to {}", name)),
            ..Category::default()
        };
        match self.create_category(site_slug, category).await {
            Ok(created) => created.id,
            Err(e) => {
                ::log::error!("Error creating category: {}", e);
                None
            }
        }
    }

    /// Submit every product as a listing, one result per product
    pub async fn submit_products(
        &self,
        site_slug: &str,
        category_id: &str,
        products: &[ProductRecord],
    ) -> Vec<SubmissionResult> {
        let mut results = Vec::new();
        for (i, product) in products.iter().enumerate().filter(|(_, p)| p.is_product) {
            let listing = listing_from_product(product, category_id, i + 1);
            let title = listing.title.clone();
            match self.create_listing(site_slug, listing).await {
                Ok(created) => {
                    ::log::info!("Created listing for {}", title);
                    results.push(SubmissionResult {
                        product_title: title,
                        listing_id: created.id,
                        error: None,
                        success: true,
                    });
                }
                Err(e) => {
                    ::log::error!("Error creating listing for {}: {}", title, e);
                    results.push(SubmissionResult {
                        product_title: title,
                        listing_id: None,
                        error: Some(e.to_string()),
                        success: false,
                    });
                }
            }
        }
        results
    }

    fn store_listing(&self, listing: Listing) -> Result<Listing> {
        let listing = Listing {
            id: Some(local_listing_id(&listing.title)),
            ..listing
        };
        let mut store = LocalStore::load(&self.store_path);
        store.listings.push(listing.clone());
        store.save(&self.store_path)?;
        ::log::info!("Saved listing to {}", self.store_path.display());
        Ok(listing)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        self.send(request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let request = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        self.send(request).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request.send().await?;
        ::log::info!("API response status: {}", response.status());
        if !response.status().is_success() {
            return Err(ScoutError::Status {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

/// Take the id the API assigned, if the response carries one
fn with_assigned_id<T>(mut item: T, response: &Value, set: impl Fn(&mut T, String)) -> T {
    let id = response
        .get("id")
        .or_else(|| response.pointer("/data/id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    if let Some(id) = id {
        set(&mut item, id);
    }
    item
}

/// Items of a list response: a bare array, or an array under `key` or `data`
fn items_in<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>> {
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove(key)
            .or_else(|| map.remove("data"))
            .unwrap_or_else(|| json!([])),
        _ => json!([]),
    };
    Ok(serde_json::from_value(items)?)
}

/// Listing for a product; `position` names untitled products
pub fn listing_from_product(product: &ProductRecord, category_id: &str, position: usize) -> Listing {
    let title = product
        .title()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Product {}", position));
    let description = product.description.clone().unwrap_or_default();

    let content = [product.blog_commentary.as_deref(), Some(description.as_str())]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut custom_fields = Map::new();
    let text = |v: &Option<String>| Value::String(v.clone().unwrap_or_default());
    custom_fields.insert("product_name".into(), text(&product.product_name));
    custom_fields.insert("brand".into(), text(&product.brand));
    custom_fields.insert("price".into(), text(&product.price));
    custom_fields.insert("category".into(), text(&product.primary_category));
    if let Some(Value::Object(specs)) = &product.specifications {
        for (key, value) in specs {
            custom_fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    Listing {
        slug: product
            .slug
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| generate_slug(&title)),
        category_id: Some(category_id.to_string()),
        meta_description: truncate_chars(&description, 160),
        content,
        image_url: product.main_image_url.clone().unwrap_or_default(),
        backlink_url: product.source_url.clone().unwrap_or_default(),
        backlink_anchor_text: product
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| "View Product".to_string()),
        backlink_position: "prominent".to_string(),
        backlink_type: "dofollow".to_string(),
        custom_fields,
        title,
        ..Listing::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mock_client(dir: &TempDir) -> DirectoryClient {
        DirectoryClient::new(&ApiConfig {
            mock_mode: true,
            local_store: dir.path().join("directory_listings.json"),
            ..ApiConfig::default()
        })
        .unwrap()
    }

    fn kettle() -> ProductRecord {
        ProductRecord {
            is_product: true,
            product_name: Some("Acme Kettle".into()),
            price: Some("$39.99".into()),
            brand: Some("Acme".into()),
            description: Some("A fast kettle. ".repeat(20)),
            blog_commentary: Some("Tea time just got faster!".into()),
            main_image_url: Some("https://shop.example/img/kettle.jpg".into()),
            source_url: Some("https://shop.example/p/kettle".into()),
            specifications: Some(json!({"capacity": "1.7L", "brand": "ignored"})),
            ..ProductRecord::default()
        }
    }

    #[tokio::test]
    async fn test_mock_ids_differ_within_one_second() {
        let dir = TempDir::new().unwrap();
        let client = mock_client(&dir);

        let mut ids = Vec::new();
        for name in ["Kettles", "Toasters"] {
            let category = Category {
                name: name.into(),
                ..Category::default()
            };
            ids.push(client.create_category("kitchen", category).await.unwrap().id.unwrap());
        }
        for name in ["Kitchen", "Garden"] {
            let site = Site {
                name: name.into(),
                slug: name.to_lowercase(),
                ..Site::default()
            };
            ids.push(client.create_site(site).await.unwrap().id.unwrap());
        }

        assert!(ids[0].starts_with("category_"));
        assert!(ids[2].starts_with("site_"));
        let unique = ids.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn test_mock_create_then_list_listing() {
        let dir = TempDir::new().unwrap();
        let client = mock_client(&dir);

        let created = client
            .create_listing(
                "kitchen",
                Listing {
                    title: "Acme Kettle".into(),
                    ..Listing::default()
                },
            )
            .await
            .unwrap();
        let id = created.id.clone().unwrap();
        assert!(id.starts_with("listing_"));
        assert_eq!(id.split('_').count(), 3);

        let listings = client.list_listings("kitchen").await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(listings[0].site_slug.as_deref(), Some("kitchen"));
        assert!(client.list_listings("garden").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_sites_and_categories() {
        let dir = TempDir::new().unwrap();
        let client = mock_client(&dir);

        let site = client
            .create_site(Site {
                name: "Kitchen Finds".into(),
                slug: "kitchen".into(),
                ..Site::default()
            })
            .await
            .unwrap();
        assert!(site.id.unwrap().starts_with("site_"));
        assert_eq!(client.list_sites().await.unwrap().len(), 1);

        let category = client
            .create_category(
                "kitchen",
                Category {
                    name: "Kettles".into(),
                    slug: "kettles".into(),
                    ..Category::default()
                },
            )
            .await
            .unwrap();
        assert!(category.id.unwrap().starts_with("category_"));
        assert_eq!(client.list_categories("kitchen").await.unwrap().len(), 1);
        assert!(client.list_categories("garden").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_category() {
        let dir = TempDir::new().unwrap();
        let client = mock_client(&dir);

        assert_eq!(
            client.resolve_category("kitchen", Some("cat-1"), Some("Kettles")).await,
            Some("cat-1".to_string())
        );
        assert_eq!(client.resolve_category("kitchen", None, None).await, None);

        let created = client.resolve_category("kitchen", None, Some("Small Appliances")).await.unwrap();
        let store = LocalStore::load(&dir.path().join("directory_listings.json"));
        assert_eq!(store.categories[0].slug, "small-appliances");
        assert_eq!(
            store.categories[0].meta_description.as_deref(),
            Some("Products related to Small Appliances")
        );

        // found by name the second time, not created again
        let found = client.resolve_category("kitchen", None, Some("small appliances")).await.unwrap();
        assert_eq!(found, created);
        assert_eq!(LocalStore::load(&dir.path().join("directory_listings.json")).categories.len(), 1);
    }

    #[test]
    fn test_listing_from_product() {
        let listing = listing_from_product(&kettle(), "cat-1", 1);
        assert_eq!(listing.title, "Acme Kettle");
        assert_eq!(listing.slug, "acme-kettle");
        assert_eq!(listing.category_id.as_deref(), Some("cat-1"));
        assert_eq!(listing.meta_description.chars().count(), 160);
        assert!(listing.content.starts_with("Tea time just got faster!\n\nA fast kettle."));
        assert_eq!(listing.backlink_url, "https://shop.example/p/kettle");
        assert_eq!(listing.backlink_anchor_text, "Acme Kettle");
        assert_eq!(listing.backlink_type, "dofollow");
        assert_eq!(listing.custom_fields["price"], "$39.99");
        assert_eq!(listing.custom_fields["capacity"], "1.7L");
        assert_eq!(listing.custom_fields["brand"], "Acme");
    }

    #[test]
    fn test_listing_from_untitled_product() {
        let product = ProductRecord {
            is_product: true,
            ..ProductRecord::default()
        };
        let listing = listing_from_product(&product, "cat-1", 3);
        assert_eq!(listing.title, "Product 3");
        assert_eq!(listing.slug, "product-3");
        assert_eq!(listing.backlink_anchor_text, "View Product");
        assert_eq!(listing.content, "");
    }

    #[tokio::test]
    async fn test_submit_products_skips_rejected() {
        let dir = TempDir::new().unwrap();
        let client = mock_client(&dir);
        let products = vec![kettle(), ProductRecord::rejected("category page")];

        let results = client.submit_products("kitchen", "cat-1", &products).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].product_title, "Acme Kettle");
        assert!(results[0].listing_id.is_some());
    }

    #[test]
    fn test_store_accepts_bare_listing_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, r#"[{"title": "Old listing", "siteSlug": "kitchen"}]"#).unwrap();

        let store = LocalStore::load(&path);
        assert_eq!(store.listings.len(), 1);
        assert!(store.sites.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back_to_local_store() {
        let dir = TempDir::new().unwrap();
        let client = DirectoryClient::new(&ApiConfig {
            mock_mode: false,
            base_url: "http://127.0.0.1:9".into(),
            local_store: dir.path().join("fallback.json"),
            ..ApiConfig::default()
        })
        .unwrap();

        let created = client
            .create_listing(
                "kitchen",
                Listing {
                    title: "Acme Kettle".into(),
                    ..Listing::default()
                },
            )
            .await
            .unwrap();
        assert!(created.id.unwrap().starts_with("listing_"));

        let listings = client.list_listings("kitchen").await.unwrap();
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn test_items_in_accepts_wrapped_lists() {
        let sites: Vec<Site> = items_in(json!({"sites": [{"name": "A", "slug": "a"}]}), "sites").unwrap();
        assert_eq!(sites[0].slug, "a");
        let sites: Vec<Site> = items_in(json!([{"name": "B"}]), "sites").unwrap();
        assert_eq!(sites[0].name, "B");
    }
}
