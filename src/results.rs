use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of a visited page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageType {
    /// A single product with price and purchase options
    Product,
    /// Several products in a list or grid
    Category,
    /// Anything else (homepage, blog, error page, captcha)
    Neither,
}

impl PageType {
    /// Parse a model label; anything unrecognised counts as `Neither`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "PRODUCT" => PageType::Product,
            "CATEGORY" => PageType::Category,
            _ => PageType::Neither,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageType::Product => "PRODUCT",
            PageType::Category => "CATEGORY",
            PageType::Neither => "NEITHER",
        };
        f.write_str(label)
    }
}

/// A link the classifier wants followed from a category page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedLink {
    pub url: String,
    #[serde(default)]
    pub reason: String,
}

/// Outcome of classifying one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub page_type: PageType,
    /// 0-100
    pub confidence: u8,
    pub reason: String,
    /// Only populated for `Category`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_links: Vec<RecommendedLink>,
}

impl PageAnalysis {
    pub fn new(page_type: PageType, confidence: u8, reason: impl Into<String>) -> Self {
        Self {
            page_type,
            confidence: confidence.min(100),
            reason: reason.into(),
            recommended_links: Vec::new(),
        }
    }

    /// Attach link recommendations; ignored unless this is a category page
    pub fn with_links(mut self, links: Vec<RecommendedLink>) -> Self {
        if self.page_type == PageType::Category {
            self.recommended_links = links;
        }
        self
    }
}

/// SEO metadata scraped from the page head
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoData {
    /// `<meta name=...>` tags plus canonical URL and page title
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_tags: BTreeMap<String, String>,
    /// Open Graph `og:*` properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub og_tags: BTreeMap<String, String>,
    /// JSON-LD blocks found on the page
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_data: Vec<Value>,
}

impl SeoData {
    pub fn is_empty(&self) -> bool {
        self.meta_tags.is_empty() && self.og_tags.is_empty() && self.schema_data.is_empty()
    }
}

/// Represents one extracted product, or the reason a page did not yield one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub is_product: bool,

    /// Why extraction produced no product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_categories: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_image_urls: Option<Vec<String>>,

    /// Either a feature list or a key-value map, depending on what the model returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifications: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_listing_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_commentary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_commentary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlink_suggestions: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoData>,

    /// Anything else the model produced (search terms, audience, use cases, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductRecord {
    /// A record for a page that did not yield a product
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            is_product: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Build a record from a model's extraction mapping.
    ///
    /// A mapping that is not a product collapses to just the error, so negative records
    /// never carry product fields.
    pub fn from_extraction(value: Value) -> Self {
        let is_product = value
            .get("is_product")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !is_product {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
                .unwrap_or("Not a product page")
                .to_string();
            return Self::rejected(error);
        }

        let mut value = value;
        if let Value::Object(map) = &mut value {
            // nulls would otherwise trip the typed fields
            map.retain(|_, v| !v.is_null());
        }

        match serde_json::from_value::<ProductRecord>(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                ::log::warn!("Extraction did not fit the product record ({}), coercing field by field", e);
                match value {
                    Value::Object(map) => Self::from_loose_fields(map),
                    _ => Self::rejected("Extraction was not an object"),
                }
            }
        }
    }

    /// Keep every field that fits its typed slot; the rest moves to `raw_<key>` so a
    /// saved record always loads back.
    fn from_loose_fields(map: Map<String, Value>) -> Self {
        let mut fitted = Map::new();
        let mut rejected = Map::new();
        for (key, value) in map {
            if key == "is_product" {
                continue;
            }
            let value = coerce_field(&key, value);
            let mut single = Map::new();
            single.insert("is_product".to_string(), Value::Bool(true));
            single.insert(key.clone(), value.clone());
            if serde_json::from_value::<ProductRecord>(Value::Object(single)).is_ok() {
                fitted.insert(key, value);
            } else {
                ::log::debug!("Keeping mistyped field {} as raw_{}", key, key);
                rejected.insert(format!("raw_{}", key), value);
            }
        }
        fitted.insert("is_product".to_string(), Value::Bool(true));

        let mut record = serde_json::from_value::<ProductRecord>(Value::Object(fitted)).unwrap_or_else(|e| {
            ::log::warn!("Product fields still did not fit ({}), keeping only the flag", e);
            Self {
                is_product: true,
                ..Self::default()
            }
        });
        record.extra.extend(rejected);
        record
    }

    /// Display name, falling back to the SEO title
    pub fn title(&self) -> Option<&str> {
        self.product_name
            .as_deref()
            .or(self.seo_listing_title.as_deref())
    }
}

const LIST_FIELDS: &[&str] = &["secondary_categories", "additional_image_urls", "backlink_suggestions"];
const TEXT_FIELDS: &[&str] = &[
    "error",
    "id",
    "product_name",
    "price",
    "description",
    "brand",
    "primary_category",
    "main_image_url",
    "thumbnail_url",
    "seo_listing_title",
    "original_commentary",
    "blog_commentary",
    "source_url",
    "source_domain",
    "slug",
    "scraped_at",
];

/// Repair the shapes models commonly get wrong: numbers for text, one string for a list
fn coerce_field(key: &str, value: Value) -> Value {
    match value {
        Value::Number(n) if TEXT_FIELDS.contains(&key) => Value::String(n.to_string()),
        Value::Bool(b) if TEXT_FIELDS.contains(&key) => Value::String(b.to_string()),
        Value::String(s) if LIST_FIELDS.contains(&key) => Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        Value::Array(items) if LIST_FIELDS.contains(&key) => Value::Array(
            items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    Value::String(s) => Value::String(s),
                    other => Value::String(other.to_string()),
                })
                .collect(),
        ),
        other => other,
    }
}

/// Category in the content API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_slug: Option<String>,
}

/// Site in the content API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A directory listing derived from a product record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub backlink_url: String,
    #[serde(default)]
    pub backlink_anchor_text: String,
    #[serde(default)]
    pub backlink_position: String,
    #[serde(default)]
    pub backlink_type: String,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
}

/// Outcome of submitting one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub product_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_type_labels() {
        assert_eq!(PageType::from_label("product"), PageType::Product);
        assert_eq!(PageType::from_label(" CATEGORY "), PageType::Category);
        assert_eq!(PageType::from_label("blog"), PageType::Neither);
        assert_eq!(PageType::Category.to_string(), "CATEGORY");
        assert_eq!(serde_json::to_value(PageType::Neither).unwrap(), json!("NEITHER"));
    }

    #[test]
    fn test_links_only_kept_for_category() {
        let link = RecommendedLink {
            url: "https://shop.example/p/1".into(),
            reason: "first".into(),
        };
        let product = PageAnalysis::new(PageType::Product, 90, "single item").with_links(vec![link.clone()]);
        assert!(product.recommended_links.is_empty());

        let category = PageAnalysis::new(PageType::Category, 80, "grid").with_links(vec![link]);
        assert_eq!(category.recommended_links.len(), 1);
    }

    #[test]
    fn test_rejected_extraction_drops_product_fields() {
        let record = ProductRecord::from_extraction(json!({
            "is_product": false,
            "product_name": "Should vanish",
            "price": "10.00",
            "error": "search results page"
        }));
        assert!(!record.is_product);
        assert_eq!(record.error.as_deref(), Some("search results page"));
        assert!(record.product_name.is_none());
        assert!(record.price.is_none());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_rejected_extraction_always_has_error() {
        let record = ProductRecord::from_extraction(json!({ "is_product": false }));
        assert_eq!(record.error.as_deref(), Some("Not a product page"));

        let record = ProductRecord::from_extraction(json!("not even an object"));
        assert!(!record.is_product);
        assert!(record.error.is_some());
    }

    #[test]
    fn test_product_extraction_keeps_extra_fields() {
        let record = ProductRecord::from_extraction(json!({
            "is_product": true,
            "product_name": "Ninja Air Fryer",
            "price": "89.99",
            "brand": null,
            "target_audience": "home cooks",
            "specifications": {"capacity": "4 qt"}
        }));
        assert!(record.is_product);
        assert_eq!(record.title(), Some("Ninja Air Fryer"));
        assert!(record.brand.is_none());
        assert_eq!(record.extra.get("target_audience"), Some(&json!("home cooks")));
        assert_eq!(record.specifications, Some(json!({"capacity": "4 qt"})));
    }

    #[test]
    fn test_mistyped_extraction_is_coerced() {
        let record = ProductRecord::from_extraction(json!({
            "is_product": true,
            "product_name": "Kettle",
            "price": 24.5,
            "secondary_categories": "Kitchen, Appliances"
        }));
        assert!(record.is_product);
        assert_eq!(record.product_name.as_deref(), Some("Kettle"));
        assert_eq!(record.price.as_deref(), Some("24.5"));
        assert_eq!(
            record.secondary_categories,
            Some(vec!["Kitchen".to_string(), "Appliances".to_string()])
        );
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_one_bad_field_keeps_the_good_ones() {
        let record = ProductRecord::from_extraction(json!({
            "is_product": true,
            "product_name": "Kettle",
            "price": "$20",
            "description": "Boils fast",
            "main_image_url": "https://shop.example/kettle.jpg",
            "brand": {"name": "Acme"},
            "target_audience": "tea drinkers"
        }));
        assert_eq!(record.price.as_deref(), Some("$20"));
        assert_eq!(record.description.as_deref(), Some("Boils fast"));
        assert_eq!(record.main_image_url.as_deref(), Some("https://shop.example/kettle.jpg"));
        assert!(record.brand.is_none());
        assert_eq!(record.extra.get("raw_brand"), Some(&json!({"name": "Acme"})));
        assert!(record.extra.get("brand").is_none());
        assert_eq!(record.extra.get("target_audience"), Some(&json!("tea drinkers")));

        // the record must survive its own serialization
        let reloaded: ProductRecord = serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(reloaded, record);
    }

    #[test]
    fn test_listing_uses_camel_case() {
        let listing = Listing {
            title: "Kettle".into(),
            backlink_url: "https://shop.example/kettle".into(),
            ..Listing::default()
        };
        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value["backlinkUrl"], json!("https://shop.example/kettle"));
        assert!(value.get("id").is_none());
    }
}
