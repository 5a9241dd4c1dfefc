use super::client::{CompletionRequest, ModelClient};
use super::schema::extract_json;
use crate::results::{Listing, ProductRecord};
use crate::utils::truncate_chars;
use serde_json::{Value, json};
use std::sync::Arc;

const COMMENTARY_SYSTEM: &str = "You are an enthusiastic, slightly quirky blog writer. Your task is to create short, \
engaging commentary for product listings that will catch a reader's attention and encourage them to explore the \
product further. Your tone should be conversational, fun, and sometimes a bit surprised by what you're seeing. \
Keep it short and impactful.";

const LISTINGS_SYSTEM: &str = "You are a specialized content creation assistant for directory websites. You can \
create detailed, SEO-friendly product listings with accurate metadata.";

/// Generates marketing copy: blog commentary and whole directory listings
pub struct ContentWriter {
    client: Arc<ModelClient>,
}

impl ContentWriter {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }

    /// Two or three casual sentences about a product, or `None` when generation failed
    pub async fn blog_commentary(&self, product: &ProductRecord) -> Option<String> {
        let product_json = serde_json::to_string(product).ok()?;
        let prompt = format!(
            r#"Here's product data for an item I found on the web:
```
{product_json}
```

Write a short, catchy blog commentary for this product. Something like:
"Check out this amazing gadget I found! It's perfect for anyone who needs X."
or
"I couldn't believe the price on this - such a steal for the quality you're getting!"

Keep it under 2-3 sentences, make it sound casual and excited, like a friend sharing a cool find."#
        );

        let request = CompletionRequest {
            prompt,
            system: Some(COMMENTARY_SYSTEM.to_string()),
            temperature: Some(0.8),
            max_tokens: Some(150),
        };

        match self.client.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                ::log::warn!("Commentary model returned an empty reply");
                None
            }
            Err(e) => {
                ::log::error!("Error generating commentary: {}", e);
                None
            }
        }
    }

    /// Generate `count` listings for a search term directly with the model.
    ///
    /// Returns the parsed `{"listings": [...]}` document, or an `{"error", "raw_response"}`
    /// mapping when the reply could not be used.
    pub async fn generate_listings(&self, search_term: &str, category: &str, count: usize) -> Value {
        let template = json!({
            "listings": [{
                "title": "Product title",
                "slug": "product-slug",
                "metaDescription": "SEO-friendly description of the product",
                "content": "Detailed content about the product (at least 300 words)",
                "imageUrl": "https://example.com/image.jpg",
                "backlinkUrl": "https://original-product-site.com/product",
                "backlinkAnchorText": "Product Name",
                "backlinkPosition": "prominent",
                "backlinkType": "dofollow",
                "customFields": {
                    "product_name": "Full product name",
                    "brand": "Brand name",
                    "rating": 4.5,
                    "category": "Product category",
                    "price": "Price with currency"
                }
            }]
        });
        let template = serde_json::to_string_pretty(&template).unwrap_or_default();

        let prompt = format!(
            r#"Create {count} detailed product listings for a directory website about "{search_term}" in the category "{category}".

For each listing:
1. Create an informative title with the product name
2. Generate a slug based on the title (lowercase, hyphens instead of spaces)
3. Write a compelling meta description (150-160 characters)
4. Write detailed content (at least 300 words) covering features, use cases, specifications,
   comparisons to similar products, pros and cons
5. Include realistic image URL, backlink URL, backlink anchor text and custom field values

Format the output according to this JSON schema:
```json
{template}
```

Use markdown formatting in the content field.
Return ONLY the valid JSON output, no explanations or wrapper text."#
        );

        let request = CompletionRequest {
            prompt,
            system: Some(LISTINGS_SYSTEM.to_string()),
            temperature: Some(0.7),
            max_tokens: None,
        };

        let reply = match self.client.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                ::log::error!("Listing generation failed: {}", e);
                return json!({"error": e.to_string()});
            }
        };

        match serde_json::from_str::<Value>(extract_json(&reply)) {
            Ok(value) => value,
            Err(e) => {
                ::log::error!("Failed to parse generated listings as JSON: {}", e);
                json!({
                    "error": "Failed to parse response as JSON",
                    "raw_response": truncate_chars(&reply, 500),
                })
            }
        }
    }
}

/// Listings found in a generated document; malformed entries are skipped
pub fn listings_in(document: &Value) -> Vec<Listing> {
    document
        .get("listings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Listing>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
