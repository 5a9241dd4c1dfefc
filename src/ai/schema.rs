use serde_json::{Map, Value, json};

/// JSON type expected for a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    /// Array of strings
    StringList,
    /// Array of `{url, reason}` objects
    LinkList,
    /// Array or object, whatever the model found
    Collection,
}

impl FieldKind {
    fn type_name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList | FieldKind::LinkList => "array",
            FieldKind::Collection => "array or object",
        }
    }

    fn example(self) -> Value {
        match self {
            FieldKind::String => json!("example text"),
            FieldKind::Integer => json!(100),
            FieldKind::Boolean => json!(true),
            FieldKind::StringList => json!(["item1", "item2"]),
            FieldKind::LinkList => json!([{"url": "https://example.com/item", "reason": "why"}]),
            FieldKind::Collection => json!(["item1", "item2"]),
        }
    }

    /// Check a value against this kind, coercing where the intent is unambiguous
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldKind::String, Value::String(_)) => Some(value.clone()),
            (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldKind::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .map(Value::from),
            (FieldKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (FieldKind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldKind::StringList, Value::Array(items)) => items
                .iter()
                .all(Value::is_string)
                .then(|| value.clone()),
            (FieldKind::LinkList, Value::Array(items)) => items
                .iter()
                .all(Value::is_object)
                .then(|| value.clone()),
            (FieldKind::Collection, Value::Array(_) | Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

/// One field of a structured-output schema
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

const fn field(name: &'static str, kind: FieldKind, required: bool, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
        description,
    }
}

/// A named set of fields a model response is validated against
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

pub const PAGE_ANALYSIS: Schema = Schema {
    name: "page_analysis",
    fields: &[
        field("page_type", FieldKind::String, true, "Must be exactly 'PRODUCT', 'CATEGORY', or 'NEITHER'"),
        field("confidence", FieldKind::Integer, true, "Integer from 0-100 indicating confidence level"),
        field("reason", FieldKind::String, true, "Brief explanation of classification"),
        field(
            "recommended_links",
            FieldKind::LinkList,
            false,
            "Only for CATEGORY pages, list of recommended product links with url and reason",
        ),
    ],
};

pub const LINK_SELECTION: Schema = Schema {
    name: "link_selection",
    fields: &[
        field("selection", FieldKind::Integer, true, "The index number of the selected link (1-based)"),
        field("reason", FieldKind::String, true, "Reason why this link was selected"),
        field(
            "is_product_page",
            FieldKind::Boolean,
            true,
            "Whether this is likely a direct product page (vs. category)",
        ),
    ],
};

pub const PRODUCT_DATA: Schema = Schema {
    name: "product_data",
    fields: &[
        field("is_product", FieldKind::Boolean, true, "Whether this is a valid product page"),
        field("product_name", FieldKind::String, false, "Full product name/title"),
        field("price", FieldKind::String, false, "Price as text (e.g., '19.99')"),
        field("description", FieldKind::String, false, "Brief product description"),
        field(
            "seo_listing_title",
            FieldKind::String,
            false,
            "Catchy title for a directory listing (55-60 chars)",
        ),
        field("original_commentary", FieldKind::String, false, "Original commentary about the product"),
        field("primary_category", FieldKind::String, false, "Main product category"),
        field("secondary_categories", FieldKind::StringList, false, "Secondary categories/tags"),
        field("brand", FieldKind::String, false, "Product brand name"),
        field("main_image_url", FieldKind::String, false, "URL of the main product image"),
        field("additional_image_urls", FieldKind::StringList, false, "URLs of additional product images"),
        field("specifications", FieldKind::Collection, false, "Product specifications/features"),
        field("related_search_terms", FieldKind::StringList, false, "Related search terms"),
        field("target_audience", FieldKind::String, false, "Target audience for this product"),
        field("use_cases", FieldKind::StringList, false, "Possible use cases for this product"),
        field("benefits", FieldKind::StringList, false, "Key benefits of using this product"),
        field("unique_selling_points", FieldKind::String, false, "Unique selling points"),
        field("backlink_suggestions", FieldKind::StringList, false, "Backlink anchor text suggestions"),
        field("source_url", FieldKind::String, false, "Source URL of the product page"),
        field("source_domain", FieldKind::String, false, "Source domain of the product page"),
        field("error", FieldKind::String, false, "Error message if extraction failed"),
    ],
};

pub const MINIMAL_PRODUCT: Schema = Schema {
    name: "minimal_product",
    fields: &[
        field("is_product", FieldKind::Boolean, true, "Whether this is a valid product page"),
        field("product_name", FieldKind::String, false, "Full product name/title"),
        field("price", FieldKind::String, false, "Price as text"),
        field("description", FieldKind::String, false, "Brief product description"),
        field("error", FieldKind::String, false, "Reason why this isn't a product page"),
    ],
};

impl Schema {
    /// Instructions appended to a prompt describing the expected JSON object
    pub fn format_instructions(&self) -> String {
        let entries = self
            .fields
            .iter()
            .map(|f| {
                let spec = json!({
                    "type": f.kind.type_name(),
                    "required": f.required,
                    "description": f.description,
                    "example": f.kind.example(),
                });
                format!("  \"{}\": {}", f.name, spec)
            })
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "Your response should be a JSON object with these fields:\n{{\n{}\n}}\n\nReturn only valid JSON with no additional text.",
            entries
        )
    }

    /// Validate a parsed object. On success only schema fields that were present are
    /// kept, with values coerced to their declared kind.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        let Value::Object(map) = value else {
            return Err(format!("{} expects a JSON object", self.name));
        };

        let mut validated = Map::new();
        for spec in self.fields {
            match map.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(format!("missing required field '{}'", spec.name));
                }
                None => {}
                Some(raw) => {
                    let coerced = spec.kind.coerce(raw).ok_or_else(|| {
                        format!("field '{}' should be {}", spec.name, spec.kind.type_name())
                    })?;
                    validated.insert(spec.name.to_string(), coerced);
                }
            }
        }
        Ok(Value::Object(validated))
    }
}

/// Pull the JSON payload out of a model reply: the whole reply if it parses,
/// else the first fenced block, else the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if serde_json::from_str::<Value>(text).is_ok() {
        return text;
    }

    let fenced = text
        .split_once("```json")
        .or_else(|| text.split_once("```"))
        .map(|(_, rest)| rest.split_once("```").map_or(rest, |(inner, _)| inner));
    if let Some(inner) = fenced {
        return inner.trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse a reply against a schema. A reply that parses but fails validation is
/// returned unvalidated; only unparsable JSON is an error.
pub fn parse_structured(text: &str, schema: &Schema) -> Result<Value, serde_json::Error> {
    let payload = extract_json(text);
    let value = serde_json::from_str::<Value>(payload)?;

    match schema.validate(&value) {
        Ok(validated) => Ok(validated),
        Err(reason) => {
            ::log::error!("JSON validation error for {}: {}", schema.name, reason);
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json_unchanged() {
        let reply = "Here you go:\n```json\n{\"page_type\": \"PRODUCT\", \"confidence\": 90}\n```\nThanks";
        assert_eq!(
            extract_json(reply),
            "{\"page_type\": \"PRODUCT\", \"confidence\": 90}"
        );

        let reply = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_braced_span() {
        let reply = "Sure! {\"selection\": 2, \"reason\": \"x\"} hope that helps";
        assert_eq!(extract_json(reply), "{\"selection\": 2, \"reason\": \"x\"}");
        assert_eq!(extract_json("no json at all"), "no json at all");
    }

    #[test]
    fn test_validate_strips_unknown_fields() {
        let value = json!({
            "page_type": "CATEGORY",
            "confidence": "85",
            "reason": "grid of items",
            "mood": "cheerful"
        });
        let validated = PAGE_ANALYSIS.validate(&value).unwrap();
        assert_eq!(
            validated,
            json!({"page_type": "CATEGORY", "confidence": 85, "reason": "grid of items"})
        );
    }

    #[test]
    fn test_validate_missing_required() {
        let err = LINK_SELECTION.validate(&json!({"selection": 1})).unwrap_err();
        assert!(err.contains("reason"));
        assert!(LINK_SELECTION.validate(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_specifications_accepts_list_or_map() {
        let list = json!({"is_product": true, "specifications": ["4 qt", "1500W"]});
        let map = json!({"is_product": true, "specifications": {"capacity": "4 qt"}});
        assert!(PRODUCT_DATA.validate(&list).is_ok());
        assert!(PRODUCT_DATA.validate(&map).is_ok());
    }

    #[test]
    fn test_parse_structured_returns_raw_on_validation_failure() {
        let reply = "{\"page_type\": \"PRODUCT\", \"extra\": true}";
        let value = parse_structured(reply, &PAGE_ANALYSIS).unwrap();
        assert_eq!(value, json!({"page_type": "PRODUCT", "extra": true}));
    }

    #[test]
    fn test_parse_structured_rejects_garbage() {
        assert!(parse_structured("I cannot help with that", &PRODUCT_DATA).is_err());
    }

    #[test]
    fn test_format_instructions_lists_fields() {
        let instructions = MINIMAL_PRODUCT.format_instructions();
        assert!(instructions.starts_with("Your response should be a JSON object"));
        assert!(instructions.contains("\"is_product\""));
        assert!(instructions.contains("\"required\":true"));
        assert!(instructions.ends_with("Return only valid JSON with no additional text."));
    }
}
