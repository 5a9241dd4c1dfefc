use crate::parsers::meta::{extract_metadata, image_candidates};
use url::Url;

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>
            Trail Runner   Shoes
        </title>
        <meta name="description" content="Lightweight trail shoes">
        <meta property="og:title" content="Trail Runner">
        <meta property="og:image" content="https://cdn.example/og.jpg">
        <link rel="canonical" href="https://shop.example/trail-runner">
        <script type="application/ld+json">{"@type": "Product", "name": "Trail Runner"}</script>
        <script type="application/ld+json">{ not json </script>
    </head><body>
        <img class="site-logo" src="/img/logo.png">
        <img class="product-main" src="/img/shoe-large.jpg">
        <img class="gallery-thumb" src="data:image/png;base64,AAAA">
        <img class="gallery-thumb" src="/img/shoe-32x32.jpg">
        <img src="/img/shoe-side.jpg" width="600">
    </body></html>"#;

    #[test]
    fn test_extract_metadata_fields() {
        let metadata = extract_metadata(PAGE);

        assert_eq!(
            metadata.fields.get("meta_description").map(String::as_str),
            Some("Lightweight trail shoes")
        );
        assert_eq!(metadata.fields.get("og_title").map(String::as_str), Some("Trail Runner"));
        assert_eq!(
            metadata.fields.get("canonical_url").map(String::as_str),
            Some("https://shop.example/trail-runner")
        );
        assert_eq!(
            metadata.fields.get("page_title").map(String::as_str),
            Some("Trail Runner Shoes")
        );
        assert!(!metadata.fields.contains_key("meta_keywords"));

        // the malformed block is skipped
        assert_eq!(metadata.json_ld.len(), 1);
        assert_eq!(metadata.json_ld[0]["@type"], "Product");
    }

    #[test]
    fn test_metadata_to_json_and_seo() {
        let metadata = extract_metadata(PAGE);

        let json = metadata.to_json();
        assert_eq!(json["og_image"], "https://cdn.example/og.jpg");
        assert_eq!(json["structured_data"][0]["name"], "Trail Runner");

        let seo = metadata.to_seo();
        assert_eq!(seo.og_tags.get("og:title").map(String::as_str), Some("Trail Runner"));
        assert!(seo.meta_tags.contains_key("meta_description"));
        assert!(!seo.meta_tags.contains_key("og_title"));
        assert_eq!(seo.schema_data.len(), 1);
    }

    #[test]
    fn test_empty_metadata() {
        let metadata = extract_metadata("<p>nothing here</p>");
        assert!(metadata.is_empty());
        assert!(metadata.to_seo().is_empty());
    }

    #[test]
    fn test_image_candidates() {
        let base = Url::parse("https://shop.example/trail-runner").unwrap();
        let images = image_candidates(PAGE, Some(&base), 10);

        assert_eq!(
            images,
            vec![
                "https://shop.example/img/shoe-large.jpg",
                "https://cdn.example/og.jpg",
                "https://shop.example/img/shoe-side.jpg",
            ]
        );
    }

    #[test]
    fn test_image_candidates_limit() {
        let base = Url::parse("https://shop.example/").unwrap();
        let images = image_candidates(PAGE, Some(&base), 1);
        assert_eq!(images, vec!["https://shop.example/img/shoe-large.jpg"]);
    }
}
