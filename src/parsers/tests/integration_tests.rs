use crate::parsers::{PageSignals, captcha_indicator};

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_PAGE: &str = r#"<html>
        <head><title>Acme Blender 3000</title></head>
        <body>
            <h1>Acme Blender 3000</h1>
            <p class="price">$89.99</p>
            <button>Add to Cart</button>
            <a href="/reviews">Reviews</a>
        </body>
    </html>"#;

    #[test]
    fn test_signals_from_product_page() {
        let signals = PageSignals::from_html("https://acme.example/p/blender", None, PRODUCT_PAGE);

        assert_eq!(signals.url, "https://acme.example/p/blender");
        assert_eq!(signals.title, "Acme Blender 3000");
        assert!(signals.text.contains("$89.99"));
        assert_eq!(signals.links.len(), 1);
        assert_eq!(signals.links[0].url, "https://acme.example/reviews");
        assert_eq!(signals.element_counts.cart_buttons, 1);
    }

    #[test]
    fn test_browser_title_wins() {
        let signals =
            PageSignals::from_html("https://acme.example/p/blender", Some("Live Title"), PRODUCT_PAGE);
        assert_eq!(signals.title, "Live Title");

        let signals = PageSignals::from_html("https://acme.example/p/blender", Some(""), PRODUCT_PAGE);
        assert_eq!(signals.title, "Acme Blender 3000");
    }

    #[test]
    fn test_text_excerpt() {
        let signals = PageSignals::from_html("https://acme.example/", None, PRODUCT_PAGE);
        assert_eq!(signals.text_excerpt(4), "Acme");
    }

    #[test]
    fn test_unparsable_url_keeps_absolute_links_only() {
        let page = r#"<a href="/relative">R</a><a href="https://abs.example/x">A</a>"#;
        let signals = PageSignals::from_html("not a url", None, page);
        assert_eq!(signals.links.len(), 1);
        assert_eq!(signals.links[0].url, "https://abs.example/x");
    }

    #[test]
    fn test_captcha_indicator() {
        assert_eq!(
            captcha_indicator("<h4>Enter the characters you see below</h4><p>Robot Check</p>"),
            Some("robot check")
        );
        assert_eq!(captcha_indicator("<div id='g-recaptcha'></div>"), Some("captcha"));
        assert_eq!(captcha_indicator(PRODUCT_PAGE), None);
    }
}
