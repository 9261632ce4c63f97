//! Normalizer for the legacy markup responses: channels still served by the
//! old endpoint come back as page HTML JSON-encoded into a string. Counters
//! on those pages are human-readable and may carry a localized magnitude
//! suffix ("هزار" ×1 000, "میلیون" ×1 000 000).

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use trawler_core::error::CrawlError;
use trawler_core::types::{Channel, Message};

use crate::normalize::HistoryPage;

const CANONICAL_LINK: &str = r#"link[rel="canonical"]"#;
const CHANNEL_TITLE: &str = ".etme_channel_info_header_title";
const CHANNEL_USERNAME: &str = ".etme_channel_info_header_username";
const CHANNEL_ABOUT: &str = ".etme_channel_info_description";
const COUNTER_VALUE: &str = ".etme_channel_info_counter .counter_value";
const MESSAGE_WRAP: &str = ".etme_widget_message_wrap";
const MESSAGE_TEXT: &str = ".etme_widget_message_text";
const MESSAGE_VIEWS: &str = ".etme_widget_message_views";

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|err| CrawlError::malformed(format!("selector {css}: {err}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parse a human-readable counter, multiplying out a magnitude suffix when
/// one is attached. `"12 هزار"` → `12000`, `"1.5M"` → `1500000`, plain
/// numbers parse as-is.
pub fn parse_counter(raw: &str) -> Option<i64> {
    let text = raw.trim();
    for (suffix, multiplier) in [
        ("هزار", 1_000i64),
        ("میلیون", 1_000_000),
        ("K", 1_000),
        ("M", 1_000_000),
    ] {
        if let Some(prefix) = text.strip_suffix(suffix) {
            let value: f64 = prefix.trim().replace(',', "").parse().ok()?;
            return Some((value * multiplier as f64).round() as i64);
        }
    }
    text.replace(',', "").parse().ok()
}

/// Legacy channel pages carry no `pts`; the pts gate is skipped for them.
/// The canonical link encodes the newest post id and is required — without
/// it the page cannot anchor an offset and the payload is malformed.
pub fn channel_info(html: &str, channel_id: i64) -> Result<(Option<i64>, Channel), CrawlError> {
    let doc = Html::parse_document(html);

    let canonical = doc
        .select(&selector(CANONICAL_LINK)?)
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| href.rsplit('=').next())
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| CrawlError::malformed("legacy channel page missing canonical link"))?;
    debug!(channel_id, newest_post = canonical, "legacy channel page");

    let title = doc.select(&selector(CHANNEL_TITLE)?).next().map(text_of);
    let username = doc
        .select(&selector(CHANNEL_USERNAME)?)
        .next()
        .map(|el| text_of(el).trim_start_matches('@').to_string());
    let about = doc.select(&selector(CHANNEL_ABOUT)?).next().map(text_of);
    let participants_count = doc
        .select(&selector(COUNTER_VALUE)?)
        .next()
        .and_then(|el| parse_counter(&text_of(el)));

    Ok((
        None,
        Channel {
            channel_id,
            access_hash: None,
            title,
            username,
            participants_count,
            about,
        },
    ))
}

/// Message wraps on legacy pages carry only text, views, and a timestamp;
/// there are no referenced chats or users to surface.
pub fn history_page(html: &str, channel_id: i64) -> Result<HistoryPage, CrawlError> {
    let doc = Html::parse_document(html);
    let wrap_sel = selector(MESSAGE_WRAP)?;
    let text_sel = selector(MESSAGE_TEXT)?;
    let views_sel = selector(MESSAGE_VIEWS)?;
    let time_sel = selector("time")?;

    let mut messages = Vec::new();
    for wrap in doc.select(&wrap_sel) {
        let Some(id) = wrap.value().attr("id").and_then(|id| id.parse::<i64>().ok()) else {
            continue;
        };

        let message = wrap.select(&text_sel).next().map(text_of);
        let views = wrap
            .select(&views_sel)
            .next()
            .and_then(|el| parse_counter(&text_of(el)));
        let date = wrap
            .select(&time_sel)
            .last()
            .and_then(|el| el.value().attr("datetime"))
            .and_then(|dt| chrono::DateTime::parse_from_rfc3339(dt).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        messages.push(Message {
            id,
            message,
            date,
            views,
            forwards: None,
            channel_id,
            from_peer: None,
            fwd_from: None,
        });
    }

    let next_offset = messages.iter().map(|m| m.id).min();

    Ok(HistoryPage {
        next_offset,
        messages,
        channels: Vec::new(),
        users: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousand_suffix_multiplies() {
        assert_eq!(parse_counter("12 هزار"), Some(12_000));
    }

    #[test]
    fn million_suffix_multiplies() {
        assert_eq!(parse_counter("3 میلیون"), Some(3_000_000));
        assert_eq!(parse_counter("1.5M"), Some(1_500_000));
    }

    #[test]
    fn fractional_prefix_rounds() {
        assert_eq!(parse_counter("1.2K"), Some(1_200));
    }

    #[test]
    fn plain_number_parses_as_is() {
        assert_eq!(parse_counter("250"), Some(250));
        assert_eq!(parse_counter("1,024"), Some(1_024));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_counter("n/a"), None);
    }

    #[test]
    fn channel_page_extracts_metadata() {
        let html = r#"<html><head>
            <link rel="canonical" href="/some_channel?before=4821">
        </head><body>
            <div class="etme_channel_info_header_title">News</div>
            <div class="etme_channel_info_header_username">@news</div>
            <div class="etme_channel_info_counter"><span class="counter_value">12 هزار</span></div>
            <div class="etme_channel_info_description">daily updates</div>
        </body></html>"#;

        let (pts, channel) = channel_info(html, 10).unwrap();
        assert_eq!(pts, None);
        assert_eq!(channel.channel_id, 10);
        assert_eq!(channel.title.as_deref(), Some("News"));
        assert_eq!(channel.username.as_deref(), Some("news"));
        assert_eq!(channel.participants_count, Some(12_000));
        assert_eq!(channel.about.as_deref(), Some("daily updates"));
    }

    #[test]
    fn missing_canonical_link_is_malformed() {
        let html = r#"<html><body><div class="etme_channel_info_header_title">News</div></body></html>"#;
        assert!(matches!(
            channel_info(html, 10),
            Err(CrawlError::MalformedResponse(_))
        ));
    }

    #[test]
    fn message_page_parses_wraps() {
        let html = r#"<html><body>
            <div class="etme_widget_message_wrap" id="130">
                <div class="etme_widget_message_text">hello</div>
                <span class="etme_widget_message_views">1.2K</span>
                <time datetime="2024-05-01T10:00:00+00:00"></time>
            </div>
            <div class="etme_widget_message_wrap" id="129">
                <div class="etme_widget_message_text">older</div>
            </div>
        </body></html>"#;

        let page = history_page(html, 10).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].id, 130);
        assert_eq!(page.messages[0].message.as_deref(), Some("hello"));
        assert_eq!(page.messages[0].views, Some(1_200));
        assert!(page.messages[0].date.is_some());
        assert_eq!(page.next_offset, Some(129));
        assert!(page.channels.is_empty());
        assert!(page.users.is_empty());
    }

    #[test]
    fn wraps_without_numeric_id_are_skipped() {
        let html = r#"<div class="etme_widget_message_wrap" id="pinned"></div>
                      <div class="etme_widget_message_wrap" id="42"></div>"#;
        let page = history_page(html, 10).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.next_offset, Some(42));
    }
}
