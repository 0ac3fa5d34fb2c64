//! Dataset API endpoint URL builders

/// Build the first lines-page URL for a dataset
///
/// `select` is the comma-joined column list; `qs` is the optional compiled
/// filter expression, URL-encoded here.
pub fn lines_url(href: &str, size: usize, select: &str, qs: Option<&str>) -> String {
    let mut url = format!("{}/lines?size={}&select={}", href, size, select);
    if let Some(qs) = qs {
        url.push_str(&format!("&qs={}", urlencoding::encode(qs)));
    }
    url
}

/// Build the metadata-attachment upload URL
pub fn attachments_url(href: &str) -> String {
    format!("{}/metadata-attachments", href)
}
