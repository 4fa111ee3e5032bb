use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// How far into a page to look for a `<meta>` charset declaration.
const META_SNIFF_LEN: usize = 1024;

/// Decode an HTML page to text.
///
/// The charset comes from the `Content-Type` header when it names a known
/// encoding, then from a `<meta>` declaration near the top of the page, then
/// defaults to UTF-8. A byte-order mark overrides all three.
pub fn decode_page(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8);

    let (text, used, malformed) = encoding.decode(body);
    if malformed {
        tracing::debug!(encoding = used.name(), "Page contained malformed sequences");
    }
    text.into_owned()
}

/// `charset` parameter of a `Content-Type` value.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
    })
}

/// Charset declared by `<meta charset>` or `<meta http-equiv content>`.
fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    head.match_indices("<meta").find_map(|(start, _)| {
        let tag = &head[start..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        let after = &tag[tag.find("charset")? + "charset".len()..];
        let value = after.trim_start().strip_prefix('=')?.trim_start();
        let value = value.trim_start_matches(|c| c == '"' || c == '\'');
        let label: String = value
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
            .collect();

        // A page cannot declare itself UTF-16 in ASCII-compatible markup
        Encoding::for_label(label.as_bytes()).map(|e| {
            if e == UTF_16LE || e == UTF_16BE {
                UTF_8
            } else {
                e
            }
        })
    })
}
