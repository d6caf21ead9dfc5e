//! enigma2 user bouquets: M3U conversion and `bouquets.tv` registration.

/// Header written when `bouquets.tv` does not exist yet.
pub const BOUQUET_INDEX_HEADER: &str = "#NAME User - bouquets (TV)";

/// enigma2 service type for gstreamer-played streams.
const STREAM_SERVICE_TYPE: u32 = 4097;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistChannel {
    pub title: String,
    pub url: String,
}

/// Parse an extended M3U playlist.
///
/// A URL line takes its title from the `#EXTINF` directly before it; a bare
/// URL is titled with itself.
pub fn parse_m3u(text: &str) -> Vec<PlaylistChannel> {
    let mut channels = Vec::new();
    let mut pending_title: Option<String> = None;

    for line in text.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            // Attribute values may contain commas; the title starts after the first
            // comma outside of quotes.
            let title = split_extinf_title(info);
            pending_title = Some(title.to_string()).filter(|t| !t.is_empty());
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let title = pending_title.take().unwrap_or_else(|| line.to_string());
        channels.push(PlaylistChannel {
            title,
            url: line.to_string(),
        });
    }

    channels
}

fn split_extinf_title(info: &str) -> &str {
    let mut in_quotes = false;
    let mut split_at = None;
    for (i, c) in info.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    split_at.map(|i| info[i + 1..].trim()).unwrap_or("")
}

/// Render channels as an enigma2 bouquet file.
pub fn render_bouquet(name: &str, channels: &[PlaylistChannel]) -> String {
    let mut out = format!("#NAME {}\n", name.trim());
    for channel in channels {
        let encoded = channel.url.replace(':', "%3a");
        let title = channel.title.replace(['\r', '\n'], " ");
        out.push_str(&format!(
            "#SERVICE {STREAM_SERVICE_TYPE}:0:1:0:0:0:0:0:0:0:{encoded}:{title}\n"
        ));
        out.push_str(&format!("#DESCRIPTION {title}\n"));
    }
    out
}

/// Whether downloaded text looks like a bouquet file.
pub fn is_bouquet_document(text: &str) -> bool {
    text.trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("#NAME")
}

/// Reduce a bouquet id or title to `[a-z0-9_]`.
pub fn sanitize_bouquet_id(raw: &str) -> Option<String> {
    let mut id = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
        } else if !id.is_empty() && !id.ends_with('_') {
            id.push('_');
        }
    }
    let id = id.trim_end_matches('_');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

pub fn bouquet_file_name(id: &str) -> String {
    format!("userbouquet.{id}.tv")
}

fn index_line(file_name: &str) -> String {
    format!("#SERVICE 1:7:1:0:0:0:0:0:0:0:FROM BOUQUET \"{file_name}\" ORDER BY bouquet")
}

/// Add a reference to `file_name` to a `bouquets.tv` document.
///
/// Returns `None` when the bouquet is already referenced.
pub fn register_in_index(index: Option<&str>, file_name: &str) -> Option<String> {
    let quoted = format!("\"{file_name}\"");
    let mut content = match index {
        Some(existing) if existing.contains(&quoted) => return None,
        Some(existing) => existing.to_string(),
        None => format!("{BOUQUET_INDEX_HEADER}\n"),
    };

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&index_line(file_name));
    content.push('\n');
    Some(content)
}
