//! Text helpers shared by the fetcher and the summarizers.
//!
//! Feed content is mostly Telugu, so every length limit here counts
//! characters rather than bytes.

use url::Url;

/// Number of title characters compared when looking for near-duplicates
pub const TITLE_PREFIX_CHARS: usize = 50;

const HYPE_KEYWORDS: &[&str] = &[
    "breaking",
    "shocking",
    "viral",
    "exclusive",
    "sensational",
    "unbelievable",
    "you won't believe",
    "must watch",
    "బ్రేకింగ్",
    "షాకింగ్",
    "షాక్",
    "సంచలనం",
    "వైరల్",
    "నమ్మలేరు",
];

/// Remove markup from feed HTML and normalise whitespace
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    collapse_whitespace(&decode_entities(&text))
}

pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        // Entities are short; anything longer is a literal ampersand
        let decoded = after
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&after[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At most `max_chars` characters of `s`, never splitting a character
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.trim_end().to_string(),
    }
}

/// Summary used whenever no provider output is available
pub fn fallback_summary(title: &str, content: &str, max_chars: usize) -> String {
    let source = if content.trim().is_empty() {
        title.trim()
    } else {
        content.trim()
    };

    if source.chars().count() <= max_chars {
        return source.to_string();
    }

    let mut summary = truncate_chars(source, max_chars.saturating_sub(1));
    summary.push('…');
    summary
}

pub fn title_prefix(title: &str) -> String {
    truncate_chars(title.trim(), TITLE_PREFIX_CHARS)
}

/// Rough clickbait score of a headline and its body
pub fn hype_score(title: &str, body: &str) -> u32 {
    let text = format!("{} {}", title, body);
    let lowered = text.to_lowercase();

    let keywords = HYPE_KEYWORDS
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .count() as u32;

    let exclamations = text.matches('!').count().min(3) as u32;

    let shouting = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| word.len() >= 4 && word.chars().all(|c| c.is_ascii_uppercase()))
        .count()
        .min(3) as u32;

    keywords * 2 + exclamations + shouting
}

pub fn source_domain(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// True only for absolute `http`/`https` URLs, the only links safe to render
pub fn is_web_url(link: &str) -> bool {
    Url::parse(link.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
