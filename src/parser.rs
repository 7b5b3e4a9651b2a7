/// Prefixes protocol-relative urls, leaves everything else untouched.
pub fn fix_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

/// Derives a url-safe slug from a story title.
///
/// Lowercases, substitutes German umlauts, drops everything outside
/// `[a-z0-9 -]`, turns whitespace into dashes and caps the result at 70
/// characters with no leading or trailing dash. Idempotent on an already
/// normalized slug.
pub fn nice_url(input: &str) -> String {
    let mut url = input.to_lowercase();

    for (from, to) in [("ü", "ue"), ("ä", "ae"), ("ö", "oe"), ("ß", "ss")] {
        url = url.replace(from, to);
    }

    let url = url
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .map(|c| if c == ' ' { '-' } else { c })
        .collect::<String>();

    let mut slug = String::with_capacity(url.len());
    for c in url.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }

    slug.truncate(70);
    slug.trim_matches('-').to_string()
}

/// Last integer of a page summary like "zeige 1-20 (von 70)".
///
/// Mirrors the forgiving parse the summary format calls for: the final
/// whitespace-separated token is read up to the first non-digit.
pub(crate) fn trailing_total(text: &str) -> Option<usize> {
    let token = text.split_whitespace().last()?;
    let digits = token
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();

    digits.parse().ok()
}

/// Extracts the path segment following `marker`, e.g. the layout name out
/// of `https://alias.twoday.net/layouts/rainy/main`.
pub(crate) fn segment_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let mut segments = url.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == marker)?;
    segments.next()
}

/// Drops the last path segment, keeping the rest of the url intact.
pub(crate) fn parent_url(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => url.to_string(),
    }
}
