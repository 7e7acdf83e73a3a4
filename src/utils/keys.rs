use percent_encoding::percent_decode_str;

/// Decodes an object key as it appears in a storage notification.
///
/// Notifications form-encode keys, so `+` stands for a space and must be
/// replaced before percent-decoding (a literal plus arrives as `%2B`).
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Final path segment of a key (`a/b/c.bin` -> `c.bin`).
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}
