/// Remote names declared in an rclone INI config, in file order.
#[must_use]
pub fn parse_remote_sections(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('[')?.strip_suffix(']'))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_remote_sections;

    #[test]
    fn collects_section_headers_only() {
        let content = "\
[gdrive]
type = drive
scope = drive
token = {\"access_token\":\"[redacted]\"}

; comment
  [ b2-archive ]
type = b2
";

        assert_eq!(parse_remote_sections(content), vec!["gdrive", "b2-archive"]);
    }

    #[test]
    fn empty_or_headerless_config_has_no_remotes() {
        assert!(parse_remote_sections("").is_empty());
        assert!(parse_remote_sections("type = drive\n[]\n").is_empty());
    }
}
