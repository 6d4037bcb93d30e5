//! CSV rendering for report exports.

/// Quote a field when it contains a separator, a quote or a line break.
pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Header line plus one line per row, `\n`-terminated.
pub fn render<I, R>(headers: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut out = String::new();
    push_line(&mut out, headers.iter().map(|h| h.to_string()));
    for row in rows {
        push_line(&mut out, row);
    }
    out
}

fn push_line(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let line = fields
        .into_iter()
        .map(|f| csv_quote(&f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Optional text cell.
pub fn cell(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(csv_quote("Rakoto"), "Rakoto");
        assert_eq!(csv_quote("Rakoto, Jean"), "\"Rakoto, Jean\"");
        assert_eq!(csv_quote("dit \"Jeannot\""), "\"dit \"\"Jeannot\"\"\"");
        assert_eq!(csv_quote("a\nb"), "\"a\nb\"");
    }

    #[test]
    fn renders_header_and_rows() {
        let csv = render(
            &["ID", "Nom complet"],
            vec![
                vec!["STU-1".to_string(), "Rakoto Jean".to_string()],
                vec!["STU-2".to_string(), "Rabe, Hery".to_string()],
            ],
        );
        assert_eq!(csv, "ID,Nom complet\nSTU-1,Rakoto Jean\nSTU-2,\"Rabe, Hery\"\n");
    }
}
