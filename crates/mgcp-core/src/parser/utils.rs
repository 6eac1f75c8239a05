// Helpers shared by the parameter value parsers

use crate::error::{Error, Result};

/// Split `input` on `separator`, ignoring separators nested in parentheses
/// or double quotes. Items are trimmed and empty items dropped.
pub(crate) fn split_top_level(input: &str, separator: char) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == separator && depth == 0 && !in_quotes => {
                let item = current.trim();
                if !item.is_empty() {
                    items.push(item.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let item = current.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
    items
}

/// Split `name(group1)(group2)` into the name and the content of each
/// top-level parenthesized group.
pub(crate) fn split_groups(input: &str) -> Result<(String, Vec<String>)> {
    let input = input.trim();
    let name_end = input.find('(').unwrap_or(input.len());
    let name = input[..name_end].trim().to_string();

    let mut groups = Vec::new();
    let mut rest = &input[name_end..];
    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if !rest.starts_with('(') {
            return Err(Error::parse(format!("unexpected text after group in '{}'", input)));
        }

        let mut depth = 0usize;
        let mut in_quotes = false;
        let mut close = None;
        for (idx, c) in rest.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                '(' if !in_quotes => depth += 1,
                ')' if !in_quotes => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }

        let close = close.ok_or_else(|| Error::parse(format!("unbalanced parentheses in '{}'", input)))?;
        groups.push(rest[1..close].trim().to_string());
        rest = &rest[close + 1..];
    }

    Ok((name, groups))
}
