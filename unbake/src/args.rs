//! Argument parsers for the text that follows a history keyword.
//!
//! History text is written by several generations of build tools, so every
//! parser here is lenient: it accepts the JSON form, the Go-quoted form
//! (`["a" "b"]`) and bare words, and returns `None` only when nothing usable
//! is left.

/// Splits `s` into its first whitespace-delimited word and the trimmed rest.
pub(crate) fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Splits shell-style words, honouring single quotes, double quotes and
/// backslash escapes. An unterminated quote runs to the end of the input.
///
/// With `commas` set, a comma outside quotes also separates words.
pub(crate) fn words(s: &str, commas: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(e) = chars.next() {
                    current.push(e);
                }
            }
            c if c.is_whitespace() || (commas && c == ',') => {
                if in_word {
                    out.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        out.push(current);
    }
    out
}

/// Normalizes a list-valued argument (`CMD`, `ENTRYPOINT`, `VOLUME`).
///
/// Accepts `["a","b"]`, `["a" "b"]`, `[a b]` and `a b`. An explicit `[]`
/// is an empty list; blank text is `None`.
pub(crate) fn list(args: &str) -> Option<Vec<String>> {
    let args = args.trim();
    if let Some(inner) = args.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Some(
            serde_json::from_str::<Vec<String>>(args).unwrap_or_else(|_| words(inner, true)),
        );
    }
    let items = words(args, false);
    (!items.is_empty()).then_some(items)
}

/// Parses `EXPOSE` arguments: `80/tcp 443/tcp` or the legacy
/// `map[80/tcp:{} 443/tcp:{}]` rendering.
pub(crate) fn ports(args: &str) -> Option<Vec<String>> {
    let args = args.trim();
    let inner = args
        .strip_prefix("map[")
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(args);
    let ports: Vec<String> = inner
        .split_whitespace()
        .map(|p| p.strip_suffix(":{}").unwrap_or(p))
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();
    (!ports.is_empty()).then_some(ports)
}

/// Parses `ENV` / `LABEL` arguments into ordered `(key, value)` pairs.
///
/// Accepts `K=V K2="v 2"` and the legacy `K some value` form. A word without
/// `=` extends the value of the pair before it, which is how the legacy
/// builder records values containing spaces.
pub(crate) fn pairs(args: &str) -> Option<Vec<(String, String)>> {
    let args = args.trim();
    let (first, rest) = split_first_word(args);
    if !first.is_empty() && !first.contains('=') {
        return Some(vec![(first.to_owned(), unquote(rest))]);
    }

    let mut out: Vec<(String, String)> = Vec::new();
    let mut s = args;
    while !s.is_empty() {
        let word_end = s.find(char::is_whitespace).unwrap_or(s.len());
        match s[..word_end].split_once('=') {
            Some((key, _)) if !key.is_empty() => {
                let (value, after) = take_value(&s[key.len() + 1..]);
                out.push((unquote(key), value));
                s = after.trim_start();
            }
            _ => {
                if let Some((_, value)) = out.last_mut() {
                    value.push(' ');
                    value.push_str(&s[..word_end]);
                }
                s = s[word_end..].trim_start();
            }
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Reads one value from the start of `s`, quoted or bare, and returns it
/// together with the unconsumed remainder.
fn take_value(s: &str) -> (String, &str) {
    let Some(quote @ ('"' | '\'')) = s.chars().next() else {
        let end = s.find(char::is_whitespace).unwrap_or(s.len());
        return (s[..end].to_owned(), &s[end..]);
    };

    let mut value = String::new();
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' && quote == '"' {
            escaped = true;
        } else if c == quote {
            return (value, &s[i + 1..]);
        } else {
            value.push(c);
        }
    }
    // Unterminated quote: keep the text as written.
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    (s[..end].to_owned(), &s[end..])
}

/// Strips one pair of matching surrounding quotes.
fn unquote(s: &str) -> String {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].to_owned();
        }
    }
    s.to_owned()
}

/// Parses `ADD` / `COPY` arguments into `(source, destination)`.
///
/// The legacy builder writes `file:<sha> in /dest`; BuildKit writes the
/// instruction as typed, `[--flags] <src>... <dest>`.
pub(crate) fn transfer(args: &str) -> Option<(String, String)> {
    let args = args.trim();
    if let Some((src, dst)) = args.split_once(" in ") {
        let (src, dst) = (src.trim(), dst.trim());
        return (!src.is_empty() && !dst.is_empty()).then(|| (src.to_owned(), dst.to_owned()));
    }

    let parts = if args.starts_with('[') {
        list(args)?
    } else {
        words(args, false)
    };
    match parts.as_slice() {
        [sources @ .., dst] if !sources.is_empty() => Some((sources.join(" "), dst.clone())),
        _ => None,
    }
}
