//! Dockerfile text output.

use std::io::{self, Write};

use crate::directive::Directive;

/// Writes `directives` as Dockerfile text, one instruction per line, in order.
pub fn render(directives: &[Directive], out: &mut impl Write) -> io::Result<()> {
    for directive in directives {
        writeln!(out, "{directive}")?;
    }
    out.flush()
}

/// Renders `directives` into a `String`.
pub fn to_dockerfile(directives: &[Directive]) -> String {
    let mut text = String::new();
    for directive in directives {
        text.push_str(&directive.to_string());
        text.push('\n');
    }
    text
}
