//! Classification of history `created_by` text.
//!
//! History text follows an informal convention rather than a grammar:
//!
//! - The legacy builder records every step as a shell invocation
//!   (`/bin/sh -c ...`) and tags metadata-only steps with a `#(nop)` marker:
//!   `/bin/sh -c #(nop)  WORKDIR /app`.
//! - Build arguments in scope are prefixed as `|2 A=1 B=2 /bin/sh -c ...`.
//! - BuildKit records the instruction as typed (`WORKDIR /app`,
//!   `RUN /bin/sh -c make # buildkit`).
//!
//! [`classify`] normalizes all of these into a [`Step`].

use crate::args::{self, split_first_word};
use crate::directive::Directive;

/// Marker the legacy builder puts in front of metadata-only steps.
const NOP_MARKER: &str = "#(nop)";

/// Suffix BuildKit appends to instructions it executed.
const BUILDKIT_SUFFIX: &str = "# buildkit";

/// Shells whose `-c` invocation wraps a recorded step.
const SHELLS: &[&str] = &[
    "/bin/sh",
    "/bin/bash",
    "/bin/ash",
    "/bin/dash",
    "/usr/bin/bash",
    "sh",
    "bash",
];

/// Instructions that exist in Dockerfiles but have no directive here.
const UNMAPPED_KEYWORDS: &[&str] = &["ARG", "HEALTHCHECK", "MAINTAINER", "ONBUILD", "SHELL"];

/// Metadata keywords understood in history text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Keyword {
    /// `WORKDIR`
    Workdir,
    /// `EXPOSE`
    Expose,
    /// `ENV`
    Env,
    /// `LABEL`
    Label,
    /// `USER`
    User,
    /// `VOLUME`
    Volume,
    /// `STOPSIGNAL`
    StopSignal,
    /// `ENTRYPOINT`
    Entrypoint,
    /// `CMD`
    Cmd,
    /// `ADD`
    Add,
    /// `COPY`
    Copy,
}

/// Keyword tokens and the directives they map to.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("WORKDIR", Keyword::Workdir),
    ("EXPOSE", Keyword::Expose),
    ("ENV", Keyword::Env),
    ("LABEL", Keyword::Label),
    ("USER", Keyword::User),
    ("VOLUME", Keyword::Volume),
    ("STOPSIGNAL", Keyword::StopSignal),
    ("ENTRYPOINT", Keyword::Entrypoint),
    ("CMD", Keyword::Cmd),
    ("ADD", Keyword::Add),
    ("COPY", Keyword::Copy),
];

impl Keyword {
    /// Looks up an exact (upper-case) keyword token.
    pub fn lookup(token: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, kw)| *kw)
    }

    /// Translates the keyword's arguments into a directive.
    ///
    /// Returns `None` when the arguments are missing or unusable.
    pub fn directive(self, args: &str) -> Option<Directive> {
        let args = args.trim();
        let single = || (!args.is_empty()).then(|| args.to_owned());
        match self {
            Self::Workdir => single().map(Directive::Workdir),
            Self::User => single().map(Directive::User),
            Self::StopSignal => single().map(Directive::StopSignal),
            Self::Expose => args::ports(args).map(Directive::Expose),
            Self::Env => args::pairs(args).map(Directive::Env),
            Self::Label => args::pairs(args).map(Directive::Label),
            Self::Volume => args::list(args)
                .filter(|paths| !paths.is_empty())
                .map(Directive::Volume),
            Self::Entrypoint => args::list(args).map(Directive::Entrypoint),
            Self::Cmd => args::list(args).map(Directive::Cmd),
            Self::Add => args::transfer(args).map(|(source, destination)| Directive::Add {
                source,
                destination,
            }),
            Self::Copy => args::transfer(args).map(|(source, destination)| Directive::Copy {
                source,
                destination,
            }),
        }
    }
}

/// What a single history entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Step<'a> {
    /// A metadata-only instruction and its raw arguments.
    Metadata(Keyword, &'a str),
    /// A shell command that changed the filesystem.
    Run(&'a str),
    /// Text that matches no known form.
    Unrecognized(&'a str),
}

/// Classifies the `created_by` text of one history entry.
pub fn classify(created_by: &str) -> Step<'_> {
    let raw = created_by.trim();
    if raw.is_empty() || raw.chars().any(is_unprintable) {
        return Step::Unrecognized(created_by);
    }

    let unwrapped = strip_shell(strip_build_args(raw));
    let payload = unwrapped.unwrap_or(raw);

    if let Some(rest) = strip_nop(payload) {
        let (token, args) = split_first_word(rest);
        return match Keyword::lookup(&token.to_ascii_uppercase()) {
            Some(kw) => Step::Metadata(kw, args),
            None => Step::Unrecognized(created_by),
        };
    }

    if unwrapped.is_none()
        && let Some(step) = classify_buildkit(raw)
    {
        return step;
    }

    if payload.is_empty() {
        Step::Unrecognized(created_by)
    } else {
        Step::Run(payload)
    }
}

/// Recognizes BuildKit's `KEYWORD args` form.
fn classify_buildkit(raw: &str) -> Option<Step<'_>> {
    let (token, args) = split_first_word(raw);
    if args.is_empty() {
        return None;
    }
    let args = args
        .strip_suffix(BUILDKIT_SUFFIX)
        .map_or(args, str::trim_end);

    if token == "RUN" {
        let body = strip_build_args(args);
        let body = strip_shell(body).unwrap_or(body);
        return Some(if body.is_empty() {
            Step::Unrecognized(raw)
        } else {
            Step::Run(body)
        });
    }
    if let Some(kw) = Keyword::lookup(token) {
        return Some(Step::Metadata(kw, args));
    }
    UNMAPPED_KEYWORDS
        .contains(&token)
        .then_some(Step::Unrecognized(raw))
}

/// Strips a leading `#(nop)` marker, matched case-insensitively.
fn strip_nop(s: &str) -> Option<&str> {
    let head = s.get(..NOP_MARKER.len())?;
    head.eq_ignore_ascii_case(NOP_MARKER)
        .then(|| s[NOP_MARKER.len()..].trim_start())
}

/// Strips a `|N K=V ...` build-argument prefix.
fn strip_build_args(s: &str) -> &str {
    let Some(count) = s
        .strip_prefix('|')
        .map(split_first_word)
        .and_then(|(n, _)| n.parse::<usize>().ok())
    else {
        return s;
    };
    let mut rest = split_first_word(&s[1..]).1;
    for _ in 0..count {
        rest = split_first_word(rest).1;
    }
    rest
}

/// Strips a shell invocation wrapper and returns the command it runs.
///
/// Handles `sh -c`, option flags before `-c` (`-o pipefail`, `-ex`), combined
/// flags ending in `c` (`-ec`) and Windows `cmd /S /C`.
fn strip_shell(s: &str) -> Option<&str> {
    let (shell, mut rest) = split_first_word(s);

    if shell.eq_ignore_ascii_case("cmd") {
        loop {
            let (flag, after) = split_first_word(rest);
            if flag.eq_ignore_ascii_case("/C") {
                return Some(after);
            }
            if !flag.starts_with('/') {
                return None;
            }
            rest = after;
        }
    }

    if !SHELLS.contains(&shell) {
        return None;
    }
    loop {
        let (flag, after) = split_first_word(rest);
        match flag {
            "-o" => rest = split_first_word(after).1,
            f if f.starts_with('-') && !f.starts_with("--") && f.ends_with('c') => {
                return Some(after);
            }
            f if f.starts_with('-') && f.len() > 1 => rest = after,
            _ => return None,
        }
    }
}

/// Control characters other than ordinary whitespace.
fn is_unprintable(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\t' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_metadata() {
        assert_eq!(
            classify("/bin/sh -c #(nop)  WORKDIR /app"),
            Step::Metadata(Keyword::Workdir, "/app")
        );
        assert_eq!(
            classify("#(nop) EXPOSE 80/tcp"),
            Step::Metadata(Keyword::Expose, "80/tcp")
        );
        assert_eq!(
            classify(r#"/bin/sh -c #(nop)  CMD ["nginx" "-g" "daemon off;"]"#),
            Step::Metadata(Keyword::Cmd, r#"["nginx" "-g" "daemon off;"]"#)
        );
    }

    #[test]
    fn marker_and_keyword_are_case_folded() {
        assert_eq!(
            classify("/bin/sh -c #(NOP) workdir /srv"),
            Step::Metadata(Keyword::Workdir, "/srv")
        );
    }

    #[test]
    fn shell_commands_are_runs() {
        assert_eq!(classify("npm install"), Step::Run("npm install"));
        assert_eq!(
            classify("/bin/sh -c apt-get update && apt-get install -y curl"),
            Step::Run("apt-get update && apt-get install -y curl")
        );
        assert_eq!(
            classify("/bin/bash -o pipefail -c curl -sL x | sh"),
            Step::Run("curl -sL x | sh")
        );
        assert_eq!(classify("/bin/sh -ec make"), Step::Run("make"));
        assert_eq!(classify("cmd /S /C dir"), Step::Run("dir"));
    }

    #[test]
    fn build_args_prefix_is_dropped() {
        assert_eq!(
            classify("|2 VERSION=1.2 DEBUG=0 /bin/sh -c make install"),
            Step::Run("make install")
        );
    }

    #[test]
    fn buildkit_forms() {
        assert_eq!(
            classify("WORKDIR /app"),
            Step::Metadata(Keyword::Workdir, "/app")
        );
        assert_eq!(
            classify("COPY . . # buildkit"),
            Step::Metadata(Keyword::Copy, ". .")
        );
        assert_eq!(
            classify("RUN /bin/sh -c npm ci # buildkit"),
            Step::Run("npm ci")
        );
        assert_eq!(
            classify("RUN |1 NODE_ENV=production /bin/sh -c npm ci # buildkit"),
            Step::Run("npm ci")
        );
        assert_eq!(
            classify("ARG NODE_ENV=production"),
            Step::Unrecognized("ARG NODE_ENV=production")
        );
    }

    #[test]
    fn empty_lists_reset_cmd_and_entrypoint() {
        assert_eq!(
            classify("/bin/sh -c #(nop)  ENTRYPOINT []"),
            Step::Metadata(Keyword::Entrypoint, "[]")
        );
        assert_eq!(classify("CMD []"), Step::Metadata(Keyword::Cmd, "[]"));
        assert_eq!(
            Keyword::Entrypoint.directive("[]"),
            Some(Directive::Entrypoint(Vec::new()))
        );
        assert_eq!(Keyword::Cmd.directive("[]"), Some(Directive::Cmd(Vec::new())));
    }

    #[test]
    fn lowercase_commands_stay_runs() {
        assert_eq!(classify("env FOO=1 make"), Step::Run("env FOO=1 make"));
    }

    #[test]
    fn unknown_metadata_keyword() {
        let text = "/bin/sh -c #(nop)  ARG VERSION";
        assert_eq!(classify(text), Step::Unrecognized(text));
        let text = "/bin/sh -c #(nop)  HEALTHCHECK CMD curl -f localhost";
        assert_eq!(classify(text), Step::Unrecognized(text));
    }

    #[test]
    fn empty_and_unprintable() {
        assert_eq!(classify(""), Step::Unrecognized(""));
        assert_eq!(classify("   "), Step::Unrecognized("   "));
        assert_eq!(classify("/bin/sh -c "), Step::Unrecognized("/bin/sh -c "));
        assert_eq!(classify("abc\u{1b}[0m"), Step::Unrecognized("abc\u{1b}[0m"));
    }

    #[test]
    fn keyword_translation() {
        assert_eq!(
            Keyword::Cmd.directive(r#"["node" "app.js"]"#),
            Some(Directive::Cmd(vec!["node".into(), "app.js".into()]))
        );
        assert_eq!(
            Keyword::Volume.directive("[/var/lib/mysql]"),
            Some(Directive::Volume(vec!["/var/lib/mysql".into()]))
        );
        assert_eq!(Keyword::Workdir.directive("   "), None);
        assert_eq!(Keyword::Volume.directive("[]"), None);
        assert_eq!(Keyword::Copy.directive("onlyone"), None);
    }
}
