//! Dockerfile directives produced by the reconstruction engine.

use std::fmt;

/// Archive suffixes that `ADD` unpacks automatically.
const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz", ".tar.zst",
];

/// Source prefixes that `ADD` fetches remotely.
const REMOTE_PREFIXES: &[&str] = &["http://", "https://", "git@"];

/// The `FROM` line of a reconstructed Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BaseImage {
    /// The image has no layers at all.
    Scratch,
    /// The base image is named by the image metadata.
    Named(String),
    /// The base cannot be recovered from the archive.
    Unknown,
}

impl fmt::Display for BaseImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scratch => f.write_str("scratch"),
            Self::Named(name) => f.write_str(name),
            Self::Unknown => f.write_str("<unknown>"),
        }
    }
}

/// A single reconstructed build instruction.
///
/// `Display` renders the directive as one Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Directive {
    /// `FROM <image>`
    From(BaseImage),
    /// `WORKDIR <path>`
    Workdir(String),
    /// `USER <user>[:<group>]`
    User(String),
    /// `EXPOSE <port>/<proto>...`
    Expose(Vec<String>),
    /// `ENV <key>=<value>...`
    Env(Vec<(String, String)>),
    /// `LABEL <key>=<value>...`
    Label(Vec<(String, String)>),
    /// `STOPSIGNAL <signal>`
    StopSignal(String),
    /// `VOLUME ["<path>", ...]`
    Volume(Vec<String>),
    /// Files added with `ADD`.
    Add {
        /// Source description as recorded in history.
        source: String,
        /// Destination path inside the image.
        destination: String,
    },
    /// Files added with `COPY`.
    Copy {
        /// Source description as recorded in history.
        source: String,
        /// Destination path inside the image.
        destination: String,
    },
    /// `RUN <shell text>`
    Run(String),
    /// `ENTRYPOINT ["<arg>", ...]`
    Entrypoint(Vec<String>),
    /// `CMD ["<arg>", ...]`
    Cmd(Vec<String>),
    /// History text that could not be translated, kept as a comment.
    Comment(String),
}

impl Directive {
    /// Returns the instruction keyword this directive renders with.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::From(_) => "FROM",
            Self::Workdir(_) => "WORKDIR",
            Self::User(_) => "USER",
            Self::Expose(_) => "EXPOSE",
            Self::Env(_) => "ENV",
            Self::Label(_) => "LABEL",
            Self::StopSignal(_) => "STOPSIGNAL",
            Self::Volume(_) => "VOLUME",
            Self::Add { source, .. } if is_remote_or_archive(source) => "ADD",
            Self::Add { .. } | Self::Copy { .. } => "COPY",
            Self::Run(_) => "RUN",
            Self::Entrypoint(_) => "ENTRYPOINT",
            Self::Cmd(_) => "CMD",
            Self::Comment(_) => "#",
        }
    }

    /// Returns `true` for directives that change the filesystem.
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Run(_) | Self::Add { .. } | Self::Copy { .. })
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            Self::From(base) => write!(f, "{keyword} {base}"),
            Self::Workdir(arg) | Self::User(arg) | Self::StopSignal(arg) | Self::Run(arg) => {
                write!(f, "{keyword} {arg}")
            }
            Self::Expose(ports) => write!(f, "{keyword} {}", ports.join(" ")),
            Self::Env(pairs) | Self::Label(pairs) => {
                f.write_str(keyword)?;
                for (key, value) in pairs {
                    write!(f, " {}={}", quote(key), quote(value))?;
                }
                Ok(())
            }
            Self::Volume(args) | Self::Entrypoint(args) | Self::Cmd(args) => {
                write!(f, "{keyword} ")?;
                write_json_list(f, args)
            }
            Self::Add {
                source,
                destination,
            }
            | Self::Copy {
                source,
                destination,
            } => write!(f, "{keyword} {source} {destination}"),
            Self::Comment(text) if text.trim().is_empty() => f.write_str("# <empty history entry>"),
            Self::Comment(text) => {
                for (i, line) in text.lines().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "# {line}")?;
                }
                Ok(())
            }
        }
    }
}

/// Returns `true` when `ADD` semantics are needed to reproduce `source`.
///
/// `--flag` words kept from BuildKit text are ignored; any remaining
/// source word that is remote or an archive needs `ADD`.
fn is_remote_or_archive(source: &str) -> bool {
    source
        .split_whitespace()
        .filter(|word| !word.starts_with("--"))
        .map(str::to_ascii_lowercase)
        .any(|word| {
            REMOTE_PREFIXES.iter().any(|p| word.starts_with(p))
                || ARCHIVE_SUFFIXES.iter().any(|s| word.ends_with(s))
        })
}

/// Double-quotes `s` when it would not survive as a single bare word.
fn quote(s: &str) -> String {
    let bare = !s.is_empty()
        && !s
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if bare {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Writes `args` as a compact JSON array (`["a","b"]`).
fn write_json_list(f: &mut fmt::Formatter<'_>, args: &[String]) -> fmt::Result {
    f.write_str("[")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        f.write_str(&serde_json::to_string(arg).map_err(|_| fmt::Error)?)?;
    }
    f.write_str("]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_owned(), v.to_owned())
    }

    #[test]
    fn renders_canonical_keywords() {
        let cases = [
            (Directive::From(BaseImage::Scratch), "FROM scratch"),
            (Directive::From(BaseImage::Unknown), "FROM <unknown>"),
            (
                Directive::From(BaseImage::Named("debian:12".into())),
                "FROM debian:12",
            ),
            (Directive::Workdir("/app".into()), "WORKDIR /app"),
            (Directive::User("node".into()), "USER node"),
            (Directive::Expose(vec!["80/tcp".into()]), "EXPOSE 80/tcp"),
            (Directive::StopSignal("SIGQUIT".into()), "STOPSIGNAL SIGQUIT"),
            (Directive::Volume(vec!["/data".into()]), r#"VOLUME ["/data"]"#),
            (Directive::Run("npm install".into()), "RUN npm install"),
            (
                Directive::Cmd(vec!["node".into(), "app.js".into()]),
                r#"CMD ["node","app.js"]"#,
            ),
            (
                Directive::Entrypoint(vec!["/docker-entrypoint.sh".into()]),
                r#"ENTRYPOINT ["/docker-entrypoint.sh"]"#,
            ),
        ];
        for (directive, want) in cases {
            assert_eq!(directive.to_string(), want);
        }
    }

    #[test]
    fn quotes_env_and_label_values() {
        let env = Directive::Env(vec![pair("A", "1"), pair("B", "two words"), pair("C", "")]);
        assert_eq!(env.to_string(), r#"ENV A=1 B="two words" C="""#);

        let label = Directive::Label(vec![pair("description", r#"say "hi""#)]);
        assert_eq!(label.to_string(), r#"LABEL description="say \"hi\"""#);
    }

    #[test]
    fn add_only_when_needed() {
        let copy = Directive::Add {
            source: "file:3e5f9a".into(),
            destination: "/".into(),
        };
        assert_eq!(copy.to_string(), "COPY file:3e5f9a /");

        let remote = Directive::Add {
            source: "https://example.com/app.tgz".into(),
            destination: "/opt/".into(),
        };
        assert_eq!(remote.to_string(), "ADD https://example.com/app.tgz /opt/");

        let archive = Directive::Add {
            source: "rootfs.tar.xz".into(),
            destination: "/".into(),
        };
        assert_eq!(archive.keyword(), "ADD");

        let flagged = Directive::Add {
            source: "--chown=1000:1000 https://example.com/app.bin".into(),
            destination: "/opt/app".into(),
        };
        assert_eq!(
            flagged.to_string(),
            "ADD --chown=1000:1000 https://example.com/app.bin /opt/app"
        );

        let flagged_local = Directive::Add {
            source: "--link config.yml".into(),
            destination: "/etc/app/".into(),
        };
        assert_eq!(flagged_local.keyword(), "COPY");

        let plain = Directive::Copy {
            source: "app.tar.gz".into(),
            destination: "/srv".into(),
        };
        assert_eq!(plain.keyword(), "COPY");
    }

    #[test]
    fn comments_prefix_every_line() {
        let c = Directive::Comment("ARG VERSION=1\nsecond line".into());
        assert_eq!(c.to_string(), "# ARG VERSION=1\n# second line");
        assert_eq!(
            Directive::Comment(String::new()).to_string(),
            "# <empty history entry>"
        );
    }

    #[test]
    fn content_directives() {
        assert!(Directive::Run("true".into()).is_content());
        assert!(!Directive::Env(vec![pair("A", "1")]).is_content());
        assert!(!Directive::Comment("x".into()).is_content());
    }
}
