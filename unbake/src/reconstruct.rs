//! History-to-directive reconstruction.

use std::collections::HashMap;

use crate::directive::{BaseImage, Directive};
use crate::history::{Step, classify};
use crate::image::{HistoryEntry, ImageDescription};

/// OCI annotation naming the image a build started from.
pub const BASE_NAME_LABEL: &str = "org.opencontainers.image.base.name";

/// Reconstructs the ordered Dockerfile directives that built `image`.
///
/// The first directive is always [`Directive::From`]. Every history entry
/// then yields one directive in build order; text that cannot be translated
/// becomes a [`Directive::Comment`]. `ENTRYPOINT`/`CMD` from the image config
/// are appended when no history entry recorded them.
///
/// The function never fails and has no side effects besides debug logging.
pub fn reconstruct(image: &ImageDescription) -> Vec<Directive> {
    let mut directives = Vec::with_capacity(image.history.len() + 3);
    directives.push(Directive::From(base_image(image)));
    directives.extend(image.history.iter().map(translate));
    collapse_env(&mut directives);
    append_config_fallbacks(image, &mut directives);
    directives
}

/// Infers the `FROM` line.
fn base_image(image: &ImageDescription) -> BaseImage {
    if image.rootfs.diff_ids.is_empty() && image.layers.is_empty() && image.layer_history_len() == 0
    {
        return BaseImage::Scratch;
    }
    match image.config.labels.get(BASE_NAME_LABEL).map(|n| n.trim()) {
        Some(name) if !name.is_empty() => BaseImage::Named(name.to_owned()),
        _ => BaseImage::Unknown,
    }
}

/// Translates one history entry into exactly one directive.
fn translate(entry: &HistoryEntry) -> Directive {
    match classify(&entry.created_by) {
        Step::Metadata(kw, args) => kw.directive(args).unwrap_or_else(|| comment(entry)),
        Step::Run(text) => Directive::Run(text.to_owned()),
        Step::Unrecognized(_) => comment(entry),
    }
}

/// Keeps an untranslatable entry as a comment.
fn comment(entry: &HistoryEntry) -> Directive {
    tracing::debug!(created_by = %entry.created_by, "unrecognized history entry");
    let text = entry.created_by.trim();
    if text.is_empty()
        && let Some(note) = entry.comment.as_deref()
    {
        return Directive::Comment(note.trim().to_owned());
    }
    Directive::Comment(text.to_owned())
}

/// Drops `ENV` assignments overwritten before any content-producing step.
///
/// A key assigned again with no `RUN`/`ADD`/`COPY` in between only keeps the
/// later assignment; an `ENV` left with nothing to set is removed.
fn collapse_env(directives: &mut Vec<Directive>) {
    let mut live: HashMap<String, usize> = HashMap::new();

    for i in 0..directives.len() {
        if directives[i].is_content() {
            live.clear();
            continue;
        }
        let Directive::Env(pairs) = &directives[i] else {
            continue;
        };
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
        for key in keys {
            if let Some(prev) = live.insert(key.clone(), i)
                && prev != i
                && let Directive::Env(prev_pairs) = &mut directives[prev]
            {
                prev_pairs.retain(|(k, _)| *k != key);
            }
        }
    }

    directives.retain(|d| !matches!(d, Directive::Env(pairs) if pairs.is_empty()));
}

/// Appends `ENTRYPOINT`/`CMD` from the config when history never set them.
fn append_config_fallbacks(image: &ImageDescription, directives: &mut Vec<Directive>) {
    let has = |pred: fn(&Directive) -> bool| directives.iter().any(pred);
    let need_entrypoint = !has(|d| matches!(d, Directive::Entrypoint(_)));
    let need_cmd = !has(|d| matches!(d, Directive::Cmd(_)));

    if need_entrypoint
        && let Some(ep) = image.config.entrypoint.as_ref().filter(|v| !v.is_empty())
    {
        directives.push(Directive::Entrypoint(ep.clone()));
    }
    if need_cmd
        && let Some(cmd) = image.config.cmd.as_ref().filter(|v| !v.is_empty())
    {
        directives.push(Directive::Cmd(cmd.clone()));
    }
}
