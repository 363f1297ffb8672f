//! Default package settings merged into the context.
//!
//! Values may reference other keys as `{KEY}`. They are stored unexpanded;
//! whoever consumes them resolves them with [`Context::format`].

use serde_json::Value;
use tracing::debug;

use crate::context::{Context, keys};

/// Package coordinates used when the context does not override them.
#[must_use]
pub fn defaults() -> [(&'static str, Value); 4] {
    [
        (keys::XHPROF_VERSION, Value::from("0.9.5")),
        (keys::XHPROF_PACKAGE, Value::from("xhprof-{XHPROF_VERSION}.tar.gz")),
        (
            keys::XHPROF_DOWNLOAD_URL,
            Value::from("https://www.codizy.com/download/module/{XHPROF_PACKAGE}"),
        ),
        (keys::XHPROF_STRIP, Value::from(false)),
    ]
}

/// Inserts every default whose key is absent from `ctx`.
///
/// Returns how many keys were added.
pub fn merge_defaults(ctx: &mut Context) -> usize {
    let mut added = 0;
    for (key, value) in defaults() {
        if ctx.insert_default(key, value) {
            debug!(key, "using default");
            added += 1;
        }
    }
    added
}
