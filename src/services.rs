//! Detection of the services that request a profiler install.

use tracing::{info, warn};

use crate::context::{Context, ServiceBinding, keys};

/// Primary service type offering the profiler.
pub const CODIZY_SERVICE: &str = "codizy";

/// Alias service type offering the profiler.
pub const XHPROF_SERVICE: &str = "xhprof";

/// Which sources asked for the install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detection {
    /// At least one `codizy` binding exists.
    pub codizy: bool,
    /// At least one `xhprof` binding exists.
    pub xhprof: bool,
    /// `CODIZY_INSTALL` is set.
    pub manual: bool,
}

impl Detection {
    /// Inspects the service catalog and the manual override in `ctx`.
    #[must_use]
    pub fn detect(ctx: &Context) -> Self {
        let codizy = check_service(ctx, CODIZY_SERVICE, "Codizy");
        let xhprof = check_service(ctx, XHPROF_SERVICE, "XHProf");
        let manual = ctx.contains_key(keys::CODIZY_INSTALL);
        if manual {
            info!("Codizy manual install detected.");
        }
        Self {
            codizy,
            xhprof,
            manual,
        }
    }

    /// Whether any source asked for the install.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.codizy || self.xhprof || self.manual
    }

    /// The binding whose credentials apply. Only the first binding of the
    /// first matching service type is ever used.
    #[must_use]
    pub fn first_binding(&self, ctx: &Context) -> Option<ServiceBinding> {
        [(self.codizy, CODIZY_SERVICE), (self.xhprof, XHPROF_SERVICE)]
            .into_iter()
            .filter(|(found, _)| *found)
            .find_map(|(_, service)| ctx.service_bindings(service).into_iter().next())
    }
}

fn check_service(ctx: &Context, service: &str, label: &str) -> bool {
    let count = ctx.service_bindings(service).len();
    match count {
        0 => info!("{label} services not detected."),
        1 => info!("{label} services detected."),
        _ => {
            warn!(count, "Multiple {label} services found, credentials from first one.");
            info!("{label} services detected.");
        }
    }
    count > 0
}
