//! Attach decision: decode, blacklist check, session admission.

use tracing::{debug, warn};

use crate::blacklist::SharedBlacklist;
use crate::cdr::{Cdr, CdrHandle};
use crate::codec;
use crate::session::SharedSessionRegistry;

use super::Verdict;

/// Decides the verdict for one attach payload.
#[derive(Clone)]
pub struct Decider {
    blacklist: SharedBlacklist,
    registry: SharedSessionRegistry,
    cdr: CdrHandle,
}

impl Decider {
    pub fn new(blacklist: SharedBlacklist, registry: SharedSessionRegistry, cdr: CdrHandle) -> Self {
        Self {
            blacklist,
            registry,
            cdr,
        }
    }

    /// Decide on a raw BCD payload.
    ///
    /// Malformed identifiers never reach the blacklist or the registry.
    pub fn decide(&self, payload: &[u8]) -> Verdict {
        let imsi = codec::decode(payload);

        if !codec::is_valid_imsi(&imsi) {
            debug!(imsi = %imsi, bytes = payload.len(), "malformed IMSI");
            return Verdict::Invalid;
        }

        self.decide_imsi(&imsi)
    }

    /// Decide on an already decoded IMSI.
    pub fn decide_imsi(&self, imsi: &str) -> Verdict {
        if self.blacklist.contains(imsi) {
            warn!(imsi = %imsi, "attach rejected: subscriber blacklisted");
            self.cdr.submit(Cdr::rejected(imsi));
            return Verdict::Rejected;
        }

        if self.registry.create(imsi) {
            Verdict::Created
        } else {
            Verdict::Exists
        }
    }

    pub fn registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }
}
