//! Admission outcomes and their wire form.

use serde::{Deserialize, Serialize};

/// Result of an `acquire`. A denial is an ordinary outcome, not an error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    /// The request was admitted; carries the balance left after paying for it.
    Allow(f64),
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Tokens left after an admitted request, `None` on denial.
    pub fn remaining(&self) -> Option<f64> {
        match self {
            Decision::Allow(tokens) => Some(*tokens),
            Decision::Deny => None,
        }
    }
}

/// Body returned for an acquire over HTTP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquireReply {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<f64>,
}

/// Body returned for an inspect over HTTP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectReply {
    pub tokens: f64,
}

impl From<Decision> for AcquireReply {
    fn from(decision: Decision) -> Self {
        AcquireReply {
            allowed: decision.is_allowed(),
            tokens: decision.remaining(),
        }
    }
}

impl From<AcquireReply> for Decision {
    fn from(reply: AcquireReply) -> Self {
        match (reply.allowed, reply.tokens) {
            (true, Some(tokens)) => Decision::Allow(tokens),
            // An allow without a balance only comes from a hand-written body.
            (true, None) => Decision::Allow(0.0),
            (false, _) => Decision::Deny,
        }
    }
}
